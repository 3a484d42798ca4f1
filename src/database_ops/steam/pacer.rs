use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum spacing between consecutive detail requests.
///
/// Each pass starts a timer before its request and settles after its side
/// effects; settling sleeps whatever is left of the interval, so the next
/// request never begins earlier than `min_interval` after the previous one.
#[derive(Debug, Clone)]
pub struct RequestPacer {
    min_interval: Duration,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn start(&self) -> Instant {
        Instant::now()
    }

    /// Remaining budget for a pass that started at `started`.
    pub fn remaining(&self, started: Instant) -> Duration {
        self.min_interval.saturating_sub(started.elapsed())
    }

    pub async fn settle(&self, started: Instant) {
        let gap = self.remaining(started);
        if !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
    }

    /// A full interval, for passes that made no request but still count.
    pub async fn idle(&self) {
        self.settle(Instant::now()).await;
    }
}
