use anyhow::{Context, Result};
use tracing::{info, warn};

use super::client::StoreApi;
use super::models::DetailResponse;
use super::pacer::RequestPacer;
use crate::config::Region;
use crate::database_ops::alerts::{AlertSink, FailureAlert};
use crate::database_ops::catalog_sync::{CatalogStore, RegionRole, SyncPlan};
use crate::normalization::app_details::parse_detail_body;

/// What a single identifier+region pass ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Synced,
    /// `success:false` on the primary region; blank base row written.
    Tombstoned,
    /// `success:false` on a secondary region; nothing written.
    Unavailable,
    NoData,
}

impl PassOutcome {
    fn exhausts(self) -> bool {
        matches!(self, PassOutcome::Tombstoned | PassOutcome::Unavailable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub identifiers: usize,
    pub requests: usize,
    pub synced: usize,
    pub tombstones: usize,
    pub no_data: usize,
    pub skipped_regions: usize,
    pub failures: usize,
}

/// Sequential, rate-limited `appdetails` loop over identifiers x regions.
pub struct SteamCollector<'a> {
    api: &'a dyn StoreApi,
    store: &'a dyn CatalogStore,
    alerts: &'a dyn AlertSink,
    pacer: RequestPacer,
    regions: Vec<Region>,
    pace_skipped: bool,
}

impl<'a> SteamCollector<'a> {
    pub fn new(
        api: &'a dyn StoreApi,
        store: &'a dyn CatalogStore,
        alerts: &'a dyn AlertSink,
        pacer: RequestPacer,
        regions: Vec<Region>,
    ) -> Self {
        Self {
            api,
            store,
            alerts,
            pacer,
            regions,
            pace_skipped: false,
        }
    }

    /// Spend a full interval on regions skipped after `success:false`.
    pub fn pace_skipped_regions(mut self, on: bool) -> Self {
        self.pace_skipped = on;
        self
    }

    pub async fn run(&self, app_ids: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = app_ids.len();
        if self.regions.is_empty() {
            warn!("steam: no regions configured; nothing to do");
            return summary;
        }
        info!(
            total,
            regions = self.regions.len(),
            interval_ms = self.pacer.min_interval().as_millis() as u64,
            "steam: detail sync start"
        );

        for (pos, appid) in app_ids.iter().enumerate() {
            summary.identifiers += 1;
            let mut title = String::new();
            let mut exhausted = false;
            let mut base_written = false;

            for (idx, region) in self.regions.iter().enumerate() {
                if exhausted {
                    summary.skipped_regions += 1;
                    if self.pace_skipped {
                        self.pacer.idle().await;
                    }
                    continue;
                }
                let role = RegionRole::for_index(idx);
                let started = self.pacer.start();
                summary.requests += 1;

                match self
                    .sync_pass(appid, region, role, &mut title, &mut base_written)
                    .await
                {
                    Ok(outcome) => {
                        match outcome {
                            PassOutcome::Synced => summary.synced += 1,
                            PassOutcome::Tombstoned => summary.tombstones += 1,
                            PassOutcome::NoData => summary.no_data += 1,
                            PassOutcome::Unavailable => {}
                        }
                        exhausted = outcome.exhausts();
                        info!(
                            appid = %appid,
                            region = %region.code,
                            outcome = ?outcome,
                            position = pos + 1,
                            total,
                            "steam: pass done"
                        );
                    }
                    Err(err) => {
                        summary.failures += 1;
                        self.alerts
                            .notify(&FailureAlert {
                                appid: appid.clone(),
                                region: region.code.clone(),
                                title: title.clone(),
                                message: format!("{err:#}"),
                            })
                            .await;
                    }
                }

                self.pacer.settle(started).await;
            }
        }

        info!(
            identifiers = summary.identifiers,
            requests = summary.requests,
            synced = summary.synced,
            tombstones = summary.tombstones,
            no_data = summary.no_data,
            skipped_regions = summary.skipped_regions,
            failures = summary.failures,
            "steam: detail sync complete"
        );
        summary
    }

    async fn sync_pass(
        &self,
        appid: &str,
        region: &Region,
        role: RegionRole,
        title: &mut String,
        base_written: &mut bool,
    ) -> Result<PassOutcome> {
        let body = self
            .api
            .app_details(appid, &region.code)
            .await
            .with_context(|| format!("appdetails request failed ({})", region.code))?;
        let response = parse_detail_body(appid, &body)
            .with_context(|| format!("malformed appdetails payload ({})", region.code))?;

        if let Some(name) = response.title().filter(|n| !n.is_empty()) {
            *title = name.to_string();
        }
        let outcome = match (&response, role) {
            (DetailResponse::NoData, _) => PassOutcome::NoData,
            (DetailResponse::Unavailable, RegionRole::Primary) => PassOutcome::Tombstoned,
            (DetailResponse::Unavailable, RegionRole::Secondary) => PassOutcome::Unavailable,
            (DetailResponse::Available(_), _) => PassOutcome::Synced,
        };

        if let Some(plan) = SyncPlan::for_pass(appid, &response, role, *base_written) {
            self.store
                .apply(&plan)
                .await
                .with_context(|| format!("failed to persist pass ({})", region.code))?;
            *base_written |= plan.base.is_some();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory_store::MemoryCatalogStore;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(1500);

    #[derive(Default)]
    struct ScriptedApi {
        bodies: HashMap<(String, String), Result<String, String>>,
        calls: Mutex<Vec<(String, String, Instant)>>,
    }

    impl ScriptedApi {
        fn respond(mut self, appid: &str, region: &str, body: Value) -> Self {
            let mut root = Map::new();
            root.insert(appid.to_string(), body);
            self.bodies.insert(
                (appid.into(), region.into()),
                Ok(Value::Object(root).to_string()),
            );
            self
        }

        fn fail(mut self, appid: &str, region: &str, msg: &str) -> Self {
            self.bodies
                .insert((appid.into(), region.into()), Err(msg.to_string()));
            self
        }

        fn calls(&self) -> Vec<(String, String, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        fn probed(&self) -> Vec<(String, String)> {
            self.calls()
                .into_iter()
                .map(|(id, region, _)| (id, region))
                .collect()
        }
    }

    #[async_trait]
    impl StoreApi for ScriptedApi {
        async fn app_list(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn featured(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn featured_categories(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn app_details(&self, appid: &str, region: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((appid.to_string(), region.to_string(), Instant::now()));
            match self.bodies.get(&(appid.to_string(), region.to_string())) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg.clone())),
                None => Ok(String::new()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<FailureAlert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn notify(&self, alert: &FailureAlert) {
            self.alerts.lock().unwrap().push(alert.clone());
        }
    }

    fn game(name: &str, currency: &str, minor: i64) -> Value {
        json!({
            "success": true,
            "data": {
                "type": "game",
                "name": name,
                "is_free": false,
                "developers": ["Valve"],
                "price_overview": {
                    "currency": currency,
                    "initial": minor,
                    "final": minor,
                    "discount_percent": 0
                }
            }
        })
    }

    fn unavailable() -> Value {
        json!({ "success": false })
    }

    fn regions(codes: &[&str]) -> Vec<Region> {
        codes.iter().map(|c| Region::new(c)).collect()
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn primary_failure_skips_remaining_regions() {
        let api = ScriptedApi::default()
            .respond("20", "us", unavailable())
            .respond("20", "jp", game("Never asked", "JPY", 100))
            .respond("20", "gb", game("Never asked", "GBP", 100));
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp", "gb"]),
        );

        let summary = collector.run(&ids(&["20"])).await;

        assert_eq!(api.probed(), vec![("20".to_string(), "us".to_string())]);
        assert_eq!(summary.tombstones, 1);
        assert_eq!(summary.skipped_regions, 2);
        let tables = store.snapshot().await;
        assert_eq!(tables.apps["20"].entry.name, "");
        assert_eq!(tables.apps["20"].entry.app_type, "");
        assert!(tables.prices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn regions_write_base_once_and_price_per_currency() {
        let api = ScriptedApi::default()
            .respond("10", "us", game("Counter-Strike", "USD", 999))
            .respond("10", "jp", game("カウンターストライク", "JPY", 98000));
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp"]),
        );

        let summary = collector.run(&ids(&["10"])).await;

        assert_eq!(summary.synced, 2);
        let tables = store.snapshot().await;
        assert_eq!(tables.apps.len(), 1);
        assert_eq!(tables.apps["10"].entry.name, "Counter-Strike");
        assert_eq!(tables.prices.len(), 2);
        let usd = &tables.prices[&("10".to_string(), "USD".to_string())];
        assert_eq!(usd.final_amount.to_string(), "9.99");
        assert_eq!(tables.developers["10"], vec!["Valve"]);
    }

    #[tokio::test(start_paused = true)]
    async fn detail_calls_are_spaced_by_the_interval() {
        let api = ScriptedApi::default()
            .respond("1", "us", game("One", "USD", 100))
            .respond("2", "jp", game("Two", "JPY", 100));
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp"]),
        );

        collector.run(&ids(&["1", "2"])).await;

        let calls = api.calls();
        assert_eq!(calls.len(), 4);
        for pair in calls.windows(2) {
            assert!(pair[1].2.duration_since(pair[0].2) >= INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_alerted_and_do_not_exhaust() {
        let api = ScriptedApi::default()
            .respond("30", "us", game("Portal", "USD", 1999))
            .respond("30", "jp", json!({ "success": true, "data": { "type": "game" } }))
            .fail("31", "us", "connection reset")
            .respond("31", "jp", game("Portal 2", "JPY", 1980));
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp"]),
        );

        let summary = collector.run(&ids(&["30", "31"])).await;

        assert_eq!(summary.failures, 2);
        assert_eq!(api.calls().len(), 4);
        let alerts = sink.alerts.lock().unwrap().clone();
        assert_eq!(alerts[0].appid, "30");
        assert_eq!(alerts[0].region, "jp");
        assert_eq!(alerts[0].title, "Portal");
        assert!(alerts[0].message.contains("name"));
        assert_eq!(alerts[1].appid, "31");
        assert!(alerts[1].message.contains("connection reset"));
        // secondary success still records its price
        let tables = store.snapshot().await;
        assert!(tables
            .prices
            .contains_key(&("31".to_string(), "JPY".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_regions_can_consume_the_interval() {
        let api = ScriptedApi::default().respond("40", "us", unavailable());
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp", "gb"]),
        )
        .pace_skipped_regions(true);

        let before = Instant::now();
        collector.run(&ids(&["40"])).await;
        assert!(before.elapsed() >= INTERVAL * 3);
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_price_never_lands_without_a_base_row() {
        let api = ScriptedApi::default()
            .respond("60", "jp", game("Left 4 Dead", "JPY", 98000))
            .respond("60", "gb", game("Left 4 Dead (GB)", "GBP", 799))
            .fail("61", "us", "connection reset")
            .respond("61", "jp", game("Portal", "JPY", 1980));
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp", "gb"]),
        );

        let summary = collector.run(&ids(&["60", "61"])).await;

        assert_eq!(summary.no_data, 2);
        assert_eq!(summary.failures, 1);
        let tables = store.snapshot().await;
        for (appid, _) in tables.prices.keys() {
            assert!(tables.apps.contains_key(appid), "price without base row for {appid}");
        }
        assert_eq!(tables.prices.len(), 3);
        // first region that answered owns the base row
        assert_eq!(tables.apps["60"].entry.name, "Left 4 Dead");
        assert_eq!(tables.apps["61"].entry.name, "Portal");
        assert!(tables.developers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bodies_are_no_data() {
        let api = ScriptedApi::default();
        let store = MemoryCatalogStore::new();
        let sink = RecordingSink::default();
        let collector = SteamCollector::new(
            &api,
            &store,
            &sink,
            RequestPacer::new(INTERVAL),
            regions(&["us", "jp"]),
        );

        let summary = collector.run(&ids(&["50"])).await;

        assert_eq!(summary.no_data, 2);
        assert_eq!(summary.failures, 0);
        assert!(store.snapshot().await.apps.is_empty());
    }
}
