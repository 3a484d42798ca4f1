//! One collection run: target feeds, freshness filter, then the region loop.
use anyhow::{Context, Result};
use tracing::info;

use crate::config::CollectorConfig;
use crate::database_ops::alerts::AlertSink;
use crate::database_ops::catalog_sync::CatalogStore;
use crate::database_ops::steam::client::StoreApi;
use crate::database_ops::steam::pacer::RequestPacer;
use crate::database_ops::steam::provider::{RunSummary, SteamCollector};
use crate::database_ops::steam::targets::{reject, TargetSource};

/// Identifiers the next run will visit, in visiting order.
///
/// An explicit `app_ids` list replaces the feeds; the freshness filter and
/// `app_limit` apply either way.
pub async fn resolve_targets(
    config: &CollectorConfig,
    api: &dyn StoreApi,
    store: &dyn CatalogStore,
) -> Result<Vec<String>> {
    let candidates = if config.app_ids.is_empty() {
        TargetSource::new(api).collect(&config.feeds).await?
    } else {
        info!(count = config.app_ids.len(), "steam: using explicit app ids");
        config.app_ids.clone()
    };
    let excluded = store
        .rejected_ids(&config.freshness)
        .await
        .context("failed to load freshness exclusions")?;
    let mut targets = reject(candidates, &excluded);
    if let Some(limit) = config.app_limit {
        if targets.len() > limit {
            info!(limit, "steam: truncating app ids to configured limit");
            targets.truncate(limit);
        }
    }
    info!(
        excluded = excluded.len(),
        targets = targets.len(),
        "steam: targets resolved"
    );
    Ok(targets)
}

pub async fn run_collection(
    config: &CollectorConfig,
    api: &dyn StoreApi,
    store: &dyn CatalogStore,
    alerts: &dyn AlertSink,
) -> Result<RunSummary> {
    let targets = resolve_targets(config, api, store).await?;
    let collector = SteamCollector::new(
        api,
        store,
        alerts,
        RequestPacer::new(config.min_interval),
        config.regions.clone(),
    )
    .pace_skipped_regions(config.pace_skipped_regions);
    Ok(collector.run(&targets).await)
}
