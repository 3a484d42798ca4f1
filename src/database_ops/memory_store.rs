//! In-process [`CatalogStore`] for `--dry-run` and tests.
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

use crate::config::FreshnessPolicy;
use crate::database_ops::catalog_sync::{CatalogStore, SyncPlan};
use crate::database_ops::steam::models::{CatalogEntry, Genre, PriceQuote, ReleaseInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredApp {
    pub entry: CatalogEntry,
    pub update_time: DateTime<Utc>,
}

/// Table contents keyed by appid (prices by `(appid, currency)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTables {
    pub apps: BTreeMap<String, StoredApp>,
    pub prices: BTreeMap<(String, String), PriceQuote>,
    pub developers: BTreeMap<String, Vec<String>>,
    pub publishers: BTreeMap<String, Vec<String>>,
    pub genres: BTreeMap<String, Vec<Genre>>,
    pub languages: BTreeMap<String, Vec<String>>,
    pub releases: BTreeMap<String, ReleaseInfo>,
}

fn replace<T: Clone>(table: &mut BTreeMap<String, Vec<T>>, appid: &str, rows: &[T]) {
    table.remove(appid);
    if !rows.is_empty() {
        table.insert(appid.to_string(), rows.to_vec());
    }
}

#[derive(Default)]
pub struct MemoryCatalogStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemoryTables {
        self.tables.lock().await.clone()
    }

    /// Pre-populate an `apps` row, e.g. to exercise the freshness filter.
    pub async fn seed_app(&self, entry: CatalogEntry, update_time: DateTime<Utc>) {
        let mut tables = self.tables.lock().await;
        tables
            .apps
            .insert(entry.appid.clone(), StoredApp { entry, update_time });
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn rejected_ids(&self, policy: &FreshnessPolicy) -> Result<HashSet<String>> {
        let cutoff = policy.cutoff(Utc::now())?;
        let tables = self.tables.lock().await;
        Ok(tables
            .apps
            .iter()
            .filter(|(_, app)| {
                !policy.collectible_types.contains(&app.entry.app_type)
                    || app.update_time > cutoff
            })
            .map(|(appid, _)| appid.clone())
            .collect())
    }

    async fn apply(&self, plan: &SyncPlan) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(entry) = &plan.base {
            tables.apps.insert(
                plan.appid.clone(),
                StoredApp {
                    entry: entry.clone(),
                    update_time: Utc::now(),
                },
            );
        }
        if let Some(quote) = &plan.price {
            tables
                .prices
                .insert((plan.appid.clone(), quote.currency.clone()), quote.clone());
        }
        if let Some(children) = &plan.children {
            replace(&mut tables.developers, &plan.appid, &children.developers);
            replace(&mut tables.publishers, &plan.appid, &children.publishers);
            replace(&mut tables.genres, &plan.appid, &children.genres);
            replace(&mut tables.languages, &plan.appid, &children.languages);
            match &children.release {
                Some(release) => {
                    tables.releases.insert(plan.appid.clone(), release.clone());
                }
                None => {
                    tables.releases.remove(&plan.appid);
                }
            }
        }
        Ok(())
    }
}
