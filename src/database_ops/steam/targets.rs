use anyhow::{Context, Result};
use indexmap::IndexSet;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::{info, warn};

use super::client::StoreApi;
use super::models::{AppListResp, FeaturedCategoriesResp, FeaturedItem, FeaturedResp};
use crate::config::TargetFeed;

/// Produces candidate identifiers from the store's catalog feeds.
pub struct TargetSource<'a, A: StoreApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: StoreApi + ?Sized> TargetSource<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Full catalog listing, deduplicated, highest appid first.
    pub async fn fetch_catalog(&self) -> Result<Vec<String>> {
        let body = self
            .api
            .app_list()
            .await
            .context("failed to fetch Steam app list")?;
        Ok(parse_catalog(&body))
    }

    pub async fn fetch_featured(&self) -> Result<Vec<String>> {
        let body = self
            .api
            .featured()
            .await
            .context("failed to fetch featured list")?;
        Ok(parse_featured(&body))
    }

    pub async fn fetch_featured_categories(&self) -> Result<Vec<String>> {
        let body = self
            .api
            .featured_categories()
            .await
            .context("failed to fetch featured categories")?;
        Ok(parse_featured_categories(&body))
    }

    /// Run the configured feeds in order and merge them, first occurrence wins.
    pub async fn collect(&self, feeds: &[TargetFeed]) -> Result<Vec<String>> {
        let mut merged: IndexSet<String> = IndexSet::new();
        for feed in feeds {
            let ids = match feed {
                TargetFeed::Catalog => self.fetch_catalog().await?,
                TargetFeed::Featured => self.fetch_featured().await?,
                TargetFeed::FeaturedCategories => self.fetch_featured_categories().await?,
            };
            info!(feed = ?feed, count = ids.len(), "steam: target feed loaded");
            merged.extend(ids);
        }
        Ok(merged.into_iter().collect())
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(feed: &str, body: &str) -> T {
    if body.trim().is_empty() {
        warn!(feed, "steam: empty feed payload");
        return T::default();
    }
    match serde_json::from_str::<T>(body) {
        Ok(v) => v,
        Err(err) => {
            warn!(feed, error = %err, "steam: malformed feed payload; treating as empty");
            T::default()
        }
    }
}

pub fn parse_catalog(body: &str) -> Vec<String> {
    let parsed: Option<AppListResp> = decode_or_default("applist", body);
    let Some(resp) = parsed else {
        return Vec::new();
    };
    let mut ids: Vec<i64> = resp.applist.apps.into_iter().map(|a| a.appid).collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.dedup();
    ids.into_iter().map(|id| id.to_string()).collect()
}

fn merge_items<'a>(lists: impl IntoIterator<Item = Option<&'a Vec<FeaturedItem>>>) -> Vec<String> {
    let mut out: IndexSet<String> = IndexSet::new();
    for items in lists.into_iter().flatten() {
        out.extend(items.iter().map(|item| item.id.to_string()));
    }
    out.into_iter().collect()
}

pub fn parse_featured(body: &str) -> Vec<String> {
    let resp: FeaturedResp = decode_or_default("featured", body);
    merge_items([
        resp.featured_win.as_ref(),
        resp.featured_mac.as_ref(),
        resp.featured_linux.as_ref(),
    ])
}

pub fn parse_featured_categories(body: &str) -> Vec<String> {
    let resp: FeaturedCategoriesResp = decode_or_default("featuredcategories", body);
    merge_items(
        [
            resp.specials.as_ref(),
            resp.coming_soon.as_ref(),
            resp.top_sellers.as_ref(),
            resp.new_releases.as_ref(),
        ]
        .into_iter()
        .map(|section| section.and_then(|s| s.items.as_ref())),
    )
}

/// `candidates \ excluded`, keeping candidate order. Keys compare as raw strings.
pub fn reject(candidates: Vec<String>, excluded: &HashSet<String>) -> Vec<String> {
    candidates
        .into_iter()
        .filter(|id| !excluded.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FeedsOnly {
        applist: String,
        featured: String,
        categories: String,
    }

    #[async_trait]
    impl StoreApi for FeedsOnly {
        async fn app_list(&self) -> Result<String> {
            Ok(self.applist.clone())
        }
        async fn featured(&self) -> Result<String> {
            Ok(self.featured.clone())
        }
        async fn featured_categories(&self) -> Result<String> {
            Ok(self.categories.clone())
        }
        async fn app_details(&self, _appid: &str, _region: &str) -> Result<String> {
            anyhow::bail!("not used")
        }
    }

    #[test]
    fn catalog_is_deduplicated_and_descending() {
        let body = json!({
            "applist": { "apps": [
                { "appid": 10, "name": "Counter-Strike" },
                { "appid": 220, "name": "Half-Life 2" },
                { "appid": 10, "name": "Counter-Strike" },
                { "appid": 70, "name": "Half-Life" }
            ]}
        })
        .to_string();
        assert_eq!(parse_catalog(&body), vec!["220", "70", "10"]);
    }

    #[test]
    fn malformed_or_empty_payloads_yield_nothing() {
        assert!(parse_catalog("").is_empty());
        assert!(parse_catalog("{\"applist\":").is_empty());
        assert!(parse_catalog("null").is_empty());
        assert!(parse_featured("[]").is_empty());
        assert!(parse_featured_categories("").is_empty());
    }

    #[test]
    fn featured_sublists_may_be_absent() {
        let body = json!({
            "featured_win": [{ "id": 1 }, { "id": 2 }],
            "featured_linux": [{ "id": 2 }, { "id": 3 }]
        })
        .to_string();
        assert_eq!(parse_featured(&body), vec!["1", "2", "3"]);
    }

    #[test]
    fn featured_categories_merge_sections() {
        let body = json!({
            "specials": { "items": [{ "id": 5 }] },
            "coming_soon": {},
            "top_sellers": { "items": [{ "id": 5 }, { "id": 6 }] },
            "status": 1
        })
        .to_string();
        assert_eq!(parse_featured_categories(&body), vec!["5", "6"]);
    }

    #[test]
    fn reject_preserves_order_and_uses_exact_keys() {
        let candidates: Vec<String> = ["30", "20", "10", "010"].iter().map(|s| s.to_string()).collect();
        let excluded: HashSet<String> = ["20", "10 "].iter().map(|s| s.to_string()).collect();
        assert_eq!(reject(candidates, &excluded), vec!["30", "10", "010"]);
    }

    #[test]
    fn every_surviving_id_appears_once() {
        let candidates = parse_catalog(
            &json!({ "applist": { "apps": [
                { "appid": 3 }, { "appid": 1 }, { "appid": 2 }, { "appid": 3 }, { "appid": 4 }
            ]}})
            .to_string(),
        );
        let excluded: HashSet<String> = ["2".to_string()].into_iter().collect();
        let out = reject(candidates, &excluded);
        assert_eq!(out, vec!["4", "3", "1"]);
    }

    #[tokio::test]
    async fn collect_merges_feeds_in_order() {
        let api = FeedsOnly {
            applist: json!({ "applist": { "apps": [{ "appid": 1 }, { "appid": 9 }] } }).to_string(),
            featured: json!({ "featured_mac": [{ "id": 7 }, { "id": 9 }] }).to_string(),
            categories: "not json".into(),
        };
        let source = TargetSource::new(&api);
        let ids = source
            .collect(&[
                TargetFeed::Featured,
                TargetFeed::Catalog,
                TargetFeed::FeaturedCategories,
            ])
            .await
            .unwrap();
        assert_eq!(ids, vec!["7", "9", "1"]);
    }
}
