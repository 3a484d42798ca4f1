//! Runtime configuration, resolved from the environment (and `.env`).
use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::str::FromStr;
use std::time::Duration;

use crate::util::env::{env_flag, env_list, env_opt, env_parse, env_parse_opt};

pub const DEFAULT_STORE_BASE: &str = "https://store.steampowered.com";
pub const DEFAULT_WEB_API_BASE: &str = "https://api.steampowered.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamEndpoints {
    pub store_base: String,
    pub web_api_base: String,
}

impl Default for SteamEndpoints {
    fn default() -> Self {
        Self {
            store_base: DEFAULT_STORE_BASE.to_string(),
            web_api_base: DEFAULT_WEB_API_BASE.to_string(),
        }
    }
}

/// Storefront market code passed as `cc=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub code: String,
}

impl Region {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.trim().to_ascii_lowercase(),
        }
    }
}

/// Parse `us,jp` or the `US:USD,JP:JPY` form; duplicates keep the first position.
pub fn parse_regions(raw: &[String]) -> Vec<Region> {
    let mut out: Vec<Region> = Vec::new();
    for part in raw {
        let code = part.split(':').next().unwrap_or_default().trim();
        if code.is_empty() {
            continue;
        }
        let region = Region::new(code);
        if !out.contains(&region) {
            out.push(region);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFeed {
    Catalog,
    Featured,
    FeaturedCategories,
}

impl FromStr for TargetFeed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "catalog" | "all" | "applist" => Ok(TargetFeed::Catalog),
            "featured" => Ok(TargetFeed::Featured),
            "featured_categories" | "featuredcategories" => Ok(TargetFeed::FeaturedCategories),
            other => bail!("unknown target feed {other:?}"),
        }
    }
}

/// How child-table replacements of one pass reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// One transaction per identifier+region pass.
    #[default]
    Transactional,
    /// Base row first, then child tables as joined concurrent statements.
    Concurrent,
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transactional" | "tx" => Ok(SyncMode::Transactional),
            "concurrent" | "parallel" => Ok(SyncMode::Concurrent),
            other => bail!("unknown sync mode {other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub window: TimeDelta,
    pub collectible_types: Vec<String>,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            window: TimeDelta::days(7),
            collectible_types: vec!["game".into(), "dlc".into()],
        }
    }
}

impl FreshnessPolicy {
    /// Rows updated after this instant are still fresh.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_signed(self.window)
            .with_context(|| format!("freshness window {} reaches before the calendar", self.window))
    }
}

pub fn freshness_window(days: i64) -> Result<TimeDelta> {
    if days < 0 {
        bail!("STEAM_FRESHNESS_DAYS must not be negative (got {days})");
    }
    TimeDelta::try_days(days)
        .with_context(|| format!("STEAM_FRESHNESS_DAYS={days} is out of range"))
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub endpoints: SteamEndpoints,
    pub api_key: Option<String>,
    pub language: String,
    pub regions: Vec<Region>,
    pub min_interval: Duration,
    pub pace_skipped_regions: bool,
    pub http_timeout: Duration,
    pub feeds: Vec<TargetFeed>,
    pub app_ids: Vec<String>,
    pub app_limit: Option<usize>,
    pub freshness: FreshnessPolicy,
    pub sync_mode: SyncMode,
    pub webhook_url: Option<String>,
    pub db_max_connections: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoints: SteamEndpoints::default(),
            api_key: None,
            language: "en".into(),
            regions: vec![Region::new("us"), Region::new("jp")],
            min_interval: Duration::from_millis(1500),
            pace_skipped_regions: false,
            http_timeout: Duration::from_secs(30),
            feeds: vec![TargetFeed::Catalog],
            app_ids: Vec::new(),
            app_limit: None,
            freshness: FreshnessPolicy::default(),
            sync_mode: SyncMode::default(),
            webhook_url: None,
            db_max_connections: 4,
        }
    }
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let regions = env_list("STEAM_REGIONS")
            .map(|raw| parse_regions(&raw))
            .unwrap_or(defaults.regions);
        if regions.is_empty() {
            bail!("STEAM_REGIONS resolved to an empty region list");
        }

        let feeds = match env_list("STEAM_TARGET_FEEDS") {
            Some(raw) => {
                let mut feeds = Vec::new();
                for item in raw {
                    let feed: TargetFeed = item.parse()?;
                    if !feeds.contains(&feed) {
                        feeds.push(feed);
                    }
                }
                feeds
            }
            None => defaults.feeds,
        };

        let sync_mode = match env_opt("STEAM_SYNC_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.sync_mode,
        };

        let freshness = FreshnessPolicy {
            window: freshness_window(env_parse("STEAM_FRESHNESS_DAYS", 7i64))?,
            collectible_types: env_list("STEAM_COLLECTIBLE_TYPES")
                .unwrap_or(defaults.freshness.collectible_types),
        };

        Ok(Self {
            endpoints: SteamEndpoints {
                store_base: env_opt("STEAM_STORE_BASE_URL")
                    .unwrap_or(defaults.endpoints.store_base),
                web_api_base: env_opt("STEAM_WEB_API_BASE_URL")
                    .unwrap_or(defaults.endpoints.web_api_base),
            },
            api_key: env_opt("STEAM_API_KEY"),
            language: env_opt("STEAM_LANGUAGE").unwrap_or(defaults.language),
            regions,
            min_interval: Duration::from_millis(env_parse("STEAM_SLEEP_MS", 1500u64)),
            pace_skipped_regions: env_flag("STEAM_PACE_SKIPPED_REGIONS", false),
            http_timeout: Duration::from_secs(env_parse("STEAM_HTTP_TIMEOUT_SECS", 30u64)),
            feeds,
            app_ids: env_list("STEAM_APP_IDS").unwrap_or_default(),
            app_limit: env_parse_opt("STEAM_APP_LIMIT"),
            freshness,
            sync_mode,
            webhook_url: env_opt("WEBHOOK_URL"),
            db_max_connections: env_parse("DB_MAX_CONNS", defaults.db_max_connections),
        })
    }

    /// Keys logged (redacted) by the preflight snapshot.
    pub const LOGGED_KEYS: &'static [&'static str] = &[
        "DATABASE_URL",
        "DB_URL",
        "DB_MAX_CONNS",
        "AUTO_MIGRATE",
        "STEAM_REGIONS",
        "STEAM_LANGUAGE",
        "STEAM_SLEEP_MS",
        "STEAM_PACE_SKIPPED_REGIONS",
        "STEAM_FRESHNESS_DAYS",
        "STEAM_COLLECTIBLE_TYPES",
        "STEAM_TARGET_FEEDS",
        "STEAM_APP_IDS",
        "STEAM_APP_LIMIT",
        "STEAM_SYNC_MODE",
        "STEAM_API_KEY",
        "STEAM_HTTP_TIMEOUT_SECS",
        "WEBHOOK_URL",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn regions_accept_currency_suffix_and_dedup() {
        let regions = parse_regions(&strings(&["US:USD", "jp", "us", " GB:GBP "]));
        let codes: Vec<&str> = regions.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["us", "jp", "gb"]);
    }

    #[test]
    fn feeds_and_modes_parse() {
        assert_eq!("catalog".parse::<TargetFeed>().unwrap(), TargetFeed::Catalog);
        assert_eq!(
            "featured-categories".parse::<TargetFeed>().unwrap(),
            TargetFeed::FeaturedCategories
        );
        assert!("wishlist".parse::<TargetFeed>().is_err());
        assert_eq!("Concurrent".parse::<SyncMode>().unwrap(), SyncMode::Concurrent);
    }

    #[test]
    fn defaults_put_us_first() {
        let cfg = CollectorConfig::default();
        assert_eq!(cfg.regions[0].code, "us");
        assert_eq!(cfg.min_interval, Duration::from_millis(1500));
        assert_eq!(cfg.freshness.window, TimeDelta::days(7));
    }

    #[test]
    fn freshness_window_rejects_out_of_range_days() {
        assert_eq!(freshness_window(7).unwrap(), TimeDelta::days(7));
        assert_eq!(freshness_window(0).unwrap(), TimeDelta::zero());
        assert!(freshness_window(-1).is_err());
        assert!(freshness_window(i64::MAX).is_err());
    }

    #[test]
    fn cutoff_reports_overflow() {
        let now = Utc::now();
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.cutoff(now).unwrap(), now - TimeDelta::days(7));

        let huge = FreshnessPolicy {
            window: freshness_window(100_000_000).unwrap(),
            ..FreshnessPolicy::default()
        };
        assert!(huge.cutoff(now).is_err());
    }
}
