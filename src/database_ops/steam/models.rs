use bigdecimal::BigDecimal;
use serde::Deserialize;

// -------- wire payloads for the target feeds --------

#[derive(Debug, Deserialize)]
pub struct AppListResp {
    pub applist: AppList,
}

#[derive(Debug, Deserialize)]
pub struct AppList {
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AppEntry {
    pub appid: i64,
    #[allow(dead_code)]
    #[serde(default)]
    pub name: String,
}

/// `{id}` items shared by both featured feeds.
#[derive(Debug, Deserialize)]
pub struct FeaturedItem {
    pub id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeaturedResp {
    #[serde(default)]
    pub featured_win: Option<Vec<FeaturedItem>>,
    #[serde(default)]
    pub featured_mac: Option<Vec<FeaturedItem>>,
    #[serde(default)]
    pub featured_linux: Option<Vec<FeaturedItem>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeaturedSection {
    #[serde(default)]
    pub items: Option<Vec<FeaturedItem>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeaturedCategoriesResp {
    #[serde(default)]
    pub specials: Option<FeaturedSection>,
    #[serde(default)]
    pub coming_soon: Option<FeaturedSection>,
    #[serde(default)]
    pub top_sellers: Option<FeaturedSection>,
    #[serde(default)]
    pub new_releases: Option<FeaturedSection>,
}

// -------- normalized record set --------

/// Row of the `apps` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub appid: String,
    pub name: String,
    pub app_type: String,
    pub recommendations: i64,
    pub is_free: bool,
}

impl CatalogEntry {
    /// Blank row written when the store reports `success:false`, so the
    /// identifier is marked as seen.
    pub fn tombstone(appid: &str) -> Self {
        Self {
            appid: appid.to_string(),
            name: String::new(),
            app_type: String::new(),
            recommendations: 0,
            is_free: false,
        }
    }
}

/// Regional price in major currency units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub currency: String,
    pub initial: BigDecimal,
    pub final_amount: BigDecimal,
    pub discount_percent: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Kept verbatim; the store renders dates per locale ("1 Nov, 1998").
    pub date: String,
    pub coming_soon: bool,
}

/// Everything one successful `appdetails` response yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDetails {
    pub entry: CatalogEntry,
    pub price: Option<PriceQuote>,
    pub developers: Vec<String>,
    pub publishers: Vec<String>,
    pub genres: Vec<Genre>,
    pub languages: Vec<String>,
    pub release: Option<ReleaseInfo>,
}

/// Outcome of reading one region's detail body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailResponse {
    /// Empty, unparsable or keyless body; nothing to record for this region.
    NoData,
    /// `success:false` from the store.
    Unavailable,
    Available(Box<AppDetails>),
}

impl DetailResponse {
    pub fn title(&self) -> Option<&str> {
        match self {
            DetailResponse::Available(details) => Some(details.entry.name.as_str()),
            _ => None,
        }
    }
}
