use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::SteamEndpoints;

/// Read-only surface of the Steam store used by the collector.
///
/// Every method performs exactly one outbound request and hands back the raw
/// body; decoding and defaulting happen in the callers so a flaky payload
/// never turns into a transport error.
#[async_trait]
pub trait StoreApi: Send + Sync {
    async fn app_list(&self) -> Result<String>;
    async fn featured(&self) -> Result<String>;
    async fn featured_categories(&self) -> Result<String>;
    async fn app_details(&self, appid: &str, region: &str) -> Result<String>;
}

pub struct SteamStoreClient {
    client: Client,
    endpoints: SteamEndpoints,
    language: String,
    api_key: Option<String>,
}

impl SteamStoreClient {
    pub fn new(
        endpoints: SteamEndpoints,
        language: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("steam-catalog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Steam HTTP client")?;
        Ok(Self {
            client,
            endpoints,
            language: language.into(),
            api_key,
        })
    }

    pub fn app_details_url(&self) -> String {
        format!(
            "{}/api/appdetails/",
            self.endpoints.store_base.trim_end_matches('/')
        )
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut req = self.client.get(url).header("Accept", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        resp.text()
            .await
            .with_context(|| format!("GET {url}: failed to read body"))
    }
}

#[async_trait]
impl StoreApi for SteamStoreClient {
    async fn app_list(&self) -> Result<String> {
        let url = format!(
            "{}/ISteamApps/GetAppList/v2/",
            self.endpoints.web_api_base.trim_end_matches('/')
        );
        match self.api_key.as_deref() {
            Some(key) => self.get_text(&url, &[("key", key), ("format", "json")]).await,
            None => self.get_text(&url, &[("format", "json")]).await,
        }
    }

    async fn featured(&self) -> Result<String> {
        let url = format!(
            "{}/api/featured/",
            self.endpoints.store_base.trim_end_matches('/')
        );
        self.get_text(&url, &[("l", self.language.as_str())]).await
    }

    async fn featured_categories(&self) -> Result<String> {
        let url = format!(
            "{}/api/featuredcategories/",
            self.endpoints.store_base.trim_end_matches('/')
        );
        self.get_text(&url, &[("l", self.language.as_str())]).await
    }

    async fn app_details(&self, appid: &str, region: &str) -> Result<String> {
        let url = self.app_details_url();
        self.get_text(
            &url,
            &[("l", self.language.as_str()), ("appids", appid), ("cc", region)],
        )
        .await
    }
}
