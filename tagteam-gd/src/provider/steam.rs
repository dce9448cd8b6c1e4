//! Steam HTTP providers
//!
//! # API Reference
//! - Bulk catalog: `IStoreService/GetAppList/v1`: pages of `{appid, name}` with
//!   `have_more_results` / `last_appid` continuation
//! - App details: PICS product info as JSON (`{"data": {"<id>": {"common": ...}}}`),
//!   anonymous access, one id per request
//!
//! Both clients share a token-bucket rate limiter so requests never exceed the
//! configured rate, whichever stage issues them.

use super::{CatalogProvider, DetailProvider, DetailSession};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::models::{AppDetails, AppInfo, CatalogEntry, CatalogPage, GameId};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Placeholder replaced by the app id in the detail URL template
const ID_PLACEHOLDER: &str = "{id}";

/// Build the shared HTTP client
pub fn build_http_client(config: &ProviderConfig) -> Result<Client, ProviderError> {
    let mut headers = header::HeaderMap::new();
    let user_agent = tagteam_common::config::get_user_agent();
    let value = header::HeaderValue::from_str(&user_agent)
        .map_err(|e| ProviderError::Connect(format!("invalid user agent: {e}")))?;
    headers.insert(header::USER_AGENT, value);

    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| ProviderError::Connect(format!("failed to build HTTP client: {e}")))
}

/// Token bucket allowing `requests_per_second` requests per second
pub fn build_rate_limiter(requests_per_second: u32) -> Arc<DefaultDirectRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rate)))
}

/// Read a body, mapping error statuses and empty payloads
async fn read_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(ProviderError::EmptyPayload);
    }
    Ok(body)
}

// ============================================================================
// Bulk Catalog
// ============================================================================

/// `GetAppList` client
pub struct SteamCatalogClient {
    http_client: Client,
    url: String,
    api_key: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl SteamCatalogClient {
    pub fn new(
        http_client: Client,
        config: &ProviderConfig,
        rate_limiter: Arc<DefaultDirectRateLimiter>,
    ) -> Self {
        Self {
            http_client,
            url: config.catalog_url.clone(),
            api_key: config.api_key.clone(),
            rate_limiter,
        }
    }
}

#[async_trait]
impl CatalogProvider for SteamCatalogClient {
    async fn fetch_page(
        &self,
        cursor: Option<GameId>,
        max_results: u32,
    ) -> Result<CatalogPage, ProviderError> {
        self.rate_limiter.until_ready().await;

        let mut query: Vec<(&str, String)> = vec![
            ("format", "json".to_string()),
            ("max_results", max_results.to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }
        if let Some(last) = cursor {
            query.push(("last_appid", last.to_string()));
        }

        debug!(cursor = ?cursor, max_results, "Requesting catalog page");
        let response = self.http_client.get(&self.url).query(&query).send().await?;
        let body = read_body(response).await?;
        parse_catalog_page(&body)
    }
}

/// Parse a `GetAppList` body
pub fn parse_catalog_page(body: &str) -> Result<CatalogPage, ProviderError> {
    let envelope: AppListEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("catalog page: {e}")))?;

    let entries = envelope
        .response
        .apps
        .into_iter()
        .map(|app| CatalogEntry {
            id: app.appid,
            name: app.name,
        })
        .collect();

    Ok(CatalogPage {
        entries,
        have_more: envelope.response.have_more_results,
        last_id: envelope.response.last_appid,
    })
}

#[derive(Debug, Deserialize)]
struct AppListEnvelope {
    response: AppListResponse,
}

#[derive(Debug, Default, Deserialize)]
struct AppListResponse {
    #[serde(default)]
    apps: Vec<AppListApp>,
    #[serde(default)]
    have_more_results: bool,
    #[serde(default)]
    last_appid: Option<GameId>,
}

#[derive(Debug, Deserialize)]
struct AppListApp {
    appid: GameId,
    #[serde(default)]
    name: String,
}

// ============================================================================
// App Details
// ============================================================================

/// Anonymous product-info client
pub struct SteamDetailClient {
    http_client: Client,
    url_template: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl SteamDetailClient {
    pub fn new(
        http_client: Client,
        config: &ProviderConfig,
        rate_limiter: Arc<DefaultDirectRateLimiter>,
    ) -> Self {
        Self {
            http_client,
            url_template: config.detail_url.clone(),
            rate_limiter,
        }
    }
}

#[async_trait]
impl DetailProvider for SteamDetailClient {
    async fn connect(&self) -> Result<Box<dyn DetailSession>, ProviderError> {
        if !self.url_template.contains(ID_PLACEHOLDER) {
            return Err(ProviderError::Connect(format!(
                "detail URL has no {ID_PLACEHOLDER} placeholder: {}",
                self.url_template
            )));
        }

        debug!("Opened anonymous detail session");
        Ok(Box::new(SteamDetailSession {
            http_client: self.http_client.clone(),
            url_template: self.url_template.clone(),
            rate_limiter: Arc::clone(&self.rate_limiter),
            requests: 0,
        }))
    }
}

struct SteamDetailSession {
    http_client: Client,
    url_template: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    requests: u64,
}

#[async_trait]
impl DetailSession for SteamDetailSession {
    async fn app_details(&mut self, id: GameId) -> Result<AppDetails, ProviderError> {
        self.rate_limiter.until_ready().await;
        self.requests += 1;

        let url = self.url_template.replace(ID_PLACEHOLDER, &id.to_string());
        let response = self.http_client.get(&url).send().await?;
        let body = read_body(response).await?;
        parse_app_details(id, &body)
    }

    async fn disconnect(self: Box<Self>) {
        debug!(requests = self.requests, "Closed detail session");
    }
}

/// Parse a product-info body for `id`
///
/// Only a successful body whose `data` object lacks the id, or maps it to
/// `null` or `{}`, means the id is unknown. A body without a `data` object is
/// a parse error, so throttle pages stay retryable.
pub fn parse_app_details(id: GameId, body: &str) -> Result<AppDetails, ProviderError> {
    let envelope: DetailEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("app {id}: {e}")))?;

    if let Some(status) = envelope.status.as_deref() {
        if status != "success" {
            return Err(ProviderError::Api {
                status: 200,
                message: format!("provider status {status}"),
            });
        }
    }

    let data = match envelope.data {
        Some(Value::Object(data)) => data,
        Some(other) => {
            return Err(ProviderError::Parse(format!(
                "app {id}: data is not an object: {other}"
            )))
        }
        None => return Err(ProviderError::Parse(format!("app {id}: no data object"))),
    };

    match data.get(&id.to_string()) {
        None | Some(Value::Null) => Ok(AppDetails::Unknown),
        Some(Value::Object(map)) if map.is_empty() => Ok(AppDetails::Unknown),
        Some(value) => {
            let info: AppInfo = serde_json::from_value(value.clone())
                .map_err(|e| ProviderError::Parse(format!("app {id}: {e}")))?;
            Ok(AppDetails::Found(info))
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    status: Option<String>,
}
