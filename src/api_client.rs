//! Retrying JSON client for the coordinator API.
//!
//! Grounded in `original_source/pkg/clients/apiclient/client.go`: three
//! endpoints (`/ua`, `/domains`, `/filter`), `X-Session-Token` header
//! on every request, gzip-compressed `/filter` bodies, and an
//! empty-input short-circuit on `filter_domains`.

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::dedup::dedup;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct UaResponse {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct DomainsEnvelope {
    domains: Vec<String>,
}

pub struct ApiClient {
    base_url: String,
    session_token: String,
    custom_domains_url: Option<String>,
    retry_max: u32,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>, retry_max: u32) -> Self {
        Self::with_custom_domains_url(base_url, session_token, None::<String>, retry_max)
    }

    pub fn with_custom_domains_url(
        base_url: impl Into<String>,
        session_token: impl Into<String>,
        custom_domains_url: Option<impl Into<String>>,
        retry_max: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client must build with static config");

        Self {
            base_url: base_url.into(),
            session_token: session_token.into(),
            custom_domains_url: custom_domains_url.map(Into::into),
            retry_max,
            client,
        }
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        max_attempts: u32,
    ) -> Result<reqwest::Response, ApiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(resp) if resp.status().is_server_error() && attempt < max_attempts => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt.saturating_sub(1)));
                    tokio::time::sleep(backoff).await;
                }
                Ok(resp) => return Ok(resp),
                Err(err) if attempt < max_attempts => {
                    log::warn!("coordinator request failed (attempt {attempt}): {err}");
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt.saturating_sub(1)));
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// `GET /ua` -> `UA` string. `code` must equal 200.
    pub async fn get_ua(&self) -> Result<String, ApiError> {
        let url = format!("{}/ua", self.base_url);
        let token = self.session_token.clone();
        let resp = self
            .send_with_retry(
                || {
                    self.client
                        .get(&url)
                        .header("X-Session-Token", token.clone())
                },
                self.retry_max,
            )
            .await?;

        let body: UaResponse = resp.json().await?;
        if body.code != 200 {
            return Err(ApiError::NonOkCode(body.code));
        }
        log::info!("UA: {}", body.message);
        Ok(body.message)
    }

    /// `GET /domains` (or `custom_domains_url` if configured) -> a
    /// non-empty domain list. Empty list is an error.
    pub async fn get_domains(&self) -> Result<Vec<String>, ApiError> {
        let url = self
            .custom_domains_url
            .clone()
            .unwrap_or_else(|| format!("{}/domains", self.base_url));
        let token = self.session_token.clone();
        let resp = self
            .send_with_retry(
                || {
                    self.client
                        .get(&url)
                        .header("X-Session-Token", token.clone())
                },
                self.retry_max,
            )
            .await?;

        let body: DomainsEnvelope = resp.json().await?;
        if body.domains.is_empty() {
            return Err(ApiError::EmptyDomains);
        }
        Ok(body.domains)
    }

    /// `POST /filter` with a gzip-compressed JSON body. Empty input
    /// short-circuits to an empty result without a request.
    pub async fn filter_domains(&self, incoming: &[String]) -> Result<Vec<String>, ApiError> {
        let domains = dedup(incoming);
        if domains.is_empty() {
            return Ok(Vec::new());
        }

        log::info!("Filter called: {domains:?}");

        let payload = DomainsEnvelope { domains };
        let json = serde_json::to_vec(&payload)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;

        let url = format!("{}/filter", self.base_url);
        let token = self.session_token.clone();
        let body = compressed.clone();
        let resp = self
            .send_with_retry(
                || {
                    self.client
                        .post(&url)
                        .header("X-Session-Token", token.clone())
                        .header("Content-Encoding", "gzip")
                        .body(body.clone())
                },
                self.retry_max,
            )
            .await?;

        let out: DomainsEnvelope = resp.json().await?;
        log::info!("Filtered domains: {:?}", out.domains);
        Ok(out.domains)
    }
}
