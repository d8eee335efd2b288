//! Per-domain crawl session: pre-flight checks, UA/robots setup, and
//! orchestration of the collector + watchdogs + final flush.
//!
//! Grounded in `original_source/pkg/crawler/crawler.go: CrawlURL`.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use url::Url;

use crate::api_client::ApiClient;
use crate::config::FleetConfig;
use crate::crawl::collector::{Collector, CollectorConfig};
use crate::crawl::flush;
use crate::crawl::watchdog::{spawn_resource_ticker, spawn_signal_watcher, Done};
use crate::error::CrawlError;
use crate::robots::RobotsPolicy;

#[derive(Debug, serde::Deserialize)]
struct LocalUaResponse {
    code: i64,
    message: String,
}

/// Fetch the working user-agent from the parent supervisor's local
/// `/ua` endpoint (distinct from the coordinator API).
async fn fetch_local_ua(server_addr: &str) -> Result<String, CrawlError> {
    let url = format!("http://{server_addr}/ua");
    let resp = reqwest::get(&url)
        .await
        .map_err(|e| CrawlError::UaUnavailable(e.into()))?;
    let body: LocalUaResponse = resp
        .json()
        .await
        .map_err(|e| CrawlError::UaUnavailable(e.into()))?;
    if body.code != 200 {
        return Err(CrawlError::UaUnavailable(crate::error::ApiError::NonOkCode(body.code)));
    }
    Ok(body.message)
}

fn check_free_memory(floor_bytes: u64) -> Result<(), CrawlError> {
    let mut system = System::new();
    system.refresh_memory();
    let free = system.available_memory();
    let total = system.total_memory();

    if total < floor_bytes || free < floor_bytes {
        return Err(CrawlError::InsufficientMemory {
            free_mb: free / (1024 * 1024),
            floor_mb: floor_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

/// Run a single per-domain crawl to completion. `target_url` may omit
/// its scheme; `server_addr` is the parent supervisor's local listener.
pub async fn crawl_one(
    config: &FleetConfig,
    api: Arc<ApiClient>,
    target_url: &str,
    server_addr: &str,
    debug: bool,
) -> Result<(), CrawlError> {
    if target_url.is_empty() {
        return Err(CrawlError::EmptyUrl);
    }

    let target_url = if target_url.starts_with("http") {
        target_url.to_string()
    } else {
        format!("http://{target_url}")
    };

    check_free_memory(config.memory_floor_bytes)?;

    let parsed = Url::parse(&target_url)?;
    let allowed_domain = parsed.host_str().unwrap_or_default().to_lowercase();

    let ua = fetch_local_ua(server_addr).await?;
    log::info!("UA: {ua}");

    let robots = RobotsPolicy::fetch(&target_url, &ua).await?;
    log::info!("CrawlDelay: {:?}", robots.crawl_delay());

    if !robots.allowed("/") {
        log::error!("Crawling of / for {target_url} is disallowed by robots.txt");
        return Err(CrawlError::RobotsDisallowed);
    }

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .user_agent(ua.clone())
        .timeout(Duration::from_secs(config.read_timeout.as_secs().max(30)))
        .build()
        .map_err(|e| CrawlError::UaUnavailable(e.into()))?;

    let collector = Collector::new(
        CollectorConfig {
            allowed_domain: allowed_domain.clone(),
            max_domains_in_map: config.max_domains_in_map,
            parallelism: config.parallelism,
            random_delay_max: config.random_delay_max,
            head_check_timeout: config.head_check_timeout,
            crawl_filter_retry: config.crawl_filter_retry,
        },
        client,
        ua.clone(),
        robots,
    );

    let done = Done::new();
    let signal_handle = spawn_signal_watcher(done.clone());
    let ticker_handle = spawn_resource_ticker(
        done.clone(),
        config.tick_every,
        config.memory_ceiling_bytes,
        config.crawler_max_runtime,
    );

    tokio::select! {
        _ = collector.run(target_url.clone(), done.clone(), api.clone(), server_addr) => {
            done.signal();
        }
        _ = done.wait() => {}
    }

    signal_handle.abort();
    ticker_handle.abort();

    let remaining = collector.take_batch();
    flush::flush_batch(
        &remaining,
        &api,
        server_addr,
        &ua,
        config.head_check_timeout,
        config.crawl_filter_retry,
    )
    .await;

    log::info!("Crawler exit");
    if debug {
        log::debug!("debug mode: allowed_domain={allowed_domain}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_insufficient_memory() {
        let err = check_free_memory(u64::MAX).unwrap_err();
        assert!(matches!(err, CrawlError::InsufficientMemory { .. }));
    }

    #[tokio::test]
    async fn crawl_one_rejects_empty_url() {
        let config = FleetConfig::default();
        let api = Arc::new(ApiClient::new("http://127.0.0.1:1", "tok", 1));
        let err = crawl_one(&config, api, "", "127.0.0.1:1", false).await.unwrap_err();
        assert!(matches!(err, CrawlError::EmptyUrl));
    }
}
