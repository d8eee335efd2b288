//! Worker pool: sizes itself from CPU/memory headroom, then runs one
//! loop per worker pulling from the cache, a pre-fetched job queue, and
//! finally the coordinator's `/domains` endpoint.
//!
//! Grounded in `original_source/pkg/utils/calculator.go`
//! (`Calculator.CalculateMaxWorkers`) and
//! `pkg/supervisor/supervisor.go`'s per-worker acquisition loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use url::Url;

use crate::api_client::ApiClient;
use crate::cache::LocalCache;
use crate::config::FleetConfig;
use crate::dedup::head_check_many;
use crate::supervisor;

/// `count = min(cpus*MAX_PER_CORE, free_gigs*MAX_PER_GIG)`, capped by
/// `MaxDomainsInMap`, floored at 1, then scaled by `overcommit_ratio`
/// before the final cap is re-applied.
pub fn worker_count(config: &FleetConfig) -> usize {
    let cpus = num_cpus::get().max(1);

    let mut system = System::new();
    system.refresh_memory();
    let free_gigs = (system.available_memory() / (1024 * 1024 * 1024)) as usize;

    let cpu_max = cpus * config.max_per_core;
    let mem_max = free_gigs * config.max_per_gig;
    let mut count = cpu_max.min(mem_max).max(1);

    if config.overcommit_ratio > 1 {
        count *= config.overcommit_ratio as usize;
    }

    count.min(config.max_domains_in_map).max(1)
}

pub struct WorkerPool {
    config: Arc<FleetConfig>,
    cache: Arc<LocalCache>,
    api: Arc<ApiClient>,
    exe_path: String,
    server_addr: String,
}

impl WorkerPool {
    pub fn new(
        config: Arc<FleetConfig>,
        cache: Arc<LocalCache>,
        api: Arc<ApiClient>,
        exe_path: impl Into<String>,
        server_addr: impl Into<String>,
    ) -> Self {
        Self {
            config,
            cache,
            api,
            exe_path: exe_path.into(),
            server_addr: server_addr.into(),
        }
    }

    /// Spawn `worker_count(config)` loops, each running until the
    /// process is torn down.
    pub fn spawn_all(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let count = worker_count(&self.config);
        log::info!("Starting {count} crawl workers");

        (0..count)
            .map(|id| {
                let config = self.config.clone();
                let cache = self.cache.clone();
                let api = self.api.clone();
                let exe_path = self.exe_path.clone();
                let server_addr = self.server_addr.clone();
                tokio::spawn(async move {
                    worker_loop(id, config, cache, api, exe_path, server_addr).await;
                })
            })
            .collect()
    }
}

async fn worker_loop(
    id: usize,
    config: Arc<FleetConfig>,
    cache: Arc<LocalCache>,
    api: Arc<ApiClient>,
    exe_path: String,
    server_addr: String,
) {
    let mut job_items: VecDeque<String> = VecDeque::new();

    loop {
        let domain = match acquire_domain(&config, &cache, &api, &mut job_items).await {
            Some(domain) => domain,
            None => {
                tokio::time::sleep(config.get_domains_retry).await;
                continue;
            }
        };

        log::info!("worker {id}: crawling {domain}");
        match supervisor::run_crawl(&config, &exe_path, &domain, &server_addr).await {
            Ok(status) => log::info!("worker {id}: {domain} exited with {status}"),
            Err(err) => log::error!("worker {id}: failed to spawn crawl for {domain}: {err}"),
        }

        submit_completion(&api, &domain).await;
    }
}

/// Item acquisition, first success wins: the local cache, this
/// worker's own pre-fetched queue, then the coordinator.
async fn acquire_domain(
    config: &FleetConfig,
    cache: &LocalCache,
    api: &ApiClient,
    job_items: &mut VecDeque<String>,
) -> Option<String> {
    let popped = cache.pop();
    if !popped.is_empty() {
        return Some(popped);
    }

    if let Some(domain) = job_items.pop_front() {
        return Some(domain);
    }

    match api.get_domains().await {
        Ok(domains) => {
            let checked = head_check_many(&domains, "idun-fleet", Duration::from_secs(10)).await;
            for (domain, ok) in checked {
                if ok {
                    job_items.push_back(domain);
                }
            }
            job_items.pop_front()
        }
        Err(err) => {
            log::error!("get_domains failed: {err}");
            None
        }
    }
}

/// Parse the crawled URL's host and report it back to the coordinator
/// via `/filter`, informing it that the host has been attempted.
async fn submit_completion(api: &ApiClient, result_url: &str) {
    let host = Url::parse(result_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| result_url.to_lowercase());

    if host.is_empty() {
        return;
    }

    match api.filter_domains(&[host.clone()]).await {
        Ok(_) => log::info!("completion reported for {host}"),
        Err(err) => log::error!("completion report failed for {host}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_never_returns_zero() {
        let mut config = FleetConfig::default();
        config.max_per_core = 0;
        config.max_per_gig = 0;
        assert_eq!(worker_count(&config), 1);
    }

    #[test]
    fn worker_count_respects_max_domains_cap() {
        let mut config = FleetConfig::default();
        config.max_per_core = 1_000_000;
        config.max_per_gig = 1_000_000;
        config.max_domains_in_map = 5;
        assert_eq!(worker_count(&config), 5);
    }

    #[test]
    fn worker_count_scales_with_overcommit() {
        let mut config = FleetConfig::default();
        config.max_per_core = 1;
        config.max_per_gig = 1_000_000;
        config.overcommit_ratio = 4;
        config.max_domains_in_map = 1_000_000;
        let baseline_cpus = num_cpus::get().max(1);
        assert_eq!(worker_count(&config), baseline_cpus * 4);
    }
}
