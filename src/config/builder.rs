//! Fluent builder for `FleetConfig`, in the style of the pack's
//! `CrawlerBuilder` (`aichat-bot-crawly/src/lib.rs`).

use std::time::Duration;

use super::defaults::*;
use super::FleetConfig;

pub struct FleetConfigBuilder {
    config: FleetConfig,
}

impl Default for FleetConfigBuilder {
    fn default() -> Self {
        FleetConfigBuilder {
            config: FleetConfig {
                coordinator_base_url: DEFAULT_COORDINATOR_BASE_URL.to_string(),
                session_token: String::new(),
                custom_domains_url: None,
                registry_url: None,
                environment: DEFAULT_ENVIRONMENT.to_string(),
                webserver_port: 80,
                overcommit_ratio: 1,
                debug: false,
                max_domains_in_map: MAX_DOMAINS_IN_MAP,
                tick_every: Duration::from_secs(10),
                parallelism: 2,
                random_delay_max: Duration::from_secs(60),
                api_retry_max: 3,
                read_timeout: Duration::from_secs(30),
                write_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(60),
                get_domains_retry: Duration::from_secs(60),
                crawler_extra: Duration::from_secs(10),
                kill_sleep: Duration::from_secs(3),
                crawl_filter_retry: Duration::from_secs(60),
                head_check_timeout: Duration::from_secs(10),
                crawler_max_runtime: Duration::from_secs(600),
                memory_ceiling_bytes: TWO_GIGS,
                memory_floor_bytes: HALF_GIG,
                cache_default_ttl: Duration::from_secs(3600),
                max_per_core: 16,
                max_per_gig: 4,
            },
        }
    }
}

impl FleetConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coordinator_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.coordinator_base_url = url.into();
        self
    }

    pub fn session_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.session_token = token.into();
        self
    }

    pub fn custom_domains_url<S: Into<String>>(mut self, url: Option<S>) -> Self {
        self.config.custom_domains_url = url.map(Into::into);
        self
    }

    pub fn registry_url<S: Into<String>>(mut self, url: Option<S>) -> Self {
        self.config.registry_url = url.map(Into::into);
        self
    }

    pub fn webserver_port(mut self, port: u16) -> Self {
        self.config.webserver_port = port;
        self
    }

    pub fn overcommit_ratio(mut self, ratio: u32) -> Self {
        self.config.overcommit_ratio = ratio;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn max_domains_in_map(mut self, max: usize) -> Self {
        self.config.max_domains_in_map = max;
        self
    }

    pub fn build(self) -> FleetConfig {
        self.config
    }
}

/// Build a `FleetConfig` from the process environment, matching
/// `original_source`'s `FREYA` / `CONSUL` variable contract.
pub fn config_from_env() -> FleetConfig {
    let mut builder = FleetConfigBuilder::new()
        .session_token(std::env::var("FREYA").unwrap_or_default());

    if let Ok(consul) = std::env::var("CONSUL") {
        if !consul.is_empty() {
            let url = if consul.starts_with("http://") || consul.starts_with("https://") {
                consul
            } else {
                format!("http://{consul}:8500")
            };
            builder = builder.registry_url(Some(url));
        }
    }

    builder.build()
}
