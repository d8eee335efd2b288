//! Fleet-wide configuration.
//!
//! Replaces the original's package-level globals (`FreyaKey`, `APIBase`,
//! build-info strings) with a single record built once at startup and
//! threaded through every component.

mod builder;
mod defaults;

pub use builder::{config_from_env, FleetConfigBuilder};
pub use defaults::*;

use std::time::Duration;

/// Immutable configuration shared by every component of one supervisor
/// process. Cheap to clone (wrap in `Arc` at the call site if needed).
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub coordinator_base_url: String,
    pub session_token: String,
    pub custom_domains_url: Option<String>,

    pub registry_url: Option<String>,
    pub environment: String,

    pub webserver_port: u16,
    pub overcommit_ratio: u32,
    pub debug: bool,

    pub max_domains_in_map: usize,
    pub tick_every: Duration,
    pub parallelism: usize,
    pub random_delay_max: Duration,
    pub api_retry_max: u32,

    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,

    pub get_domains_retry: Duration,
    pub crawler_extra: Duration,
    pub kill_sleep: Duration,
    pub crawl_filter_retry: Duration,
    pub head_check_timeout: Duration,
    pub crawler_max_runtime: Duration,
    pub memory_ceiling_bytes: u64,
    pub memory_floor_bytes: u64,

    pub cache_default_ttl: Duration,
    pub max_per_core: usize,
    pub max_per_gig: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        FleetConfigBuilder::default().build()
    }
}
