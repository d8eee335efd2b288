//! Crate-wide error types.
//!
//! Each component boundary gets its own `thiserror` enum; `FleetError`
//! composes them for call sites that cross more than one boundary
//! (the worker pool, mainly).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    EmptyKey,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api returned non-ok code {0}")]
    NonOkCode(i64),
    #[error("empty domain list returned by coordinator")]
    EmptyDomains,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("could not parse url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("target url must not be empty")]
    EmptyUrl,
    #[error("insufficient free memory: {free_mb}MiB free, {floor_mb}MiB required")]
    InsufficientMemory { free_mb: u64, floor_mb: u64 },
    #[error("could not obtain user agent from supervisor: {0}")]
    UaUnavailable(#[from] ApiError),
    #[error("could not parse target url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("disallowed by robots.txt")]
    RobotsDisallowed,
    #[error("robots.txt handling failed: {0}")]
    Robots(#[from] RobotsError),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn crawler subprocess: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no non-loopback interface address found")]
    NoAddress,
    #[error("local system lookup failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry returned status {0}")]
    NonOkStatus(u16),
}

#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("startup precondition failed: {0}")]
    StartupFatal(String),
}
