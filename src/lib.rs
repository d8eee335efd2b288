//! Supervisor/worker core for a distributed, politeness-aware
//! web-crawling fleet.
//!
//! A supervisor process owns the worker pool, local HTTP seam, and
//! service registration; each worker re-execs this binary's
//! `crawl-one` subcommand to run one subprocess-isolated crawl per
//! domain.

pub mod api_client;
pub mod cache;
pub mod config;
pub mod crawl;
pub mod dedup;
pub mod error;
pub mod health;
pub mod local_server;
pub mod peer_discovery;
pub mod pool;
pub mod registry;
pub mod robots;
pub mod supervisor;
