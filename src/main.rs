//! `idun-fleet` entrypoint: a `supervise` process that owns the worker
//! pool and local HTTP seam, and a `crawl-one` subprocess that each
//! worker re-execs per domain.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use idun_fleet::api_client::ApiClient;
use idun_fleet::cache::LocalCache;
use idun_fleet::config::{self, FleetConfig, FleetConfigBuilder};
use idun_fleet::local_server::{self, LocalServerState};
use idun_fleet::pool::WorkerPool;
use idun_fleet::{crawl, health, registry};

#[derive(Parser)]
#[command(name = "idun-fleet", about = "Distributed, politeness-aware web-crawling fleet core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervisor: worker pool, local HTTP seam, service registration.
    Supervise {
        #[arg(long)]
        coordinator_url: Option<String>,
        #[arg(long)]
        custom_domains_url: Option<String>,
        #[arg(long)]
        registry_url: Option<String>,
        #[arg(long, default_value_t = 8080)]
        webserver_port: u16,
        #[arg(long, default_value_t = 1)]
        overcommit_ratio: u32,
        #[arg(long)]
        debug: bool,
    },
    /// Crawl a single domain, reporting to a parent supervisor's local seam.
    CrawlOne {
        #[arg(long)]
        url: String,
        #[arg(long)]
        server: String,
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Supervise {
            coordinator_url,
            custom_domains_url,
            registry_url,
            webserver_port,
            overcommit_ratio,
            debug,
        } => {
            supervise(
                coordinator_url,
                custom_domains_url,
                registry_url,
                webserver_port,
                overcommit_ratio,
                debug,
            )
            .await
        }
        Command::CrawlOne { url, server, debug } => crawl_one(url, server, debug).await,
    }
}

async fn supervise(
    coordinator_url: Option<String>,
    custom_domains_url: Option<String>,
    registry_url: Option<String>,
    webserver_port: u16,
    overcommit_ratio: u32,
    debug: bool,
) -> anyhow::Result<()> {
    let mut config = config::config_from_env();
    let mut builder = FleetConfigBuilder::new()
        .session_token(config.session_token.clone())
        .webserver_port(webserver_port)
        .overcommit_ratio(overcommit_ratio)
        .debug(debug)
        .custom_domains_url(custom_domains_url);
    if let Some(url) = coordinator_url {
        builder = builder.coordinator_base_url(url);
    }
    if let Some(url) = registry_url {
        builder = builder.registry_url(Some(url));
    } else if let Some(url) = config.registry_url.take() {
        builder = builder.registry_url(Some(url));
    }
    let config = Arc::new(builder.build());

    let cache = Arc::new(LocalCache::new());
    let api = Arc::new(ApiClient::with_custom_domains_url(
        config.coordinator_base_url.clone(),
        config.session_token.clone(),
        config.custom_domains_url.clone(),
        config.api_retry_max,
    ));

    let ua = api.get_ua().await.unwrap_or_else(|err| {
        log::warn!("failed to obtain UA from coordinator, using fallback: {err}");
        "idun-fleet/1.0".to_string()
    });

    let state = Arc::new(LocalServerState {
        cache: cache.clone(),
        user_agent: ua,
        upload_ttl: config.cache_default_ttl,
    });
    // The worker pool shares the supervisor's own cache instance with
    // the local HTTP seam, so uploads from crawl-one subprocesses land
    // in the same queue workers drain from.
    let local_addr = local_server::spawn(state).await?;
    log::info!("local seam listening on {local_addr}");

    let health_app = health::router();
    let health_listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.webserver_port)).await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(health_listener, health_app).await {
            log::error!("health server exited: {err}");
        }
    });

    registry::register_if_configured(
        config.registry_url.as_deref(),
        &config.environment,
        config.webserver_port,
    )
    .await;

    let exe_path = std::env::current_exe()?.to_string_lossy().to_string();
    let pool = WorkerPool::new(config.clone(), cache, api, exe_path, local_addr.to_string());
    let handles = pool.spawn_all();

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown requested");
    registry::deregister_if_configured(config.registry_url.as_deref(), &config.environment).await;
    for handle in handles {
        handle.abort();
    }

    Ok(())
}

async fn crawl_one(url: String, server: String, debug: bool) -> anyhow::Result<()> {
    let config = FleetConfig::default();
    let api = Arc::new(ApiClient::new(
        config.coordinator_base_url.clone(),
        config.session_token.clone(),
        config.api_retry_max,
    ));

    crawl::crawl_one(&config, api, &url, &server, debug).await?;
    Ok(())
}
