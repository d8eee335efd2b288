//! End-to-end scenarios from the per-domain crawler's design: link
//! routing (external batch membership, nofollow handling) and the
//! robots.txt pre-crawl gate.
//!
//! Scenarios 4 and 6 (batch-cap flush, subprocess memory kill) are
//! covered at the unit level in `src/pool.rs` and `src/crawl/collector.rs`
//! / `src/crawl/watchdog.rs` respectively, since they require injecting
//! process-table and memory-ceiling conditions that a black-box
//! integration test cannot observe deterministically.

use std::sync::Arc;
use std::time::Duration;

use idun_fleet::api_client::ApiClient;
use idun_fleet::config::FleetConfig;
use idun_fleet::crawl;
use idun_fleet::crawl::collector::{Collector, CollectorConfig};
use idun_fleet::robots::RobotsPolicy;

fn collector_config(allowed_domain: &str) -> CollectorConfig {
    CollectorConfig {
        allowed_domain: allowed_domain.to_string(),
        max_domains_in_map: 32,
        parallelism: 1,
        random_delay_max: Duration::from_millis(10),
        head_check_timeout: Duration::from_millis(200),
        crawl_filter_retry: Duration::from_millis(10),
    }
}

async fn run_collector_against(body: &str) -> (Collector, mockito::ServerGuard) {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nAllow: /\n")
        .create_async()
        .await;

    let origin = server.url();
    let host = server.host_with_port();
    let robots = RobotsPolicy::fetch(&origin, "test-agent").await.unwrap();

    let client = reqwest::Client::builder().pool_max_idle_per_host(0).build().unwrap();
    let collector = Collector::new(collector_config(&host), client, "test-agent".to_string(), robots);

    let api = Arc::new(ApiClient::new("http://127.0.0.1:1", "tok", 1));
    tokio::time::timeout(
        Duration::from_secs(5),
        collector.run(origin, idun_fleet::crawl::watchdog::Done::new(), api, "127.0.0.1:1"),
    )
    .await
    .expect("collector must drain within the timeout");

    (collector, server)
}

#[tokio::test]
async fn scenario_1_two_external_anchors_enter_the_batch() {
    let body = r#"<html><body>
        <a href="http://a.test/">A</a>
        <a href="http://b.test/">B</a>
    </body></html>"#;
    let (collector, _server) = run_collector_against(body).await;

    let batch = collector.batch_snapshot();
    assert!(batch.contains("a.test"));
    assert!(batch.contains("b.test"));
}

#[tokio::test]
async fn scenario_2_nofollow_is_honored_for_ordinary_hosts() {
    let body = r#"<html><body>
        <a href="http://a.test/" rel="nofollow">A</a>
    </body></html>"#;
    let (collector, _server) = run_collector_against(body).await;

    let batch = collector.batch_snapshot();
    assert!(!batch.contains("a.test"));
}

#[tokio::test]
async fn scenario_3_nofollow_is_ignored_on_blogspot() {
    let body = r#"<html><body>
        <a href="http://x.blogspot.com/" rel="nofollow">X</a>
    </body></html>"#;
    let (collector, _server) = run_collector_against(body).await;

    let batch = collector.batch_snapshot();
    assert!(batch.contains("x.blogspot.com"));
}

#[tokio::test]
async fn scenario_5_robots_disallow_root_aborts_before_any_fetch() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /\n")
        .create_async()
        .await;
    let root_mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("should never be fetched")
        .expect(0)
        .create_async()
        .await;

    let ua_mock = server
        .mock("GET", "/ua")
        .with_status(200)
        .with_body(r#"{"code":200,"message":"test-agent"}"#)
        .create_async()
        .await;

    let server_addr = server.host_with_port();
    let config = FleetConfig::default();
    let api = Arc::new(ApiClient::new("http://127.0.0.1:1", "tok", 1));

    let result = crawl::crawl_one(&config, api, &server.url(), &server_addr, false).await;

    assert!(matches!(result, Err(idun_fleet::error::CrawlError::RobotsDisallowed)));
    root_mock.assert_async().await;
    ua_mock.assert_async().await;
}
