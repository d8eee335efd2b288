//! Link collector: fetches pages, extracts anchors, and routes each
//! discovered link to either the in-domain frontier or the external
//! host batch.
//!
//! Grounded in `original_source/pkg/crawler/crawler.go`'s `OnHTML`
//! handler (colly) and `koumoutsas-search_engine/src/crawly.rs`'s
//! `scraper`-based anchor extraction, which this module follows in
//! place of colly.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::crawl::flush;
use crate::crawl::watchdog::Done;
use crate::robots::RobotsPolicy;

/// Extensions colly's `DisallowedURLFilters` rejected via regex.
const BANNED_EXTENSIONS: &[&str] = &[
    "asc", "avi", "bmp", "dll", "doc", "docx", "exe", "iso", "jpg", "mp3", "odt", "pdf", "png",
    "rar", "rdf", "svg", "tar", "tar.gz", "tar.bz2", "tgz", "txt", "wav", "wmv", "xml", "xz",
    "zip",
];

/// One `.+\.<ext>$` pattern per banned extension, matching colly's
/// `DisallowedURLFilters` construction.
static BANNED_EXTENSION_FILTERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    BANNED_EXTENSIONS
        .iter()
        .map(|ext| Regex::new(&format!(r"(?i).+\.{}$", regex::escape(ext))).expect("static pattern"))
        .collect()
});

/// Suffixes whose `rel="nofollow"` anchors are followed anyway: these
/// platforms apply nofollow indiscriminately to every outlink.
static IGNORE_NOFOLLOW: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["blogspot.com", "github.io", "tumblr.com", "wordpress.com"]));

fn has_banned_extension(path: &str) -> bool {
    BANNED_EXTENSION_FILTERS.iter().any(|re| re.is_match(path))
}

pub struct CollectorConfig {
    pub allowed_domain: String,
    pub max_domains_in_map: usize,
    pub parallelism: usize,
    pub random_delay_max: Duration,
    pub head_check_timeout: Duration,
    pub crawl_filter_retry: Duration,
}

struct Shared {
    config: CollectorConfig,
    client: reqwest::Client,
    ua: String,
    robots: RobotsPolicy,
    frontier: Mutex<VecDeque<String>>,
    visited: Mutex<HashSet<String>>,
    batch: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
}

/// A single crawl's link collector, bounded by `parallelism` concurrent
/// fetchers and an external-host batch that auto-flushes at capacity.
pub struct Collector {
    shared: Arc<Shared>,
}

impl Collector {
    pub fn new(config: CollectorConfig, client: reqwest::Client, ua: String, robots: RobotsPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                client,
                ua,
                robots,
                frontier: Mutex::new(VecDeque::new()),
                visited: Mutex::new(HashSet::new()),
                batch: Mutex::new(HashSet::new()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn batch_snapshot(&self) -> HashSet<String> {
        self.shared.batch.lock().clone()
    }

    pub fn take_batch(&self) -> HashSet<String> {
        std::mem::take(&mut self.shared.batch.lock())
    }

    /// Visit `start_url`, then drive `parallelism` fetch workers against
    /// the frontier until it drains or `done` fires. Returns once the
    /// crawl has naturally completed or been cancelled.
    pub async fn run(&self, start_url: String, done: Done, api: Arc<crate::api_client::ApiClient>, server_addr: &str) {
        {
            let mut frontier = self.shared.frontier.lock();
            frontier.push_back(start_url);
        }

        let mut workers = Vec::with_capacity(self.shared.config.parallelism);
        for _ in 0..self.shared.config.parallelism {
            let shared = self.shared.clone();
            let done = done.clone();
            let api = api.clone();
            let server_addr = server_addr.to_string();
            workers.push(tokio::spawn(async move {
                fetch_loop(shared, done, api, server_addr).await;
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn fetch_loop(
    shared: Arc<Shared>,
    done: Done,
    api: Arc<crate::api_client::ApiClient>,
    server_addr: String,
) {
    loop {
        if done.is_signaled() {
            return;
        }

        let next = {
            let mut frontier = shared.frontier.lock();
            frontier.pop_front()
        };

        let Some(url) = next else {
            if shared.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        };

        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        visit(&shared, &url, &done, &api, &server_addr).await;
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn visit(
    shared: &Arc<Shared>,
    target: &str,
    done: &Done,
    api: &Arc<crate::api_client::ApiClient>,
    server_addr: &str,
) {
    let body = match shared.client.get(target).header("User-Agent", &shared.ua).send().await {
        Ok(resp) => match resp.text().await {
            Ok(text) => text,
            Err(_) => return,
        },
        Err(_) => return,
    };

    let Ok(base) = Url::parse(target) else { return };
    let Ok(selector) = Selector::parse("a[href]") else { return };

    let links: Vec<(String, bool)> = {
        let document = Html::parse_document(&body);
        document
            .select(&selector)
            .filter_map(|el| {
                let href = el.value().attr("href")?;
                let nofollow = el.value().attr("rel").map(|r| r.eq_ignore_ascii_case("nofollow")).unwrap_or(false);
                let absolute = base.join(href).ok()?.to_string();
                Some((absolute, nofollow))
            })
            .collect()
    };

    for (absolute, nofollow) in links {
        if done.is_signaled() {
            return;
        }
        handle_link(shared, &absolute, nofollow, done, api, server_addr).await;
    }
}

async fn handle_link(
    shared: &Arc<Shared>,
    absolute: &str,
    nofollow: bool,
    done: &Done,
    api: &Arc<crate::api_client::ApiClient>,
    server_addr: &str,
) {
    if !absolute.starts_with("http") {
        return;
    }

    let Ok(parsed) = Url::parse(absolute) else { return };
    let Some(host) = parsed.host_str() else { return };
    let host = host.to_lowercase();

    if nofollow && !IGNORE_NOFOLLOW.iter().any(|suffix| host.ends_with(suffix)) {
        log::info!("Nofollow: {absolute}");
        return;
    }

    if !host.ends_with(&shared.config.allowed_domain) {
        let should_flush = {
            let mut batch = shared.batch.lock();
            if batch.len() < shared.config.max_domains_in_map {
                batch.insert(host);
                false
            } else {
                true
            }
        };

        if should_flush {
            let taken = std::mem::take(&mut *shared.batch.lock());
            flush::flush_batch(
                &taken,
                api,
                server_addr,
                &shared.ua,
                shared.config.head_check_timeout,
                shared.config.crawl_filter_retry,
            )
            .await;
        }
        return;
    }

    if has_banned_extension(parsed.path()) {
        return;
    }

    if !shared.robots.allowed(parsed.path()) {
        log::error!("Crawling of {absolute} is disallowed by robots.txt");
        return;
    }

    {
        let mut visited = shared.visited.lock();
        if !visited.insert(absolute.to_string()) {
            return;
        }
    }

    if done.is_signaled() {
        return;
    }

    let jitter = rand::rng().random_range(0..=shared.config.random_delay_max.as_millis() as u64);
    tokio::time::sleep(Duration::from_millis(1000 + jitter)).await;

    shared.frontier.lock().push_back(absolute.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banned_extensions_are_detected_case_insensitively() {
        assert!(has_banned_extension("/archive.ZIP"));
        assert!(has_banned_extension("/doc.pdf"));
        assert!(!has_banned_extension("/page.html"));
    }

    #[test]
    fn nofollow_ignored_hosts_include_known_platforms() {
        assert!(IGNORE_NOFOLLOW.iter().any(|s| "foo.blogspot.com".ends_with(s)));
        assert!(IGNORE_NOFOLLOW.iter().any(|s| "user.github.io".ends_with(s)));
        assert!(!IGNORE_NOFOLLOW.iter().any(|s| "example.com".ends_with(s)));
    }
}
