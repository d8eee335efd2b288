//! Deduplication and host-probing utilities.
//!
//! Grounded in `original_source/pkg/utils/utils.go`
//! (`DeduplicateSlice`, `HeadCheck`, `HeadCheckDomains`).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use reqwest::StatusCode;

/// Remove duplicates from `items`, keeping first-occurrence order.
/// Pure, deterministic, idempotent: `dedup(dedup(s)) == dedup(s)`.
pub fn dedup<T: Clone + Eq + std::hash::Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item.clone());
        }
    }
    out
}

/// HEAD-probe `domain` with `ua`, return true iff the response is a
/// 200 or any 3xx. Network errors, non-2xx/3xx and timeouts are false.
/// Uses a fresh client with keep-alive disabled per probe, matching the
/// original's `http.Transport{DisableKeepAlives: true}`.
pub async fn head_check(domain: &str, ua: &str, timeout: Duration) -> bool {
    let target = if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("http://{domain}")
    };

    let client = match reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(timeout)
        .user_agent(ua)
        .build()
    {
        Ok(c) => c,
        Err(_) => return false,
    };

    match client.head(&target).send().await {
        Ok(resp) => {
            let status = resp.status();
            status == StatusCode::OK || status.is_redirection()
        }
        Err(_) => false,
    }
}

/// HEAD-check every deduplicated domain concurrently, aggregating
/// results into a `domain -> passed` map.
pub async fn head_check_many(domains: &[String], ua: &str, timeout: Duration) -> HashMap<String, bool> {
    let unique = dedup(domains);
    let futures = unique.into_iter().map(|domain| {
        let ua = ua.to_string();
        async move {
            let ok = head_check(&domain, &ua, timeout).await;
            (domain, ok)
        }
    });
    futures::future::join_all(futures).await.into_iter().collect()
}

/// Lowercase a host string, stripping scheme/port/trailing dot if present.
pub fn normalize_host(input: &str) -> String {
    let without_scheme = input
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(input);
    let host_only = without_scheme.split(['/', '?', '#']).next().unwrap_or(without_scheme);
    let without_port = host_only.rsplit_once(':').map(|(h, _)| h).unwrap_or(host_only);
    without_port.trim_end_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let input = vec!["b", "a", "b", "c", "a"];
        assert_eq!(dedup(&input), vec!["b", "a", "c"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![3, 1, 3, 2, 1];
        let once = dedup(&input);
        let twice = dedup(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn dedup_empty_input() {
        let input: Vec<i32> = vec![];
        assert!(dedup(&input).is_empty());
    }

    #[test]
    fn normalize_host_strips_scheme_port_and_dot() {
        assert_eq!(normalize_host("HTTP://Example.COM:8080/path."), "example.com");
        assert_eq!(normalize_host("example.org."), "example.org");
    }

    #[tokio::test]
    async fn head_check_rejects_unreachable_domain() {
        let ok = head_check(
            "http://127.0.0.1:1",
            "test-agent",
            Duration::from_millis(200),
        )
        .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn head_check_many_dedupes_before_probing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let host = server.host_with_port();
        let domains = vec![host.clone(), host.clone()];

        let results = head_check_many(&domains, "test-agent", Duration::from_secs(5)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results.get(&host), Some(&true));
        mock.assert_async().await;
    }
}
