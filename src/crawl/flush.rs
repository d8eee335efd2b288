//! External-host batch flush: DNS/CIDR/ban-list filtering, coordinator
//! filter round-trip, HEAD-check, and local upload.
//!
//! Grounded in `original_source/pkg/crawler/crawler.go`'s
//! `FilterAndSubmit` (the authoritative fork per SPEC_FULL.md §4).

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::api_client::ApiClient;
use crate::dedup::head_check_many;

/// Specific hosts known to be ISP redirect pages for blocked content.
pub static BANNED_LOCAL_REDIRECTS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["www.president.gov.ua"]));

struct Cidr {
    network: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(net) & mask) == (u32::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

static BANNED_CIDRS: Lazy<Vec<Cidr>> = Lazy::new(|| {
    vec![
        Cidr { network: "10.0.0.0".parse().unwrap(), prefix_len: 8 },
        Cidr { network: "127.0.0.0".parse().unwrap(), prefix_len: 8 },
        Cidr { network: "172.16.0.0".parse().unwrap(), prefix_len: 12 },
        Cidr { network: "192.168.0.0".parse().unwrap(), prefix_len: 16 },
    ]
});

fn is_banned_ip(addr: &IpAddr) -> bool {
    BANNED_CIDRS.iter().any(|cidr| cidr.contains(addr))
}

/// Resolve `host`, dropping it if it has no A/AAAA records, sits on the
/// local-redirect ban list, or resolves into an RFC1918/loopback block.
async fn passes_dns_and_ban_checks(host: &str) -> bool {
    if BANNED_LOCAL_REDIRECTS.contains(host) {
        return false;
    }

    let lookup = format!("{host}:80");
    let addrs = match tokio::net::lookup_host(&lookup).await {
        Ok(iter) => iter.map(|sa| sa.ip()).collect::<Vec<_>>(),
        Err(_) => return false,
    };

    if addrs.is_empty() {
        return false;
    }

    !addrs.iter().any(is_banned_ip)
}

/// Run the full flush pipeline over `batch`. POSTs survivors to the
/// local `/upload` endpoint at `server_addr`. Errors talking to the
/// coordinator are logged and the flush aborts (the caller's next
/// batch will retry).
pub async fn flush_batch(
    batch: &HashSet<String>,
    api: &ApiClient,
    server_addr: &str,
    ua: &str,
    head_check_timeout: Duration,
    filter_retry_delay: Duration,
) {
    if batch.is_empty() {
        return;
    }

    let mut survivors = Vec::with_capacity(batch.len());
    for host in batch {
        if passes_dns_and_ban_checks(host).await {
            survivors.push(host.clone());
        }
    }

    if survivors.is_empty() {
        return;
    }

    let outgoing = match api.filter_domains(&survivors).await {
        Ok(domains) => domains,
        Err(err) => {
            log::error!("Filter failed with {err}");
            tokio::time::sleep(filter_retry_delay).await;
            return;
        }
    };

    if outgoing.is_empty() {
        return;
    }

    let checked = head_check_many(&outgoing, ua, head_check_timeout).await;
    let to_submit: Vec<String> = checked
        .into_iter()
        .filter_map(|(domain, ok)| ok.then_some(domain))
        .collect();

    if to_submit.is_empty() {
        return;
    }

    submit_to_supervisor(&to_submit, server_addr).await;
}

async fn submit_to_supervisor(domains: &[String], server_addr: &str) {
    log::info!("Submit called: {domains:?}");
    let url = format!("http://{server_addr}/upload");
    let client = reqwest::Client::new();
    let body = serde_json::json!({ "domains": domains });

    match client.post(&url).json(&body).send().await {
        Ok(resp) if !resp.status().is_success() => {
            let text = resp.text().await.unwrap_or_default();
            log::error!("upload rejected: {text}");
        }
        Ok(_) => {}
        Err(err) => log::error!("upload failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banned_cidr_matches_rfc1918_ranges() {
        assert!(is_banned_ip(&"10.1.2.3".parse().unwrap()));
        assert!(is_banned_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_banned_ip(&"172.16.5.5".parse().unwrap()));
        assert!(is_banned_ip(&"192.168.0.1".parse().unwrap()));
        assert!(!is_banned_ip(&"8.8.8.8".parse().unwrap()));
    }

    #[tokio::test]
    async fn unresolvable_host_fails_dns_check() {
        assert!(!passes_dns_and_ban_checks("this-host-should-not-resolve.invalid").await);
    }

    #[tokio::test]
    async fn banned_local_redirect_is_rejected_without_dns() {
        assert!(!passes_dns_and_ban_checks("www.president.gov.ua").await);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let api = ApiClient::new("http://127.0.0.1:1", "tok", 1);
        let batch = HashSet::new();
        flush_batch(
            &batch,
            &api,
            "127.0.0.1:1",
            "test-agent",
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .await;
    }
}
