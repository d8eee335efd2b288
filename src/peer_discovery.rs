//! Peer-discovery ingestion: pulls host names from a Yacy-network peer
//! registry and feeds them into the worker pool's job queue as a
//! fourth, lowest-priority domain source.
//!
//! Grounded in `original_source/yacy.go`, dropped by the distillation
//! but recovered per SPEC_FULL.md §4.11. `quick-xml`'s serde
//! integration replaces Go's `encoding/xml`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PeerList {
    #[serde(rename = "peer", default)]
    peers: Vec<Peer>,
}

#[derive(Debug, Deserialize)]
struct Peer {
    address: String,
}

#[derive(Debug, Deserialize)]
struct HostBrowser {
    hosts: HostList,
}

#[derive(Debug, Deserialize, Default)]
struct HostList {
    #[serde(rename = "host", default)]
    hosts: Vec<Host>,
}

#[derive(Debug, Deserialize)]
struct Host {
    #[serde(rename = "@name")]
    name: String,
}

/// GET `<base>/Network.xml?page=1&maxCount=1000`, parse `<peers><peer>`
/// entries, return each peer as an `http://<address>` base URL.
pub async fn fetch_peers(base_url: &str) -> Result<Vec<String>, reqwest::Error> {
    let url = format!("{base_url}/Network.xml?page=1&maxCount=1000");
    let body = reqwest::get(&url).await?.text().await?;

    let list: PeerList = match quick_xml::de::from_str(&body) {
        Ok(list) => list,
        Err(err) => {
            log::warn!("failed to parse Network.xml from {base_url}: {err}");
            return Ok(Vec::new());
        }
    };

    Ok(list
        .peers
        .into_iter()
        .map(|peer| format!("http://{}", peer.address))
        .collect())
}

/// GET `<peer_url>/HostBrowser.xml?admin=true&hosts=`, parse
/// `<hostbrowser><hosts><host name="...">` entries, return host names.
pub async fn fetch_peer_hosts(peer_url: &str) -> Result<Vec<String>, reqwest::Error> {
    let url = format!("{peer_url}/HostBrowser.xml?admin=true&hosts=");
    let body = reqwest::get(&url).await?.text().await?;

    let browser: HostBrowser = match quick_xml::de::from_str(&body) {
        Ok(browser) => browser,
        Err(err) => {
            log::warn!("failed to parse HostBrowser.xml from {peer_url}: {err}");
            return Ok(Vec::new());
        }
    };

    Ok(browser.hosts.hosts.into_iter().map(|h| h.name).collect())
}

/// Fan out `fetch_peer_hosts` over `peers` with bounded concurrency,
/// forwarding every discovered host into `sink`.
pub async fn ingest_all(peers: Vec<String>, concurrency: usize, sink: tokio::sync::mpsc::Sender<String>) {
    use futures::stream::{self, StreamExt};

    stream::iter(peers)
        .for_each_concurrent(concurrency, |peer| {
            let sink = sink.clone();
            async move {
                match fetch_peer_hosts(&peer).await {
                    Ok(hosts) => {
                        for host in hosts {
                            if sink.send(host).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => log::warn!("peer host fetch failed for {peer}: {err}"),
                }
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_peers_parses_network_xml() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/Network\.xml".to_string()))
            .with_status(200)
            .with_body(
                r#"<?xml version="1.0"?>
                <peers>
                    <peer><address>1.2.3.4:8090</address></peer>
                    <peer><address>5.6.7.8:8090</address></peer>
                </peers>"#,
            )
            .create_async()
            .await;

        let peers = fetch_peers(&server.url()).await.unwrap();
        assert_eq!(
            peers,
            vec!["http://1.2.3.4:8090".to_string(), "http://5.6.7.8:8090".to_string()]
        );
    }

    #[tokio::test]
    async fn fetch_peer_hosts_parses_hostbrowser_xml() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/HostBrowser\.xml".to_string()))
            .with_status(200)
            .with_body(
                r#"<?xml version="1.0"?>
                <hostbrowser>
                    <hosts>
                        <host name="example.com"/>
                        <host name="example.org"/>
                    </hosts>
                </hostbrowser>"#,
            )
            .create_async()
            .await;

        let hosts = fetch_peer_hosts(&server.url()).await.unwrap();
        assert_eq!(hosts, vec!["example.com".to_string(), "example.org".to_string()]);
    }

    #[tokio::test]
    async fn malformed_xml_degrades_to_empty_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/Network\.xml".to_string()))
            .with_status(200)
            .with_body("not xml")
            .create_async()
            .await;

        let peers = fetch_peers(&server.url()).await.unwrap();
        assert!(peers.is_empty());
    }
}
