//! Service-registry adapter: registers/deregisters this supervisor
//! with a Consul-compatible agent so other fleet tooling can discover
//! it. Registration failure is logged only; it never aborts startup.
//!
//! Grounded in `original_source/pkg/clients/consul/consul.go`
//! (`ConsulRegistration` JSON shape, `/v1/agent/service/register` and
//! `/v1/agent/service/deregister/<ID>` endpoints).

use serde::Serialize;

use crate::error::RegistryError;

#[derive(Debug, Serialize)]
struct ConsulRegistration {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags")]
    tags: Vec<String>,
}

/// `<environment>_<hostname>_idun`, the ID used for both registration
/// and deregistration.
pub fn service_id(environment: &str) -> Result<String, RegistryError> {
    let hostname = hostname::get()
        .map_err(RegistryError::Io)?
        .to_string_lossy()
        .to_string();
    Ok(format!("{environment}_{hostname}_idun"))
}

/// First non-loopback IPv4/IPv6 address found on any local interface.
fn first_non_loopback_address() -> Result<String, RegistryError> {
    let interfaces = if_addrs::get_if_addrs().map_err(RegistryError::Io)?;
    interfaces
        .into_iter()
        .find(|iface| !iface.is_loopback())
        .map(|iface| iface.ip().to_string())
        .ok_or(RegistryError::NoAddress)
}

pub struct RegistryClient {
    registry_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn register(&self, environment: &str, port: u16) -> Result<(), RegistryError> {
        let id = service_id(environment)?;
        let address = first_non_loopback_address()?;

        let registration = ConsulRegistration {
            id,
            name: "idun".to_string(),
            address,
            port,
            tags: vec![environment.to_string()],
        };

        let url = format!("{}/v1/agent/service/register", self.registry_url);
        let resp = self.client.put(&url).json(&registration).send().await?;
        if !resp.status().is_success() {
            return Err(RegistryError::NonOkStatus(resp.status().as_u16()));
        }
        Ok(())
    }

    pub async fn deregister(&self, environment: &str) -> Result<(), RegistryError> {
        let id = service_id(environment)?;
        let url = format!("{}/v1/agent/service/deregister/{id}", self.registry_url);
        let resp = self.client.put(&url).send().await?;
        if !resp.status().is_success() {
            return Err(RegistryError::NonOkStatus(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Register with the registry if configured; log (never panic) on
/// failure, since the fleet must keep running without service
/// discovery.
pub async fn register_if_configured(registry_url: Option<&str>, environment: &str, port: u16) {
    let Some(url) = registry_url else { return };
    let client = RegistryClient::new(url);
    if let Err(err) = client.register(environment, port).await {
        log::warn!("service registration failed: {err}");
    }
}

pub async fn deregister_if_configured(registry_url: Option<&str>, environment: &str) {
    let Some(url) = registry_url else { return };
    let client = RegistryClient::new(url);
    if let Err(err) = client.deregister(environment).await {
        log::warn!("service deregistration failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_has_expected_shape() {
        let id = service_id("test").unwrap();
        assert!(id.starts_with("test_"));
        assert!(id.ends_with("_idun"));
    }

    #[tokio::test]
    async fn register_failure_is_logged_not_fatal() {
        let client = RegistryClient::new("http://127.0.0.1:1");
        let result = client.register("test", 8080).await;
        assert!(result.is_err());
        register_if_configured(Some("http://127.0.0.1:1"), "test", 8080).await;
    }

    #[tokio::test]
    async fn no_registry_configured_is_a_no_op() {
        register_if_configured(None, "test", 8080).await;
        deregister_if_configured(None, "test").await;
    }
}
