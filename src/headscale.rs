//! Headscale API client implementing [`MeshInventory`].

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::HeadscaleConfig;
use crate::error::SyncError;
use crate::mesh::{decode, parse_address, read_body, MeshDevice, MeshInventory};

const SERVICE: &str = "headscale";

#[derive(Debug, Deserialize)]
struct NodesResponse {
    nodes: Option<Vec<Node>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    given_name: Option<String>,
    ip_addresses: Option<Vec<String>>,
}

/// Headscale nodes API client.
#[derive(Debug, Clone)]
pub struct HeadscaleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HeadscaleClient {
    /// Create a client from configuration.
    pub fn new(http: reqwest::Client, config: &HeadscaleConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl MeshInventory for HeadscaleClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn devices(&self) -> Result<Vec<MeshDevice>, SyncError> {
        let response = self
            .http
            .get(format!("{}/api/v1/node", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let body = read_body(SERVICE, response).await?;
        let parsed: NodesResponse = decode(SERVICE, &body)?;

        let mut devices = Vec::new();
        for node in parsed
            .nodes
            .ok_or_else(|| SyncError::missing_field(SERVICE, "nodes"))?
        {
            let given_name = node
                .given_name
                .ok_or_else(|| SyncError::missing_field(SERVICE, "givenName"))?;
            // Registrations that never set a hostname show up as localhost-*.
            if given_name.to_lowercase().starts_with("localhost") {
                debug!(%given_name, "skipping localhost node");
                continue;
            }
            let addresses = node
                .ip_addresses
                .ok_or_else(|| SyncError::missing_field(SERVICE, "ipAddresses"))?;
            for address in addresses {
                devices.push(MeshDevice::new(given_name.clone(), parse_address(&address)?));
            }
        }

        debug!(devices = devices.len(), "fetched headscale nodes");
        Ok(devices)
    }
}
