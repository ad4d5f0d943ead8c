//! Tailscale API client implementing [`MeshInventory`].

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::TailscaleConfig;
use crate::error::SyncError;
use crate::mesh::{decode, parse_address, read_body, MeshDevice, MeshInventory};

const SERVICE: &str = "tailscale";

/// How the client authenticates against the Tailscale API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailscaleAuth {
    /// Static API access token, sent as a bearer token.
    ApiKey(String),
    /// OAuth client credentials, exchanged for a short-lived token each cycle.
    OAuth {
        /// OAuth client id.
        client_id: String,
        /// OAuth client secret.
        client_secret: String,
    },
}

impl TailscaleAuth {
    /// Pick credentials from configuration; the API key wins when both are set.
    pub fn from_config(config: &TailscaleConfig) -> Result<Self, SyncError> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

        if let Some(key) = present(&config.api_key) {
            return Ok(TailscaleAuth::ApiKey(key));
        }
        match (present(&config.client_id), present(&config.client_secret)) {
            (Some(client_id), Some(client_secret)) => Ok(TailscaleAuth::OAuth {
                client_id,
                client_secret,
            }),
            _ => Err(SyncError::Config(
                "tailscale requires api_key or client_id/client_secret".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    devices: Option<Vec<Device>>,
}

#[derive(Debug, Deserialize)]
struct Device {
    /// MagicDNS name, e.g. "laptop.tail1234.ts.net".
    name: Option<String>,
    /// OS hostname.
    hostname: Option<String>,
    addresses: Option<Vec<String>>,
}

/// Tailscale devices API client.
#[derive(Debug, Clone)]
pub struct TailscaleClient {
    http: reqwest::Client,
    api_url: String,
    tailnet: String,
    auth: TailscaleAuth,
}

impl TailscaleClient {
    /// Create a client from configuration.
    pub fn new(http: reqwest::Client, config: &TailscaleConfig) -> Result<Self, SyncError> {
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            tailnet: config.tailnet.clone(),
            auth: TailscaleAuth::from_config(config)?,
        })
    }

    /// Bearer token for this cycle.
    async fn access_token(&self) -> Result<String, SyncError> {
        match &self.auth {
            TailscaleAuth::ApiKey(key) => Ok(key.clone()),
            TailscaleAuth::OAuth {
                client_id,
                client_secret,
            } => {
                let response = self
                    .http
                    .post(format!("{}/api/v2/oauth/token", self.api_url))
                    .form(&[
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                    ])
                    .send()
                    .await?;
                let body = read_body(SERVICE, response).await?;
                let token: TokenResponse = decode(SERVICE, &body)?;
                debug!("obtained tailscale oauth token");
                token
                    .access_token
                    .ok_or_else(|| SyncError::missing_field(SERVICE, "access_token"))
            }
        }
    }
}

#[async_trait]
impl MeshInventory for TailscaleClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn devices(&self) -> Result<Vec<MeshDevice>, SyncError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!(
                "{}/api/v2/tailnet/{}/devices",
                self.api_url, self.tailnet
            ))
            .bearer_auth(token)
            .send()
            .await?;
        let body = read_body(SERVICE, response).await?;
        let parsed: DevicesResponse = decode(SERVICE, &body)?;

        let mut devices = Vec::new();
        for device in parsed
            .devices
            .ok_or_else(|| SyncError::missing_field(SERVICE, "devices"))?
        {
            let hostname = device
                .name
                .or(device.hostname)
                .ok_or_else(|| SyncError::missing_field(SERVICE, "name"))?;
            let addresses = device
                .addresses
                .ok_or_else(|| SyncError::missing_field(SERVICE, "addresses"))?;
            for address in addresses {
                devices.push(MeshDevice::new(hostname.clone(), parse_address(&address)?));
            }
        }

        debug!(devices = devices.len(), "fetched tailscale devices");
        Ok(devices)
    }
}
