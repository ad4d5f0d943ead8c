//! Cloudflare v4 API client implementing [`DnsProvider`].

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, trace};

use crate::config::CloudflareConfig;
use crate::error::SyncError;
use crate::naming::{compose_fqdn, HostnameTransform};
use crate::zone::{DnsProvider, NewRecord, RecordType, ZoneRecord};

const SERVICE: &str = "cloudflare";

/// Records requested per page when listing a zone.
const PAGE_SIZE: u32 = 100;

/// Standard Cloudflare response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordEntry {
    id: Option<String>,
    name: Option<String>,
    content: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl RecordEntry {
    /// Convert to a [`ZoneRecord`]; `Ok(None)` for non-address records.
    fn into_zone_record(self) -> Result<Option<ZoneRecord>, SyncError> {
        let kind = self
            .kind
            .ok_or_else(|| SyncError::missing_field(SERVICE, "type"))?;
        let Some(record_type) = RecordType::parse(&kind) else {
            return Ok(None);
        };
        Ok(Some(ZoneRecord {
            id: self.id.ok_or_else(|| SyncError::missing_field(SERVICE, "id"))?,
            name: self
                .name
                .ok_or_else(|| SyncError::missing_field(SERVICE, "name"))?,
            content: self
                .content
                .ok_or_else(|| SyncError::missing_field(SERVICE, "content"))?,
            record_type,
        }))
    }
}

/// Cloudflare DNS client bound to one domain.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    domain: String,
    transform: HostnameTransform,
    ttl: u32,
    proxied: bool,
}

impl CloudflareClient {
    /// Create a client from configuration. `transform` must be the same one the
    /// desired-state builder uses, so created names match desired FQDNs.
    pub fn new(
        http: reqwest::Client,
        config: &CloudflareConfig,
        transform: HostnameTransform,
    ) -> Self {
        Self {
            http,
            api_url: config.api_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            domain: config.domain.to_lowercase(),
            transform,
            ttl: config.ttl,
            proxied: config.proxied,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Send a request and unwrap the envelope, turning HTTP and API-level
    /// failures into [`SyncError::Api`].
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, SyncError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        let body = response.text().await?;
        trace!(%status, body_len = body.len(), "cloudflare response");

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) if status.is_success() && envelope.success => Ok(envelope),
            Ok(envelope) => Err(api_error(status, &envelope.errors)),
            Err(_) if !status.is_success() => Err(SyncError::Api {
                service: SERVICE,
                status: status.as_u16(),
                message: body,
            }),
            Err(source) => Err(SyncError::Decode {
                service: SERVICE,
                source,
            }),
        }
    }
}

fn api_error(status: StatusCode, errors: &[ApiMessage]) -> SyncError {
    let message = errors
        .first()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    SyncError::Api {
        service: SERVICE,
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    async fn zone_id(&self) -> Result<String, SyncError> {
        let request = self
            .http
            .get(self.url("/zones"))
            .query(&[("name", self.domain.as_str())]);
        let envelope: Envelope<Vec<ZoneEntry>> = self.send(request).await?;

        let zones = envelope
            .result
            .ok_or_else(|| SyncError::missing_field(SERVICE, "result"))?;
        let zone = zones
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::ZoneNotFound(self.domain.clone()))?;
        let id = zone
            .id
            .ok_or_else(|| SyncError::missing_field(SERVICE, "id"))?;

        debug!(domain = %self.domain, zone_id = %id, "resolved zone id");
        Ok(id)
    }

    async fn records(&self, zone_id: &str) -> Result<Vec<ZoneRecord>, SyncError> {
        let url = self.url(&format!("/zones/{zone_id}/dns_records"));
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self.http.get(&url).query(&[
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ]);
            let envelope: Envelope<Vec<RecordEntry>> = self.send(request).await?;
            let entries = envelope
                .result
                .ok_or_else(|| SyncError::missing_field(SERVICE, "result"))?;

            for entry in entries {
                if let Some(record) = entry.into_zone_record()? {
                    records.push(record);
                }
            }

            let total_pages = envelope
                .result_info
                .and_then(|info| info.total_pages)
                .unwrap_or(1);
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!(zone_id, records = records.len(), "listed zone records");
        Ok(records)
    }

    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<(), SyncError> {
        let name = compose_fqdn(
            &self.transform.apply(&record.label),
            record.subdomain.as_deref().filter(|s| !s.is_empty()),
            &record.domain,
        );
        let body = json!({
            "type": record.record_type.as_str(),
            "name": name,
            "content": record.address.to_string(),
            "ttl": self.ttl,
            "proxied": self.proxied,
        });

        let request = self
            .http
            .post(self.url(&format!("/zones/{zone_id}/dns_records")))
            .json(&body);
        let _: Envelope<serde_json::Value> = self.send(request).await?;

        debug!(%name, address = %record.address, "created record");
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError> {
        let request = self
            .http
            .delete(self.url(&format!("/zones/{zone_id}/dns_records/{record_id}")));
        let _: Envelope<serde_json::Value> = self.send(request).await?;

        debug!(record_id, "deleted record");
        Ok(())
    }
}
