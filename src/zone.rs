//! DNS zone records and the provider trait used to read and mutate them.

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

use crate::error::SyncError;

/// Address record types managed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
}

impl RecordType {
    /// Record type matching the address family.
    pub fn for_address(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    /// Wire name ("A" / "AAAA").
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Parse a provider type string. Other record types yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::Aaaa),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An existing address record as reported by the DNS provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Provider record id, used for deletes.
    pub id: String,
    /// Record name (compare case-insensitively).
    pub name: String,
    /// Record content, compared verbatim.
    pub content: String,
    /// Record type.
    pub record_type: RecordType,
}

/// Parameters of a record create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Managed domain.
    pub domain: String,
    /// Untransformed, lower-cased hostname label.
    pub label: String,
    /// Optional subdomain label.
    pub subdomain: Option<String>,
    /// A or AAAA, from the address family.
    pub record_type: RecordType,
    /// Address the record points at.
    pub address: IpAddr,
}

/// A DNS provider holding the managed zone.
///
/// Implementations own their credentials and the managed domain; every call is
/// an independent request that either succeeds or fails as a whole.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up the zone identifier for the managed domain.
    async fn zone_id(&self) -> Result<String, SyncError>;

    /// List the A/AAAA records of the zone.
    async fn records(&self, zone_id: &str) -> Result<Vec<ZoneRecord>, SyncError>;

    /// Create one address record.
    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<(), SyncError>;

    /// Delete one record by id.
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError>;
}
