//! Desired DNS state derived from mesh membership.
//!
//! Every device address maps to `<prefix><label><postfix>[.<subdomain>].<domain>`,
//! where `<label>` is the lower-cased first label of the device hostname.

use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

use crate::mesh::MeshDevice;
use crate::naming::{first_label, NamingScheme};
use crate::zone::RecordType;

/// Identity of a desired record: lower-case FQDN plus address text.
///
/// The address is kept in the textual form that zone record content is
/// compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Lower-case FQDN.
    pub fqdn: String,
    /// Address as text.
    pub content: String,
}

impl RecordKey {
    /// Key for a zone record name/content pair. The name is lower-cased.
    pub fn from_zone(name: &str, content: &str) -> Self {
        Self {
            fqdn: name.to_lowercase(),
            content: content.to_string(),
        }
    }
}

/// A record this system considers authoritative for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    /// Lower-case FQDN.
    pub fqdn: String,
    /// Mesh address the record should point at.
    pub address: IpAddr,
    /// Untransformed first hostname label, used for validity checks and creates.
    pub source_hostname: String,
}

impl DesiredRecord {
    /// Composite key of this record.
    ///
    /// The content is the canonical text of `address` (lower-case hex,
    /// compressed IPv6). Inventory addresses are parsed before they get here,
    /// so the provider's original spelling is not kept; zone content is still
    /// compared byte for byte against this form.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            fqdn: self.fqdn.clone(),
            content: self.address.to_string(),
        }
    }

    /// A or AAAA.
    pub fn record_type(&self) -> RecordType {
        RecordType::for_address(&self.address)
    }
}

/// All desired records of one cycle, keyed by (fqdn, address).
#[derive(Debug, Clone, Default)]
pub struct DesiredSet {
    records: HashMap<RecordKey, DesiredRecord>,
}

impl DesiredSet {
    /// Build the desired set from the mesh inventory.
    ///
    /// Colliding keys are last-write-wins.
    pub fn build(devices: &[MeshDevice], scheme: &NamingScheme) -> Self {
        let mut records = HashMap::with_capacity(devices.len());

        for device in devices {
            let label = first_label(&device.hostname);
            let record = DesiredRecord {
                fqdn: scheme.fqdn(&label),
                address: device.address,
                source_hostname: label,
            };
            if let Some(previous) = records.insert(record.key(), record) {
                debug!(fqdn = %previous.fqdn, address = %previous.address, "duplicate desired record replaced");
            }
        }

        debug!(records = records.len(), "built desired set");
        Self { records }
    }

    /// Whether a zone record name/content pair is desired.
    pub fn contains(&self, name: &str, content: &str) -> bool {
        self.records.contains_key(&RecordKey::from_zone(name, content))
    }

    /// Number of desired records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &DesiredRecord> {
        self.records.values()
    }

    /// Records sorted by (fqdn, address) for stable logging and planning.
    pub fn sorted(&self) -> Vec<&DesiredRecord> {
        let mut records: Vec<&DesiredRecord> = self.records.values().collect();
        records.sort_by(|a, b| (&a.fqdn, a.address).cmp(&(&b.fqdn, b.address)));
        records
    }
}
