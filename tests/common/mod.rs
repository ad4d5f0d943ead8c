//! Shared test infrastructure: in-memory DNS provider and mesh inventory.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mesh_dns_sync::naming::compose_fqdn;
use mesh_dns_sync::{
    DnsProvider, HostnameTransform, MeshAddressSpace, MeshDevice, MeshInventory, NamingScheme,
    NewRecord, Reconciler, RecordType, SyncError, ZoneRecord,
};

// --- Constants ---

pub const DOMAIN: &str = "example.com";
pub const ZONE_ID: &str = "zone-123";

// --- FakeDns ---

/// Which provider calls should fail.
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub zone_id: bool,
    /// Fail the n-th (0-based) `records` call.
    pub records_call: Option<usize>,
    /// Fail creates for these FQDNs.
    pub create_fqdns: Vec<String>,
    /// Fail deletes for these record ids.
    pub delete_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeDnsInner {
    records: Vec<ZoneRecord>,
    next_id: usize,
    records_calls: usize,
    creates: Vec<NewRecord>,
    deletes: Vec<String>,
    failures: Failures,
}

/// In-memory zone. Creates build names the same way the Cloudflare client does.
#[derive(Debug, Clone)]
pub struct FakeDns {
    inner: Arc<Mutex<FakeDnsInner>>,
    transform: HostnameTransform,
}

impl FakeDns {
    pub fn new(records: Vec<ZoneRecord>) -> Self {
        Self::with_transform(records, HostnameTransform::default())
    }

    pub fn with_transform(records: Vec<ZoneRecord>, transform: HostnameTransform) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeDnsInner {
                next_id: records.len(),
                records,
                ..Default::default()
            })),
            transform,
        }
    }

    pub fn fail(&self, failures: Failures) {
        self.inner.lock().unwrap().failures = failures;
    }

    pub fn records_snapshot(&self) -> Vec<ZoneRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn creates(&self) -> Vec<NewRecord> {
        self.inner.lock().unwrap().creates.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.inner.lock().unwrap().deletes.clone()
    }

    pub fn records_calls(&self) -> usize {
        self.inner.lock().unwrap().records_calls
    }

    pub fn reset_calls(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.creates.clear();
        inner.deletes.clear();
        inner.records_calls = 0;
    }

    /// (lower-case name, content) pairs currently in the zone, sorted.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .inner
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|r| (r.name.to_lowercase(), r.content.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

fn transport_error() -> SyncError {
    SyncError::Api {
        service: "fake",
        status: 503,
        message: "unavailable".to_string(),
    }
}

#[async_trait]
impl DnsProvider for FakeDns {
    async fn zone_id(&self) -> Result<String, SyncError> {
        if self.inner.lock().unwrap().failures.zone_id {
            return Err(transport_error());
        }
        Ok(ZONE_ID.to_string())
    }

    async fn records(&self, zone_id: &str) -> Result<Vec<ZoneRecord>, SyncError> {
        assert_eq!(zone_id, ZONE_ID);
        let mut inner = self.inner.lock().unwrap();
        let call = inner.records_calls;
        inner.records_calls += 1;
        if inner.failures.records_call == Some(call) {
            return Err(transport_error());
        }
        Ok(inner.records.clone())
    }

    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<(), SyncError> {
        assert_eq!(zone_id, ZONE_ID);
        let name = compose_fqdn(
            &self.transform.apply(&record.label),
            record.subdomain.as_deref(),
            &record.domain,
        );
        let mut inner = self.inner.lock().unwrap();
        inner.creates.push(record.clone());
        if inner.failures.create_fqdns.contains(&name) {
            return Err(transport_error());
        }
        inner.next_id += 1;
        let id = format!("rec-{}", inner.next_id);
        inner.records.push(ZoneRecord {
            id,
            name,
            content: record.address.to_string(),
            record_type: record.record_type,
        });
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError> {
        assert_eq!(zone_id, ZONE_ID);
        let mut inner = self.inner.lock().unwrap();
        inner.deletes.push(record_id.to_string());
        if inner.failures.delete_ids.iter().any(|id| id == record_id) {
            return Err(transport_error());
        }
        inner.records.retain(|r| r.id != record_id);
        Ok(())
    }
}

// --- FakeMesh ---

/// In-memory mesh inventory whose membership can change between cycles.
#[derive(Debug, Clone, Default)]
pub struct FakeMesh {
    devices: Arc<Mutex<Vec<MeshDevice>>>,
    fail: Arc<Mutex<bool>>,
    calls: Arc<Mutex<usize>>,
}

impl FakeMesh {
    pub fn new(devices: Vec<MeshDevice>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
            fail: Arc::new(Mutex::new(false)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn devices_calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn set_devices(&self, devices: Vec<MeshDevice>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl MeshInventory for FakeMesh {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn devices(&self) -> Result<Vec<MeshDevice>, SyncError> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(SyncError::missing_field("fake", "devices"));
        }
        Ok(self.devices.lock().unwrap().clone())
    }
}

// --- Builders ---

pub fn device(hostname: &str, ip: &str) -> MeshDevice {
    MeshDevice::new(hostname, ip.parse::<IpAddr>().unwrap())
}

pub fn record(id: &str, name: &str, content: &str) -> ZoneRecord {
    let record_type = RecordType::for_address(&content.parse::<IpAddr>().unwrap());
    ZoneRecord {
        id: id.to_string(),
        name: name.to_string(),
        content: content.to_string(),
        record_type,
    }
}

pub fn scheme(subdomain: Option<&str>) -> NamingScheme {
    NamingScheme::new(DOMAIN, subdomain, HostnameTransform::default())
}

pub fn reconciler(dns: &FakeDns, mesh: &FakeMesh, scheme: NamingScheme) -> Reconciler {
    Reconciler::new(
        Arc::new(dns.clone()),
        Arc::new(mesh.clone()),
        scheme,
        MeshAddressSpace::default(),
    )
}
