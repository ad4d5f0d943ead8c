//! Reconciliation engine: diff desired state against the zone and apply
//! creates and deletes.
//!
//! A cycle runs in two phases. The creation phase adds every desired record
//! that has no exact (name, content) match in the zone. The cleanup phase works
//! on a snapshot fetched *after* the creates and removes records that sit
//! under the managed suffix, hold a mesh address, and are no longer desired.
//!
//! ```text
//! zone record ──▶ desired?  ──yes──▶ current
//!                   │ no
//!                   ▼
//!             managed suffix? ──no──▶ out of scope
//!                   │ yes
//!                   ▼
//!              mesh address?  ──no──▶ skip (non-mesh IP)
//!                   │ yes
//!                   ▼
//!                 delete
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::desired::{DesiredRecord, DesiredSet, RecordKey};
use crate::error::SyncError;
use crate::mesh::{MeshAddressSpace, MeshInventory};
use crate::metrics::{self, MutationKind};
use crate::naming::{is_valid_label, NamingScheme};
use crate::zone::{DnsProvider, NewRecord, ZoneRecord};

/// Creation-phase classification of a desired record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAction {
    /// An identical record already exists.
    UpToDate,
    /// The record is missing and will be created.
    Add,
    /// The source hostname is not a valid DNS label.
    SkipInvalidHostname,
}

/// Cleanup-phase classification of a zone record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// The record is desired.
    Current,
    /// The record name is outside the managed suffix.
    OutOfScope,
    /// Under the managed suffix but not a mesh address; left in place.
    SkipNonMeshAddress,
    /// Managed, mesh-addressed, and no longer desired.
    DeleteStale,
}

/// Classify every desired record against a zone snapshot.
///
/// A record is up to date only if a zone record has the same name
/// (case-insensitive) *and* byte-identical content.
pub fn plan_creation<'a>(
    desired: &'a DesiredSet,
    zone: &[ZoneRecord],
) -> Vec<(&'a DesiredRecord, CreateAction)> {
    let existing: HashSet<RecordKey> = zone
        .iter()
        .map(|r| RecordKey::from_zone(&r.name, &r.content))
        .collect();

    desired
        .sorted()
        .into_iter()
        .map(|record| {
            let action = if existing.contains(&record.key()) {
                CreateAction::UpToDate
            } else if is_valid_label(&record.source_hostname) {
                CreateAction::Add
            } else {
                CreateAction::SkipInvalidHostname
            };
            (record, action)
        })
        .collect()
}

/// Classify one zone record for cleanup. Gates are evaluated in order:
/// desired, managed suffix, mesh address.
pub fn classify_zone_record(
    record: &ZoneRecord,
    desired: &DesiredSet,
    scheme: &NamingScheme,
    address_space: &MeshAddressSpace,
) -> CleanupAction {
    if desired.contains(&record.name, &record.content) {
        CleanupAction::Current
    } else if !scheme.is_managed_name(&record.name) {
        CleanupAction::OutOfScope
    } else if !address_space.contains_str(&record.content) {
        CleanupAction::SkipNonMeshAddress
    } else {
        CleanupAction::DeleteStale
    }
}

/// Classify every record of a zone snapshot for cleanup.
pub fn plan_cleanup<'a>(
    zone: &'a [ZoneRecord],
    desired: &DesiredSet,
    scheme: &NamingScheme,
    address_space: &MeshAddressSpace,
) -> Vec<(&'a ZoneRecord, CleanupAction)> {
    zone.iter()
        .map(|r| (r, classify_zone_record(r, desired, scheme, address_space)))
        .collect()
}

/// Outcome counts of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Desired records already present.
    pub up_to_date: usize,
    /// Records created successfully.
    pub added: usize,
    /// Create calls that failed.
    pub create_failed: usize,
    /// Desired records skipped for an invalid hostname.
    pub skipped_invalid: usize,
    /// Zone records that are desired (cleanup snapshot).
    pub current: usize,
    /// Zone records outside the managed suffix.
    pub out_of_scope: usize,
    /// Managed-suffix records without a mesh address.
    pub skipped_non_mesh: usize,
    /// Stale records deleted successfully.
    pub deleted: usize,
    /// Delete calls that failed.
    pub delete_failed: usize,
}

impl CycleReport {
    /// Whether every mutation issued in the cycle succeeded.
    pub fn is_clean(&self) -> bool {
        self.create_failed == 0 && self.delete_failed == 0
    }
}

/// Runs sync cycles. Holds collaborators and settings only; every cycle
/// starts from fresh provider data.
#[derive(Clone)]
pub struct Reconciler {
    dns: Arc<dyn DnsProvider>,
    mesh: Arc<dyn MeshInventory>,
    scheme: NamingScheme,
    address_space: MeshAddressSpace,
}

impl Reconciler {
    /// Create a reconciler.
    pub fn new(
        dns: Arc<dyn DnsProvider>,
        mesh: Arc<dyn MeshInventory>,
        scheme: NamingScheme,
        address_space: MeshAddressSpace,
    ) -> Self {
        Self {
            dns,
            mesh,
            scheme,
            address_space,
        }
    }

    /// The naming scheme in use.
    pub fn scheme(&self) -> &NamingScheme {
        &self.scheme
    }

    /// Run one full cycle.
    ///
    /// Any fetch failure aborts the cycle with an error; failed creates and
    /// deletes are counted in the report and do not abort it. Nothing done
    /// before an abort is rolled back.
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let mut report = CycleReport::default();

        let zone_id = self.dns.zone_id().await?;
        let zone = self.dns.records(&zone_id).await?;
        let devices = self.mesh.devices().await?;

        info!(
            mode = self.mesh.name(),
            devices = devices.len(),
            zone_records = zone.len(),
            "fetched mesh inventory and zone snapshot"
        );

        let desired = DesiredSet::build(&devices, &self.scheme);
        metrics::record_state_counts(devices.len(), desired.len(), zone.len());
        if desired.is_empty() {
            warn!(
                mode = self.mesh.name(),
                "mesh inventory is empty, every managed mesh record will be deleted"
            );
        }

        self.apply_creation(&zone_id, &desired, &zone, &mut report)
            .await;

        // Re-fetch so records created above are not treated as stale.
        let zone = self.dns.records(&zone_id).await?;
        self.apply_cleanup(&zone_id, &desired, &zone, &mut report)
            .await;

        Ok(report)
    }

    async fn apply_creation(
        &self,
        zone_id: &str,
        desired: &DesiredSet,
        zone: &[ZoneRecord],
        report: &mut CycleReport,
    ) {
        for (record, action) in plan_creation(desired, zone) {
            metrics::record_create_action(action);
            match action {
                CreateAction::UpToDate => {
                    report.up_to_date += 1;
                    info!(fqdn = %record.fqdn, address = %record.address, "UP-TO-DATE");
                }
                CreateAction::SkipInvalidHostname => {
                    report.skipped_invalid += 1;
                    warn!(
                        hostname = %record.source_hostname,
                        fqdn = %record.fqdn,
                        address = %record.address,
                        "SKIPPING INVALID HOSTNAME"
                    );
                }
                CreateAction::Add => {
                    info!(fqdn = %record.fqdn, address = %record.address, "ADDING");
                    let new_record = NewRecord {
                        domain: self.scheme.domain().to_string(),
                        label: record.source_hostname.clone(),
                        subdomain: self.scheme.subdomain().map(str::to_string),
                        record_type: record.record_type(),
                        address: record.address,
                    };
                    match self.dns.create_record(zone_id, &new_record).await {
                        Ok(()) => report.added += 1,
                        Err(e) => {
                            report.create_failed += 1;
                            metrics::record_mutation_failure(MutationKind::Create);
                            error!(fqdn = %record.fqdn, address = %record.address, error = %e, "failed to create record");
                        }
                    }
                }
            }
        }
    }

    async fn apply_cleanup(
        &self,
        zone_id: &str,
        desired: &DesiredSet,
        zone: &[ZoneRecord],
        report: &mut CycleReport,
    ) {
        for (record, action) in plan_cleanup(zone, desired, &self.scheme, &self.address_space) {
            metrics::record_cleanup_action(action);
            match action {
                CleanupAction::Current => report.current += 1,
                CleanupAction::OutOfScope => {
                    report.out_of_scope += 1;
                    debug!(name = %record.name, "outside managed suffix");
                }
                CleanupAction::SkipNonMeshAddress => {
                    report.skipped_non_mesh += 1;
                    info!(name = %record.name, content = %record.content, "SKIP DELETE (non-mesh IP)");
                }
                CleanupAction::DeleteStale => {
                    info!(name = %record.name, content = %record.content, "DELETING STALE");
                    match self.dns.delete_record(zone_id, &record.id).await {
                        Ok(()) => report.deleted += 1,
                        Err(e) => {
                            report.delete_failed += 1;
                            metrics::record_mutation_failure(MutationKind::Delete);
                            error!(name = %record.name, id = %record.id, error = %e, "failed to delete record");
                        }
                    }
                }
            }
        }
    }
}
