//! Metrics instrumentation for mesh-dns-sync.
//!
//! All metrics are prefixed with `mesh_dns_sync.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::reconcile::{CleanupAction, CreateAction};

/// Record the end of a sync cycle. `result` is `success` or an error kind label.
pub fn record_cycle(result: &'static str, duration: std::time::Duration) {
    counter!("mesh_dns_sync.cycle.count", "result" => result).increment(1);
    histogram!("mesh_dns_sync.cycle.duration.seconds").record(duration.as_secs_f64());
}

/// Record the classification of a desired record in the creation phase.
pub fn record_create_action(action: CreateAction) {
    let action_str = match action {
        CreateAction::UpToDate => "up_to_date",
        CreateAction::Add => "add",
        CreateAction::SkipInvalidHostname => "skip_invalid_hostname",
    };

    counter!("mesh_dns_sync.create.action.count", "action" => action_str).increment(1);
}

/// Record the classification of a zone record in the cleanup phase.
pub fn record_cleanup_action(action: CleanupAction) {
    let action_str = match action {
        CleanupAction::Current => "current",
        CleanupAction::OutOfScope => "out_of_scope",
        CleanupAction::SkipNonMeshAddress => "skip_non_mesh_ip",
        CleanupAction::DeleteStale => "delete_stale",
    };

    counter!("mesh_dns_sync.cleanup.action.count", "action" => action_str).increment(1);
}

/// Record a failed mutation call.
pub fn record_mutation_failure(operation: MutationKind) {
    let op_str = match operation {
        MutationKind::Create => "create",
        MutationKind::Delete => "delete",
    };

    counter!("mesh_dns_sync.mutation.failure.count", "operation" => op_str).increment(1);
}

/// Mutation call kinds.
#[derive(Debug, Clone, Copy)]
pub enum MutationKind {
    /// Record create.
    Create,
    /// Record delete.
    Delete,
}

/// Record sizes of the inputs of a cycle.
pub fn record_state_counts(devices: usize, desired: usize, zone_records: usize) {
    gauge!("mesh_dns_sync.state.devices.count").set(devices as f64);
    gauge!("mesh_dns_sync.state.desired.count").set(desired as f64);
    gauge!("mesh_dns_sync.state.zone_records.count").set(zone_records as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
