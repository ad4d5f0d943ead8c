//! Mesh DNS Sync - keeps a Cloudflare zone in step with Tailscale/Headscale membership.
//!
//! Every device in the mesh gets an address record `<host>[.<sub>].<domain>`
//! pointing at its mesh IP, and records for devices that have left the mesh
//! are removed. Records outside the managed suffix, or holding non-mesh
//! addresses, are never touched.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          mesh-dns-sync                           │
//! │                                                                  │
//! │  ┌──────────────────┐    ┌──────────────────┐                    │
//! │  │ MeshInventory    │───▶│   DesiredSet     │                    │
//! │  │ (tailscale |     │    │   (per cycle)    │                    │
//! │  │  headscale)      │    └────────┬─────────┘                    │
//! │  └──────────────────┘             │                              │
//! │                                   ▼                              │
//! │  ┌──────────────────┐    ┌──────────────────┐                    │
//! │  │ DnsProvider      │◀──▶│   Reconciler     │◀── SyncService     │
//! │  │ (cloudflare)     │    │ create / cleanup │    (interval loop) │
//! │  └──────────────────┘    └──────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cycle
//!
//! ```text
//! zone id → zone snapshot → mesh devices → desired set
//!   → create missing records → re-fetch snapshot → delete stale records
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use mesh_dns_sync::{Config, Shutdown, SyncService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load("mesh-dns-sync.toml".as_ref(), "/run/secrets".as_ref()).unwrap();
//!
//!     let (shutdown, worker) = Shutdown::new_signals();
//!     tokio::spawn(worker);
//!
//!     let service = SyncService::from_config(&config).unwrap();
//!     service.run(shutdown).await;
//! }
//! ```

#![warn(missing_docs)]

pub mod cloudflare;
pub mod config;
pub mod desired;
pub mod error;
pub mod headscale;
pub mod mesh;
pub mod metrics;
pub mod naming;
pub mod reconcile;
pub mod service;
pub mod tailscale;
pub mod telemetry;
pub mod zone;

// Re-export main types
pub use config::{Config, MeshMode, TelemetryConfig};
pub use desired::{DesiredRecord, DesiredSet};
pub use error::{ErrorKind, SyncError};
pub use mesh::{MeshAddressSpace, MeshDevice, MeshInventory};
pub use naming::{HostnameTransform, NamingScheme};
pub use reconcile::{CycleReport, Reconciler};
pub use service::{Shutdown, SyncService};
pub use zone::{DnsProvider, NewRecord, RecordType, ZoneRecord};
