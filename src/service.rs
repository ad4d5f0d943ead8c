//! Service wiring and the fixed-interval sync loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cloudflare::CloudflareClient;
use crate::config::{Config, HttpConfig, MeshMode, DEFAULT_INTERVAL_MINUTES};
use crate::error::{ErrorKind, SyncError};
use crate::headscale::HeadscaleClient;
use crate::mesh::MeshInventory;
use crate::metrics::{self, Timer};
use crate::reconcile::{CycleReport, Reconciler};
use crate::tailscale::TailscaleClient;

/// Cooperative shutdown signal shared by the sync loop and its callers.
///
/// Shutdown is requested by sending on the paired [`ShutdownTrigger`] or by
/// dropping it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending half of a [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Create a manually triggered shutdown pair.
    pub fn pair() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// Create a shutdown signal triggered by Ctrl-C or SIGTERM. The returned
    /// future must be spawned.
    pub fn new_signals() -> (Shutdown, impl Future<Output = ()> + Send + 'static) {
        let (trigger, shutdown) = Self::pair();
        let worker = async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            trigger.trigger();
        };
        (shutdown, worker)
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        let stopped = *self.rx.borrow();
        stopped || self.rx.has_changed().is_err()
    }

    /// Resolve once shutdown is requested.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Build the shared HTTP client.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, SyncError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("mesh-dns-sync/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Select the mesh inventory implementation for the configured mode.
pub fn build_inventory(
    config: &Config,
    http: reqwest::Client,
) -> Result<Arc<dyn MeshInventory>, SyncError> {
    match config.sync.mode {
        MeshMode::Tailscale => {
            let ts = config
                .tailscale
                .as_ref()
                .ok_or_else(|| SyncError::Config("missing [tailscale] section".into()))?;
            Ok(Arc::new(TailscaleClient::new(http, ts)?))
        }
        MeshMode::Headscale => {
            let hs = config
                .headscale
                .as_ref()
                .ok_or_else(|| SyncError::Config("missing [headscale] section".into()))?;
            Ok(Arc::new(HeadscaleClient::new(http, hs)))
        }
    }
}

/// Runs the reconciler on a fixed interval.
pub struct SyncService {
    reconciler: Reconciler,
    interval: Duration,
}

impl SyncService {
    /// Create a service around an existing reconciler.
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Wire Cloudflare and the configured mesh provider from configuration.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let http = build_http_client(&config.http)?;
        let dns = Arc::new(CloudflareClient::new(
            http.clone(),
            &config.cloudflare,
            config.sync.transform(),
        ));
        let mesh = build_inventory(config, http)?;
        let reconciler = Reconciler::new(
            dns,
            mesh,
            config.naming_scheme(),
            config.address_space()?,
        );
        if config.sync.parsed_interval_minutes().is_none() {
            warn!(
                value = ?config.sync.interval_minutes,
                default_minutes = DEFAULT_INTERVAL_MINUTES,
                "invalid sync interval, using default"
            );
        }
        Ok(Self::new(reconciler, config.sync.interval()))
    }

    /// Run one cycle, logging and recording its outcome.
    pub async fn run_once(&self) -> Result<CycleReport, SyncError> {
        let timer = Timer::start();
        info!("starting DNS sync cycle");

        let result = self.reconciler.run_cycle().await;
        let elapsed = timer.elapsed();

        match &result {
            Ok(report) => {
                metrics::record_cycle("success", elapsed);
                info!(
                    up_to_date = report.up_to_date,
                    added = report.added,
                    skipped_invalid = report.skipped_invalid,
                    deleted = report.deleted,
                    skipped_non_mesh = report.skipped_non_mesh,
                    create_failed = report.create_failed,
                    delete_failed = report.delete_failed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "sync cycle complete"
                );
            }
            Err(e) => {
                let kind = e.kind();
                metrics::record_cycle(kind.as_str(), elapsed);
                match kind {
                    ErrorKind::Transport => error!(error = %e, "network error during sync cycle, aborting"),
                    ErrorKind::MissingField => {
                        error!(error = %e, "provider response error during sync cycle, aborting")
                    }
                    ErrorKind::Validation | ErrorKind::Unexpected => {
                        error!(error = ?e, "unexpected error during sync cycle, aborting")
                    }
                }
            }
        }

        result
    }

    /// Run cycles until shutdown. A cycle in progress always completes; cycle
    /// errors are logged and retried on the next interval.
    pub async fn run(self, mut shutdown: Shutdown) {
        info!(
            interval_secs = self.interval.as_secs(),
            domain = %self.reconciler.scheme().domain(),
            "DNS sync service started"
        );

        loop {
            if shutdown.is_shutting_down() {
                break;
            }

            let _ = self.run_once().await;

            info!(
                interval_secs = self.interval.as_secs(),
                "sync cycle finished, sleeping"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => {
                    info!("sync loop received shutdown signal");
                    break;
                }
            }
        }

        info!("DNS sync service stopped");
    }
}
