//! Telemetry setup for mesh-dns-sync.
//!
//! Supports:
//! - Tracing with configurable log levels (`RUST_LOG` wins over config)
//! - Prometheus metrics endpoint (with `prometheus` feature)
//! - OpenTelemetry tracing export (with `otel` feature)

#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
#[cfg(any(feature = "prometheus", feature = "otel"))]
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[cfg(feature = "otel")]
use std::sync::OnceLock;
#[cfg(feature = "otel")]
static TRACER_PROVIDER: OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> = OnceLock::new();

type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Initialize telemetry (tracing, metrics, optional OTLP).
pub fn init(config: &TelemetryConfig) -> Result<(), InitError> {
    init_tracing(config)?;

    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        start_prometheus_exporter(addr)?;
    }

    #[cfg(not(feature = "prometheus"))]
    if config.prometheus_addr.is_some() {
        tracing::warn!("prometheus_addr is set but the `prometheus` feature is not enabled");
    }

    Ok(())
}

fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

#[cfg(feature = "otel")]
fn init_tracing(config: &TelemetryConfig) -> Result<(), InitError> {
    let Some(otel_config) = config.opentelemetry.as_ref() else {
        return init_fmt_only(config);
    };

    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk as otlp_sdk;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel_config.endpoint)
        .build()?;

    let resource = otlp_sdk::Resource::builder()
        .with_attributes([
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                otel_config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ])
        .build();

    let provider = otlp_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = provider.tracer("mesh-dns-sync");
    let _ = TRACER_PROVIDER.set(provider);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
    Ok(())
}

#[cfg(not(feature = "otel"))]
fn init_tracing(config: &TelemetryConfig) -> Result<(), InitError> {
    init_fmt_only(config)?;
    if config.opentelemetry.is_some() {
        tracing::warn!("opentelemetry is configured but the `otel` feature is not enabled");
    }
    Ok(())
}

fn init_fmt_only(config: &TelemetryConfig) -> Result<(), InitError> {
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

/// Start Prometheus metrics HTTP exporter.
#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(addr: SocketAddr) -> Result<(), InitError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!(%addr, "Prometheus metrics exporter started");

    Ok(())
}

/// Shutdown telemetry (flush OTLP spans).
pub fn shutdown() {
    #[cfg(feature = "otel")]
    {
        if let Some(provider) = TRACER_PROVIDER.get() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Error shutting down tracer provider: {}", e);
            }
        }
    }
}
