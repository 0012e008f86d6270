//! Tracing and OpenTelemetry initialization.
//!
//! Sets up tracing-subscriber with an env filter and a fmt layer. If an
//! OTLP endpoint is configured, lane metrics are exported there as well;
//! otherwise the global meter stays a no-op.

pub mod lane;
pub mod metrics;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: Option<String>,
    /// The service name reported in telemetry signals.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: "worklane".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Guard that shuts down the OTel meter provider on drop.
///
/// Hold it for the lifetime of the application.
pub struct TelemetryGuard {
    meter_provider: Option<opentelemetry_sdk::metrics::SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Force-flush pending metrics.
    pub fn force_flush(&self) {
        if let Some(ref provider) = self.meter_provider {
            let _ = provider.force_flush();
        }
    }

    pub fn exports_metrics(&self) -> bool {
        self.meter_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take() {
            let _ = provider.shutdown();
        }
    }
}

/// Initialize tracing, plus OTLP metric export when an endpoint is set.
///
/// The OTLP exporter speaks gRPC through tonic, so a configured endpoint
/// requires a Tokio runtime on the calling thread.
///
/// # Errors
///
/// Returns an error if an endpoint is set outside a Tokio runtime, the OTLP
/// exporter fails to build, or the tracing subscriber cannot be installed
/// (e.g. if one was already set).
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::Config(format!("invalid log level {:?}: {e}", config.log_level)))?;

    let meter_provider = match config.endpoint {
        Some(endpoint) => {
            let provider = otlp_meter_provider(&endpoint, config.service_name)?;
            opentelemetry::global::set_meter_provider(provider.clone());
            Some(provider)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { meter_provider })
}

/// Build a meter provider exporting to `endpoint` over OTLP/gRPC.
///
/// Must be called from within a Tokio runtime, which drives the exporter's
/// connection.
pub fn otlp_meter_provider(
    endpoint: &str,
    service_name: String,
) -> Result<opentelemetry_sdk::metrics::SdkMeterProvider> {
    use opentelemetry_otlp::WithExportConfig as _;

    tokio::runtime::Handle::try_current().map_err(|_| {
        Error::Config(format!(
            "OTLP endpoint {endpoint} requires a Tokio runtime on the calling thread"
        ))
    })?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name)
        .build();

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP metric exporter: {e}")))?;

    Ok(opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(resource)
        .build())
}
