//! Logging and OpenTelemetry initialization.
//!
//! Installs a tracing-subscriber registry with an env filter and a fmt
//! layer on stderr. If an OTLP endpoint is configured, traces, metrics and
//! logs are exported there as well.

pub mod metrics;
pub mod watch;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: Option<String>,
    /// The service name reported in telemetry signals.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: "governor-broker".to_string(),
            default_filter: "info".to_string(),
        }
    }
}

/// Guard that shuts down OTel providers on drop.
///
/// Hold it for the lifetime of the process.
#[derive(Default)]
pub struct TelemetryGuard {
    providers: Option<OtelProviders>,
}

struct OtelProviders {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl TelemetryGuard {
    /// Whether OTLP export is active.
    pub fn is_exporting(&self) -> bool {
        self.providers.is_some()
    }

    /// Force-flush all telemetry pipelines.
    pub fn force_flush(&self) {
        if let Some(p) = &self.providers {
            let _ = p.tracer.force_flush();
            let _ = p.meter.force_flush();
            let _ = p.logger.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(p) = self.providers.take() {
            let _ = p.logger.shutdown();
            let _ = p.meter.shutdown();
            let _ = p.tracer.shutdown();
        }
    }
}

/// Initialize logging, plus OTLP export when an endpoint is configured.
///
/// # Errors
///
/// Returns an error if an OTLP exporter fails to build or a global
/// subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard::default());
    };

    let providers = build_providers(&endpoint, config.service_name)?;
    opentelemetry::global::set_meter_provider(providers.meter.clone());

    let tracer = providers.tracer.tracer("governor-broker");
    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_log_layer =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&providers.logger);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(otel_trace_layer)
        .with(otel_log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard {
        providers: Some(providers),
    })
}

fn build_providers(endpoint: &str, service_name: String) -> Result<OtelProviders> {
    use opentelemetry_otlp::WithExportConfig as _;

    let resource = Resource::builder().with_service_name(service_name).build();

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP span exporter: {e}")))?;
    let tracer = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP metric exporter: {e}")))?;
    let meter = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(resource.clone())
        .build();

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("failed to create OTLP log exporter: {e}")))?;
    let logger = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    Ok(OtelProviders {
        tracer,
        meter,
        logger,
    })
}
