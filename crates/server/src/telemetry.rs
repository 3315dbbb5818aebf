//! Tracing subscriber setup, with optional OTLP span export.
//!
//! The `fmt` layer is always installed. With `[telemetry] enabled = true`
//! an OpenTelemetry layer is stacked on top, so the `tracing` spans around
//! request handling and upstream calls reach the configured collector.

use opentelemetry::trace::{TraceError, TracerProvider};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Sampler, SdkTracerProvider};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{OtlpProtocol, TelemetryConfig};

/// Keeps the tracer provider alive. Call [`TelemetryGuard::shutdown`] on exit
/// to flush buffered spans.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            warn!(error = %e, "OpenTelemetry tracer provider shutdown failed");
        }
    }
}

/// Install the global subscriber. `RUST_LOG` controls filtering and defaults
/// to `info`.
///
/// An exporter that fails to build downgrades to fmt-only logging instead of
/// aborting startup.
pub fn init(config: &TelemetryConfig) -> TelemetryGuard {
    let (provider, export_error) = match config.enabled.then(|| tracer_provider(config)) {
        Some(Ok(provider)) => (Some(provider), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let otel_layer = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer("darkroom")));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    // Reported only now that a subscriber exists to record it.
    if let Some(e) = export_error {
        error!(
            error = %e,
            endpoint = config.endpoint(),
            protocol = config.protocol.as_str(),
            "failed to build OTLP exporter, span export disabled"
        );
    } else if provider.is_some() {
        info!(
            endpoint = config.endpoint(),
            protocol = config.protocol.as_str(),
            sample_ratio = config.sample_ratio,
            "OpenTelemetry span export enabled"
        );
    }

    TelemetryGuard { provider }
}

/// Build the batch-exporting provider and register it globally.
fn tracer_provider(config: &TelemetryConfig) -> Result<SdkTracerProvider, TraceError> {
    let builder = SpanExporter::builder();
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => builder.with_tonic().with_endpoint(config.endpoint()).build()?,
        OtlpProtocol::Http => builder.with_http().with_endpoint(config.endpoint()).build()?,
    };

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();
    let provider = SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_sampler(sampler(config.sample_ratio))
        .with_resource(resource)
        .build();
    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

fn sampler(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}
