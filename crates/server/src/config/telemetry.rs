use serde::Deserialize;

/// OTLP transport used to ship spans to the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

impl OtlpProtocol {
    /// Local collector address for this transport.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Grpc => "http://localhost:4317",
            Self::Http => "http://localhost:4318/v1/traces",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::Http => "http",
        }
    }
}

/// Span export. Log lines always go to stdout; this section only adds an
/// OTLP exporter for the request and upstream-call spans.
///
/// ```toml
/// [telemetry]
/// enabled = true
/// protocol = "http"
/// endpoint = "http://tempo:4318/v1/traces"
/// sample_ratio = 0.1
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub protocol: OtlpProtocol,
    /// Collector URL. Unset means the local collector port for `protocol`.
    pub endpoint: Option<String>,
    /// `service.name` resource attribute on exported spans.
    pub service_name: String,
    /// Fraction of traces kept; values outside `0.0..=1.0` are clamped.
    pub sample_ratio: f64,
}

impl TelemetryConfig {
    /// The configured endpoint, or the transport's default.
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .unwrap_or(self.protocol.default_endpoint())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            protocol: OtlpProtocol::default(),
            endpoint: None,
            service_name: "darkroom".to_owned(),
            sample_ratio: 1.0,
        }
    }
}
