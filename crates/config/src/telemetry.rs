use std::{collections::HashMap, net::SocketAddr, time::Duration};

use clap::Parser;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use opentelemetry::KeyValue;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{Resource, logs::SdkLoggerProvider};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Telemetry-related configuration options
#[derive(Debug, Clone, Parser)]
pub struct TelemetryOpts {
    /// Whether to use ANSI colors in the logs. Disable if you're piping logs to a file or using
    /// third party services to collect logs, like kubectl/cloudwatch/loki etc.
    #[clap(long = "telemetry.use-ansi", env = "OPSEQ_TELEMETRY_USE_ANSI", default_value_t = true)]
    pub use_ansi: bool,
    /// The OpenTelemetry HTTP endpoint to export logs to, e.g. `https://api.axiom.co/v1/logs`.
    /// Logs are only written to stdout if not set.
    #[clap(long = "telemetry.otlp-endpoint", env = "OPSEQ_TELEMETRY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<Url>,
    /// Extra headers sent with every log export, as `key=value` pairs.
    #[clap(
        long = "telemetry.otlp-header",
        env = "OPSEQ_TELEMETRY_OTLP_HEADERS",
        value_delimiter = ',',
        value_parser = parse_header
    )]
    pub otlp_headers: Vec<(String, String)>,
    /// The port to listen for Prometheus metrics. Default is `9090`.
    #[clap(long = "metrics.port", env = "OPSEQ_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,
    /// Disable metrics collection. Default is `false`.
    #[clap(long = "metrics.disable", env = "OPSEQ_DISABLE_METRICS", default_value_t = false)]
    pub disable_metrics: bool,
}

/// An error that occurs while setting up telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The Prometheus exporter could not be installed.
    #[error("failed to install Prometheus exporter: {0}")]
    Prometheus(#[from] BuildError),
    /// The OpenTelemetry log exporter could not be built.
    #[error("failed to build OpenTelemetry log exporter: {0}")]
    LogExporter(String),
}

/// A wrapper around the OpenTelemetry logger provider.
#[derive(Debug, Default)]
pub struct LogProvider {
    inner: Option<SdkLoggerProvider>,
}

impl LogProvider {
    /// Set the OpenTelemetry logger provider.
    pub fn set_provider(&mut self, provider: SdkLoggerProvider) {
        self.inner = Some(provider);
    }

    /// Shutdown the OpenTelemetry logger provider.
    pub fn shutdown(&self) {
        if let Some(provider) = self.inner.as_ref() {
            // We ignore the error because it's not critical
            let _ = provider.shutdown();
        }
    }
}

impl TelemetryOpts {
    /// Setup the telemetry stack for the sequencer.
    ///
    /// 1. Tracing to stdout, and to an OpenTelemetry collector if an endpoint is configured
    /// 2. Metrics collection with Prometheus (if enabled)
    pub fn setup(&self, instance_name: &str) -> Result<LogProvider, TelemetryError> {
        let mut global_provider = LogProvider::default();
        // Setup tracing with stdout by default
        let registry = tracing_subscriber::registry()
            .with(EnvFilter::from_env("RUST_LOG"))
            .with(tracing_subscriber::fmt::layer().with_ansi(self.use_ansi));

        if let Some(endpoint) = &self.otlp_endpoint {
            let provider = build_otlp_provider(endpoint, &self.otlp_headers, instance_name)?;
            let layer = OpenTelemetryTracingBridge::new(&provider);
            global_provider.set_provider(provider);
            registry.with(layer).init();
            info!(%endpoint, "OpenTelemetry logging enabled");
        } else {
            registry.init();
        }

        // Setup metrics collection with Prometheus
        if !self.disable_metrics {
            let prometheus_address = SocketAddr::from(([0, 0, 0, 0], self.metrics_port));

            PrometheusBuilder::new()
                .with_http_listener(prometheus_address)
                .add_global_label("instance", instance_name)
                .install()?;

            info!("Metrics enabled on {}", prometheus_address);
        }

        Ok(global_provider)
    }
}

/// Parses a `key=value` header.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("invalid header `{raw}`, expected key=value"))?;
    if key.trim().is_empty() {
        return Err(format!("invalid header `{raw}`, empty key"));
    }
    Ok((key.trim().to_owned(), value.trim().to_owned()))
}

/// Builds the OpenTelemetry log provider exporting to `endpoint` over HTTP.
fn build_otlp_provider(
    endpoint: &Url,
    headers: &[(String, String)],
    name: &str,
) -> Result<SdkLoggerProvider, TelemetryError> {
    let headers: HashMap<String, String> = headers.iter().cloned().collect();

    let exporter = LogExporter::builder()
        .with_http()
        .with_headers(headers)
        .with_endpoint(endpoint.as_str())
        .with_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| TelemetryError::LogExporter(e.to_string()))?;

    let provider = SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                // OTLP convention
                .with_attribute(KeyValue::new("service.name", name.to_owned()))
                .build(),
        )
        .build();

    Ok(provider)
}
