use std::env;

use opentelemetry::trace::{TraceError, TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// OTLP collector endpoint, tracing export is off when unset.
pub const OTLP_URL_ENVVAR: &str = "RELAYER_OTLP_URL";

/// Label appended to the service name, to tell instances apart in a collector.
pub const SVC_LABEL_ENVVAR: &str = "RELAYER_SVC_LABEL";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    whoami: String,
    otlp_url: Option<String>,
}

impl LoggerConfig {
    /// Reads the service label and OTLP endpoint from the environment.
    pub fn from_env(base: &str) -> Self {
        Self {
            whoami: whoami(base, env::var(SVC_LABEL_ENVVAR).ok().as_deref()),
            otlp_url: env::var(OTLP_URL_ENVVAR).ok().filter(|url| !url.is_empty()),
        }
    }

    pub fn whoami(&self) -> &str {
        &self.whoami
    }

    pub fn otlp_url(&self) -> Option<&str> {
        self.otlp_url.as_deref()
    }
}

/// Installs the global subscriber: compact stdout output filtered by `RUST_LOG`, plus an
/// OpenTelemetry layer when an OTLP url is configured.
///
/// The OTLP exporter spawns onto the current tokio runtime, so the caller must be inside one.
pub fn init(config: &LoggerConfig) -> Result<(), TraceError> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(EnvFilter::from_default_env());

    match &config.otlp_url {
        Some(url) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(url);
            let provider = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            let otel_layer =
                tracing_opentelemetry::layer().with_tracer(provider.tracer("relayer-log"));

            tracing_subscriber::registry()
                .with(stdout_layer)
                .with(otel_layer)
                .init();
        }
        None => tracing_subscriber::registry().with(stdout_layer).init(),
    }

    info!(whoami = %config.whoami, otlp = ?config.otlp_url, "logging started");
    Ok(())
}

/// Flushes pending spans to the collector, if any.
pub fn finalize() {
    info!("shutting down logging");
    opentelemetry::global::shutdown_tracer_provider();
}

fn whoami(base: &str, label: Option<&str>) -> String {
    match label {
        Some(label) if !label.is_empty() => format!("{base}%{label}"),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whoami_label() {
        assert_eq!(whoami("relayer-client", None), "relayer-client");
        assert_eq!(whoami("relayer-client", Some("")), "relayer-client");
        assert_eq!(whoami("relayer-client", Some("xrpl-1")), "relayer-client%xrpl-1");
    }
}
