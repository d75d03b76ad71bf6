//! Logging and trace export setup

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

const SERVICE_NAME: &str = "clairity";

/// Keeps the tracer provider alive; spans are flushed when dropped
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shut down tracer provider: {e}");
            }
        }
    }
}

/// Filter from `directives` when given and valid, else the configured level
fn build_filter(config: &LoggingConfig, directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                config.level,
                config.level
            ))
        })
}

fn tracer_provider(endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("Failed to create OTLP exporter for {endpoint}"))?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(SERVICE_NAME)
                .build(),
        )
        .build())
}

/// Install the global tracing subscriber
pub fn init(config: &LoggingConfig) -> Result<TelemetryGuard> {
    let provider = config
        .otlp_endpoint
        .as_deref()
        .map(tracer_provider)
        .transpose()?;

    let otel_layer = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));

    let json = config.format == "json";
    let json_layer = json.then(|| fmt::layer().json());
    let pretty_layer = (!json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(build_filter(config, std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .with(json_layer)
        .with(pretty_layer)
        .with(otel_layer)
        .try_init()
        .with_context(|| "Failed to install tracing subscriber")?;

    Ok(TelemetryGuard { provider })
}
