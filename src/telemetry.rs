//! Logging, and OpenTelemetry export when `OTEL_*` variables are set.
//!
//! ```ignore
//! let telemetry = Telemetry::new()
//!     .with_name(env!("CARGO_PKG_NAME"))
//!     .with_version(env!("CARGO_PKG_VERSION"))
//!     .register()?;
//! let app = router.layer(telemetry.http_tracing());
//! ```

use axum::http::Request;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
use std::env;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// OTLP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryProtocol {
    Http,
    Grpc,
}

impl TelemetryProtocol {
    /// `None` unless some `OTEL_EXPORTER_OTLP_*` variable is set.
    fn from_env() -> Option<Self> {
        let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
        if !is_enabled {
            return None;
        }
        let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
            Ok("grpc") => TelemetryProtocol::Grpc,
            _ => TelemetryProtocol::Http,
        };
        Some(protocol)
    }
}

/// Builder and shutdown guard for the tracing/metrics providers.
pub struct Telemetry {
    name: String,
    version: String,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tracer_provider: None,
            meter_provider: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Installs the global subscriber. Level filtering follows `RUST_LOG`,
    /// `info` by default.
    pub fn register(mut self) -> Result<Self, TelemetryError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        match TelemetryProtocol::from_env() {
            Some(protocol) => {
                let tracer_provider = self.init_tracer_provider(protocol)?;
                let meter_provider = self.init_meter_provider(protocol)?;
                let tracer = tracer_provider.tracer("tracing-otel-subscriber");
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer())
                    .with(MetricsLayer::new(meter_provider.clone()))
                    .with(OpenTelemetryLayer::new(tracer))
                    .try_init()?;
                tracing::info!(?protocol, "OpenTelemetry tracing and metrics export enabled");
                self.tracer_provider = Some(tracer_provider);
                self.meter_provider = Some(meter_provider);
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer())
                    .try_init()?;
                tracing::info!("OpenTelemetry is not enabled");
            }
        }
        Ok(self)
    }

    /// `TraceLayer` opening one span per HTTP request.
    pub fn http_tracing(&self) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, HttpSpan> {
        TraceLayer::new_for_http().make_span_with(HttpSpan)
    }

    fn resource(&self) -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(self.name.clone())
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, self.version.clone()),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    fn init_tracer_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkTracerProvider, TelemetryError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::Http => exporter.with_http().build()?,
            TelemetryProtocol::Grpc => exporter.with_tonic().build()?,
        };
        Ok(SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                1.0,
            ))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(self.resource())
            .with_batch_exporter(exporter)
            .build())
    }

    fn init_meter_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkMeterProvider, TelemetryError> {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::Http => exporter
                .with_http()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build()?,
            TelemetryProtocol::Grpc => exporter
                .with_tonic()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build()?,
        };
        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(30))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();
        let meter_provider = MeterProviderBuilder::default()
            .with_resource(self.resource())
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(meter_provider.clone());
        Ok(meter_provider)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref()
            && let Err(err) = tracer_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
        if let Some(meter_provider) = self.meter_provider.as_ref()
            && let Err(err) = meter_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
    }
}

/// Names the request span `METHOD /path` for OpenTelemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSpan;

impl<B> MakeSpan<B> for HttpSpan {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        tracing::info_span!(
            "http_request",
            otel.kind = "server",
            otel.name = %format!("{} {}", request.method(), request.uri().path()),
            http.request.method = %request.method(),
            url.path = %request.uri().path(),
        )
    }
}
