use crate::config::{Environment, TelemetryConfig};
use crate::logging;
use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::SERVICE_VERSION;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use std::time::Duration;
use tokio::runtime::Runtime;

const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment.name";

/// Owns the OTLP trace and metric providers, plus the Tokio runtime their
/// gRPC exporters run on. Dropping it flushes and shuts both providers down.
///
/// # Example
/// ```ignore
/// let config = TelemetryConfig::from_env("producer");
/// let _telemetry = TelemetryGuard::init(&config, "http://localhost:4317")?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    // Declared last: providers shut down in `drop` while it is still running.
    _runtime: Runtime,
}

impl TelemetryGuard {
    /// Start OTLP export of spans and metrics to `endpoint` and install the
    /// global subscriber with a span-export layer.
    pub fn init(config: &TelemetryConfig, endpoint: &str) -> anyhow::Result<Self> {
        let runtime = Runtime::new()?;
        let resource = resource(&config.service_name, config.environment);

        // Tonic exporters must be built inside the runtime.
        let (tracer_provider, meter_provider) = runtime.block_on(async {
            anyhow::Ok((
                tracer_provider(resource.clone(), endpoint)?,
                meter_provider(resource, endpoint, config.metrics_interval)?,
            ))
        })?;

        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        logging::install(
            config.environment,
            Some(global::tracer(config.service_name.clone())),
        );

        tracing::info!(
            service = %config.service_name,
            endpoint,
            metrics_interval_ms = config.metrics_interval.as_millis() as u64,
            "Telemetry export enabled"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
            _runtime: runtime,
        })
    }
}

/// Attributes attached to every span and metric a service exports.
fn resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes([
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new(DEPLOYMENT_ENVIRONMENT, environment.as_str()),
        ])
        .build()
}

fn tracer_provider(resource: Resource, endpoint: &str) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(
    resource: Resource,
    endpoint: &str,
    interval: Duration,
) -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shutdown tracer provider: {e:?}");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shutdown meter provider: {e:?}");
        }
    }
}

/// Install logging for a service: OTLP export when an endpoint is
/// configured, stdout only otherwise. Keep the returned guard alive for the
/// lifetime of the process.
pub fn init_observability(config: &TelemetryConfig) -> anyhow::Result<Option<TelemetryGuard>> {
    match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            TelemetryGuard::init(config, endpoint).map(Some)
        }
        None => {
            logging::setup_logging(config.environment);
            Ok(None)
        }
    }
}

/// Creates an info-level span and enters it.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}

/// Creates a debug-level span and enters it.
#[macro_export]
macro_rules! span_debug {
    ($name:literal) => {
        tracing::debug_span!($name).entered()
    };
}
