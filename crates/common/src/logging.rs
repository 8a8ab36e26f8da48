use crate::config::Environment;
use opentelemetry::global::BoxedTracer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter from `RUST_LOG`, or `info` when unset or malformed.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: `RUST_LOG` filter, span export when a
/// tracer is given, then pretty output in development or JSON in production.
pub(crate) fn install(environment: Environment, tracer: Option<BoxedTracer>) {
    let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}

/// Stdout-only logging, for services running without a collector.
pub fn setup_logging(environment: Environment) {
    install(environment, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_filter_defaults_to_info() {
        unsafe { env::remove_var("RUST_LOG") };
        assert_eq!(env_filter().to_string(), "info");
    }

    #[test]
    #[serial]
    fn test_filter_follows_rust_log() {
        unsafe { env::set_var("RUST_LOG", "frame_ring=debug") };
        let filter = env_filter();
        unsafe { env::remove_var("RUST_LOG") };

        assert_eq!(filter.to_string(), "frame_ring=debug");
    }
}
