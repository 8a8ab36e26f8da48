use std::env;
use std::time::Duration;

const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .map(|value| Self::parse(&value))
            .unwrap_or(Environment::Development)
    }
}

/// Where a service sends its logs and traces.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP collector; logs go to stdout only when unset.
    pub otlp_endpoint: Option<String>,
    pub environment: Environment,
    /// How often metrics are pushed to the collector.
    pub metrics_interval: Duration,
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str) -> Self {
        let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty());

        Self {
            service_name: service_name.to_string(),
            otlp_endpoint,
            environment: Environment::from_env(),
            metrics_interval: metrics_interval_from_env(),
        }
    }
}

/// `OTEL_METRIC_EXPORT_INTERVAL` in milliseconds; unset, zero or unparsable
/// values fall back to ten seconds.
fn metrics_interval_from_env() -> Duration {
    env::var("OTEL_METRIC_EXPORT_INTERVAL")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_METRICS_INTERVAL)
}
