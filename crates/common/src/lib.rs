pub mod config;
pub mod logging;
pub mod telemetry;
pub mod wait;

pub use config::{Environment, TelemetryConfig};
pub use logging::setup_logging;
pub use telemetry::{TelemetryGuard, init_observability};
pub use wait::wait_for_resource;
