mod config;
mod service;
mod stats;

use config::ConsumerConfig;
use service::ConsumerService;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> anyhow::Result<()> {
    let config = ConsumerConfig::from_env()?;
    let _telemetry = common::init_observability(&config.telemetry)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    tracing::info!(config = ?config, "Consumer starting");

    let mut service = ConsumerService::new(config);
    match service.run(&shutdown) {
        Ok(()) => {
            tracing::info!(frames = service.stats().frames, "Consumer stopped gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Consumer failed");
            Err(e)
        }
    }
}
