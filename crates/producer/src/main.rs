mod config;
mod pattern;
mod service;

use anyhow::Context;
use config::ProducerConfig;
use frame_ring::FrameProducer;
use service::ProducerService;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> anyhow::Result<()> {
    let config = ProducerConfig::from_env()?;
    let _telemetry = common::init_observability(&config.telemetry)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    tracing::info!(config = ?config, "Producer starting");

    let producer = FrameProducer::from_config(&config.channel).with_context(|| {
        format!(
            "Failed to create frame ring at {}",
            config.channel.names.region.display()
        )
    })?;

    let mut service = ProducerService::new(config, producer);
    let written = service.run(&shutdown)?;

    tracing::info!(written, "Producer stopped gracefully");
    Ok(())
}
