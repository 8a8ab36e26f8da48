use anyhow::{Context, Result};
use common::TelemetryConfig;
use frame_ring::ChannelConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub channel: ChannelConfig,
    pub telemetry: TelemetryConfig,
    /// Pause between frames; zero writes as fast as the consumer drains.
    pub frame_interval: Duration,
    /// Stop after this many frames; runs until signalled when unset.
    pub frame_limit: Option<u64>,
    /// Upper bound on a single wait for a free slot, so shutdown is noticed.
    pub write_timeout: Duration,
    pub status_every: u64,
}

impl ProducerConfig {
    pub fn from_env() -> Result<Self> {
        let channel = ChannelConfig::from_env().context("Invalid channel layout")?;

        let frame_interval_ms = env::var("FRAME_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(33);

        let frame_limit = env::var("FRAME_LIMIT").ok().and_then(|s| s.parse().ok());

        let write_timeout_ms = env::var("WRITE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let status_every = env::var("STATUS_EVERY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(100);

        Ok(Self {
            channel,
            telemetry: TelemetryConfig::from_env("producer"),
            frame_interval: Duration::from_millis(frame_interval_ms),
            frame_limit,
            write_timeout: Duration::from_millis(write_timeout_ms),
            status_every,
        })
    }
}
