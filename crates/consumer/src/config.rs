use anyhow::{Context, Result};
use common::TelemetryConfig;
use frame_ring::ChannelConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub channel: ChannelConfig,
    pub telemetry: TelemetryConfig,
    /// How often to retry attaching, and the longest single wait for a frame.
    pub poll_interval: Duration,
    /// Log a status line every this many frames.
    pub status_every: u64,
    /// Stop after this many frames; runs until signalled when unset.
    pub frame_limit: Option<u64>,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self> {
        let channel = ChannelConfig::from_env().context("Invalid channel layout")?;

        let poll_interval_ms = env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500);

        let status_every = env::var("STATUS_EVERY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(30);

        let frame_limit = env::var("FRAME_LIMIT").ok().and_then(|s| s.parse().ok());

        Ok(Self {
            channel,
            telemetry: TelemetryConfig::from_env("consumer"),
            poll_interval: Duration::from_millis(poll_interval_ms),
            status_every,
            frame_limit,
        })
    }
}
