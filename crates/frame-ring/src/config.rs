use crate::errors::ChannelError;
use crate::layout::{
    DEFAULT_CHANNELS, DEFAULT_HEIGHT, DEFAULT_MAX_DETECTIONS, DEFAULT_QUEUE_SIZE, DEFAULT_WIDTH,
    SlotLayout,
};
use crate::names::{ChannelNames, DEFAULT_PREFIX, DEFAULT_SHM_DIR};
use std::env;
use std::str::FromStr;

/// Names and layout of a channel, shared by both ends so they derive the
/// same region from the same environment.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub names: ChannelNames,
    pub layout: SlotLayout,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ChannelConfig {
    /// Load from environment variables, falling back to the deployed defaults
    /// (`yolo_queue` in `/dev/shm`, 5 slots of 640x640x3 with 200 detections).
    pub fn from_env() -> Result<Self, ChannelError> {
        let prefix = env::var("CHANNEL_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string());
        let shm_dir = env::var("SHM_DIR").unwrap_or_else(|_| DEFAULT_SHM_DIR.to_string());

        let layout = SlotLayout::new(
            env_or("QUEUE_SIZE", DEFAULT_QUEUE_SIZE),
            env_or("MAX_DETECTIONS", DEFAULT_MAX_DETECTIONS),
            env_or("FRAME_WIDTH", DEFAULT_WIDTH),
            env_or("FRAME_HEIGHT", DEFAULT_HEIGHT),
            env_or("FRAME_CHANNELS", DEFAULT_CHANNELS),
        )?;

        Ok(Self {
            names: ChannelNames::with_prefix_in(shm_dir, &prefix),
            layout,
        })
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            names: ChannelNames::default(),
            layout: SlotLayout::default(),
        }
    }
}
