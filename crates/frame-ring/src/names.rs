//! Names of the shared objects backing one channel.
//!
//! All four objects are derived from a single prefix so producer and consumer
//! cannot disagree on one of them.

use std::path::{Path, PathBuf};

/// Directory holding shared memory regions on Linux.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "yolo_queue";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    /// Shared memory region file.
    pub region: PathBuf,
    /// Semaphore counting free slots.
    pub empty: String,
    /// Semaphore counting filled slots.
    pub full: String,
    /// Binary semaphore guarding the control block and slots.
    pub mutex: String,
}

impl ChannelNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self::with_prefix_in(DEFAULT_SHM_DIR, prefix)
    }

    /// Same as [`Self::with_prefix`] but places the region file under `dir`.
    pub fn with_prefix_in(dir: impl AsRef<Path>, prefix: &str) -> Self {
        Self {
            region: dir.as_ref().join(format!("{prefix}_shm")),
            empty: format!("/{prefix}_empty"),
            full: format!("/{prefix}_full"),
            mutex: format!("/{prefix}_mutex"),
        }
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}
