use crate::ring::RingError;
use crate::semaphore::SemaphoreError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Peer disconnected: shared objects no longer exist")]
    Disconnected,

    #[error("Timed out waiting for a slot")]
    Timeout,

    #[error("Shared object not found: {name}")]
    NotFound { name: String },

    #[error("Region too small: expected at least {expected} bytes, got {actual}")]
    RegionTooSmall { expected: usize, actual: usize },

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Region of {actual} bytes is larger than the {expected} bytes the layout describes")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("Ring state inconsistent with token counts: {0}")]
    Desynchronized(#[from] RingError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Semaphore error: {0}")]
    SemaphoreError(SemaphoreError),
}

impl From<SemaphoreError> for ChannelError {
    fn from(err: SemaphoreError) -> Self {
        if err.is_invalidated() {
            return ChannelError::Disconnected;
        }
        match err {
            SemaphoreError::OpenFailed { name, errno } if errno == nix::errno::Errno::ENOENT => {
                ChannelError::NotFound { name }
            }
            other => ChannelError::SemaphoreError(other),
        }
    }
}
