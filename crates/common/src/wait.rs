use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Retry `connect` every `poll_interval` until it succeeds.
///
/// Returns `None` once `shutdown` is set, so a service waiting for its peer
/// still exits on SIGINT/SIGTERM.
pub fn wait_for_resource<F, T, E>(
    mut connect: F,
    poll_interval: Duration,
    resource_name: &str,
    shutdown: &AtomicBool,
) -> Option<T>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;
    while !shutdown.load(Ordering::Relaxed) {
        attempts += 1;
        match connect() {
            Ok(resource) => {
                tracing::info!(attempts, "{} connected", resource_name);
                return Some(resource);
            }
            Err(e) => {
                tracing::debug!(attempts, "Waiting for {} ({})", resource_name, e);
                std::thread::sleep(poll_interval);
            }
        }
    }
    None
}
