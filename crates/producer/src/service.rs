use crate::config::ProducerConfig;
use crate::pattern::TestPattern;
use anyhow::{Context, Result};
use frame_ring::{ChannelError, FrameProducer};
use opentelemetry::{global, metrics::Counter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

pub struct ProducerService {
    config: ProducerConfig,
    producer: FrameProducer,
    pattern: TestPattern,
}

struct Metrics {
    frames: Counter<u64>,
    queue_full: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    Metrics {
        frames: meter
            .u64_counter("producer_frames_total")
            .with_description("Frames published to the ring")
            .build(),
        queue_full: meter
            .u64_counter("producer_queue_full_total")
            .with_description("Write waits that timed out on a full ring")
            .build(),
    }
}

impl ProducerService {
    pub fn new(config: ProducerConfig, producer: FrameProducer) -> Self {
        let pattern = TestPattern::new(*producer.layout());
        Self {
            config,
            producer,
            pattern,
        }
    }

    /// Publish frames until `shutdown` is set or the frame limit is reached.
    /// Returns the number of frames written.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<u64> {
        let metrics = init_metrics("producer");
        let mut written = 0u64;

        tracing::info!(
            frame_interval_ms = self.config.frame_interval.as_millis() as u64,
            frame_limit = ?self.config.frame_limit,
            "Producer loop starting"
        );

        'frames: while !shutdown.load(Ordering::Relaxed) {
            if self.config.frame_limit.is_some_and(|limit| written >= limit) {
                tracing::info!(written, "Frame limit reached");
                break;
            }

            let (frame_id, image, detections) = self.pattern.next_frame();
            let _span = common::span!("publish_frame");

            loop {
                match self.producer.write_frame_timeout(
                    frame_id,
                    &image,
                    &detections,
                    self.config.write_timeout,
                ) {
                    Ok(()) => break,
                    Err(ChannelError::Timeout) => {
                        metrics.queue_full.add(1, &[]);
                        tracing::debug!(frame_id, "Ring full, waiting for consumer");
                        if shutdown.load(Ordering::Relaxed) {
                            break 'frames;
                        }
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("Failed to write frame {frame_id}"));
                    }
                }
            }

            written += 1;
            metrics.frames.add(1, &[]);

            if written.is_multiple_of(self.config.status_every) {
                let control = self.producer.control()?;
                tracing::info!(
                    written,
                    frame_id,
                    queued = control.count,
                    "Producer status"
                );
            }

            if !self.config.frame_interval.is_zero() {
                thread::sleep(self.config.frame_interval);
            }
        }

        tracing::info!(written, "Producer loop stopped");
        Ok(written)
    }
}
