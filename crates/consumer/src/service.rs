use crate::config::ConsumerConfig;
use crate::stats::ConsumerStats;
use anyhow::{Context, Result};
use common::wait_for_resource;
use frame_ring::{ChannelError, Frame, FrameConsumer};
use opentelemetry::{global, metrics::Counter};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ConsumerService {
    config: ConsumerConfig,
    stats: ConsumerStats,
}

struct Metrics {
    frames: Counter<u64>,
    degraded: Counter<u64>,
    detections: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    Metrics {
        frames: meter
            .u64_counter("consumer_frames_total")
            .with_description("Frames drained from the ring")
            .build(),
        degraded: meter
            .u64_counter("consumer_degraded_frames_total")
            .with_description("Frames whose image was replaced by a placeholder")
            .build(),
        detections: meter
            .u64_counter("consumer_detections_total")
            .with_description("Detections received")
            .build(),
    }
}

/// How a read loop over one attachment ended.
enum Detach {
    Shutdown,
    Disconnected,
}

impl ConsumerService {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Attach, drain frames, and reattach whenever the producer goes away,
    /// until `shutdown` is set or the frame limit is reached.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let metrics = init_metrics("consumer");

        loop {
            let Some(mut consumer) = wait_for_resource(
                || FrameConsumer::from_config(&self.config.channel),
                self.config.poll_interval,
                "Frame ring",
                shutdown,
            ) else {
                break;
            };

            match self.drain(&mut consumer, shutdown, &metrics)? {
                Detach::Shutdown => break,
                Detach::Disconnected => {
                    tracing::warn!(
                        last_frame_id = ?self.stats.last_frame_id,
                        "Producer went away, waiting for a new one"
                    );
                    self.stats.reattached();
                }
            }
        }

        tracing::info!(
            frames = self.stats.frames,
            degraded = self.stats.degraded,
            detections = self.stats.detections,
            gaps = self.stats.gaps,
            reconnects = self.stats.reconnects,
            "Consumer stopped"
        );
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.config
            .frame_limit
            .is_some_and(|limit| self.stats.frames >= limit)
    }

    fn drain(
        &mut self,
        consumer: &mut FrameConsumer,
        shutdown: &AtomicBool,
        metrics: &Metrics,
    ) -> Result<Detach> {
        loop {
            if shutdown.load(Ordering::Relaxed) || self.limit_reached() {
                return Ok(Detach::Shutdown);
            }

            match consumer.read_frame_timeout(self.config.poll_interval) {
                Ok(frame) => self.handle_frame(&frame, metrics),
                Err(ChannelError::Timeout) => continue,
                Err(ChannelError::Disconnected) => return Ok(Detach::Disconnected),
                Err(e @ ChannelError::Desynchronized(_)) => {
                    tracing::error!(error = %e, "Skipping read on inconsistent ring");
                }
                Err(e) => return Err(e).context("Failed to read frame"),
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame, metrics: &Metrics) {
        let _span = common::span!("consume_frame");

        if let Some(skipped) = self.stats.record(frame) {
            tracing::warn!(frame_id = frame.frame_id, skipped, "Frame ids not contiguous");
        }

        metrics.frames.add(1, &[]);
        metrics.detections.add(frame.detections.len() as u64, &[]);
        if frame.degraded {
            metrics.degraded.add(1, &[]);
        }

        tracing::debug!(
            frame_id = frame.frame_id,
            detections = frame.detections.len(),
            degraded = frame.degraded,
            "Frame received"
        );
        for det in &frame.detections {
            tracing::trace!(
                class_id = det.class_id,
                confidence = det.confidence,
                x = det.x,
                y = det.y,
                width = det.width,
                height = det.height,
                "Detection"
            );
        }

        if self.stats.frames.is_multiple_of(self.config.status_every) {
            tracing::info!(
                frames = self.stats.frames,
                degraded = self.stats.degraded,
                detections = self.stats.detections,
                last_frame_id = frame.frame_id,
                "Consumer status"
            );
        }
    }
}
