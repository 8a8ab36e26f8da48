use frame_ring::Frame;

/// Running totals over the frames a consumer has drained.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub frames: u64,
    pub degraded: u64,
    pub detections: u64,
    /// Frames whose id did not follow the previous one.
    pub gaps: u64,
    pub reconnects: u64,
    pub last_frame_id: Option<i32>,
}

impl ConsumerStats {
    /// Fold one frame in. Returns the number of ids skipped since the
    /// previous frame, if any.
    pub fn record(&mut self, frame: &Frame) -> Option<i64> {
        self.frames += 1;
        self.detections += frame.detections.len() as u64;
        if frame.degraded {
            self.degraded += 1;
        }

        let skipped = self.last_frame_id.and_then(|last| {
            let expected = last.wrapping_add(1);
            (frame.frame_id != expected).then(|| i64::from(frame.frame_id) - i64::from(expected))
        });
        if skipped.is_some() {
            self.gaps += 1;
        }

        self.last_frame_id = Some(frame.frame_id);
        skipped
    }

    /// A new producer restarts its ids, so continuity is not checked across
    /// a reattach.
    pub fn reattached(&mut self) {
        self.reconnects += 1;
        self.last_frame_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_ring::{Detection, Detections, Image};

    fn frame(frame_id: i32, detections: usize, degraded: bool) -> Frame {
        let det = Detection {
            class_id: 1,
            confidence: 0.8,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        };
        let (detections, _) = Detections::truncating(8, std::iter::repeat_n(det, detections));
        Frame {
            frame_id,
            image: Image::zeroed(2, 2, 3),
            detections,
            degraded,
        }
    }

    #[test]
    fn test_counts_frames_detections_and_degraded() {
        let mut stats = ConsumerStats::default();
        stats.record(&frame(1, 2, false));
        stats.record(&frame(2, 0, true));
        stats.record(&frame(3, 5, false));

        assert_eq!(stats.frames, 3);
        assert_eq!(stats.detections, 7);
        assert_eq!(stats.degraded, 1);
        assert_eq!(stats.gaps, 0);
        assert_eq!(stats.last_frame_id, Some(3));
    }

    #[test]
    fn test_reports_skipped_ids() {
        let mut stats = ConsumerStats::default();
        assert_eq!(stats.record(&frame(10, 0, false)), None);
        assert_eq!(stats.record(&frame(11, 0, false)), None);
        assert_eq!(stats.record(&frame(15, 0, false)), Some(3));
        assert_eq!(stats.gaps, 1);
    }

    #[test]
    fn test_wrapping_ids_are_continuous() {
        let mut stats = ConsumerStats::default();
        stats.record(&frame(i32::MAX, 0, false));
        assert_eq!(stats.record(&frame(i32::MIN, 0, false)), None);
    }

    #[test]
    fn test_reattach_resets_continuity() {
        let mut stats = ConsumerStats::default();
        stats.record(&frame(500, 0, false));
        stats.reattached();

        assert_eq!(stats.record(&frame(1, 0, false)), None);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.frames, 2);
    }
}
