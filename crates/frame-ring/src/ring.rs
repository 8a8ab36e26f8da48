//! Index bookkeeping over the raw region bytes.
//!
//! `Ring` knows nothing about semaphores or locks; the channel constructs one
//! only while holding the region mutex, and the token counts guarantee that
//! `produce` never meets a full ring and `consume` never meets an empty one.
//! If they do anyway, the control block is left untouched and a `RingError`
//! is returned.

use crate::codec::{ControlBlock, SlotHeader, decode_slot, encode_slot};
use crate::layout::{CONTROL_SIZE, HEADER_SIZE, SlotLayout};
use crate::types::{Detection, Detections, Frame, Image};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    #[error("Ring is full (count {count})")]
    Full { count: i32 },

    #[error("Ring is empty (count {count})")]
    Empty { count: i32 },

    #[error("Region of {actual} bytes cannot hold the control block")]
    RegionTooSmall { actual: usize },

    #[error("Slot {slot} lies outside the mapped region")]
    SlotOutOfBounds { slot: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Free for the producer.
    Empty,
    /// Written and not yet drained.
    Full,
}

/// Result of a successful `produce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Produced {
    pub slot: usize,
    pub detections_written: usize,
    /// The supplied image did not match the layout and zeros were written.
    pub image_zeroed: bool,
}

/// Result of a successful `consume`.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumed {
    pub slot: usize,
    pub frame: Frame,
}

pub struct Ring<'a> {
    region: &'a mut [u8],
    layout: SlotLayout,
}

impl<'a> Ring<'a> {
    pub fn new(region: &'a mut [u8], layout: SlotLayout) -> Result<Self, RingError> {
        if region.len() < CONTROL_SIZE {
            return Err(RingError::RegionTooSmall {
                actual: region.len(),
            });
        }
        Ok(Self { region, layout })
    }

    /// Reset indices and count. Slot contents are left as they are.
    pub fn init(&mut self) {
        self.store_control(ControlBlock::default());
    }

    pub fn control(&self) -> ControlBlock {
        ControlBlock::decode(&self.region[..CONTROL_SIZE])
    }

    fn store_control(&mut self, control: ControlBlock) {
        control.encode(&mut self.region[..CONTROL_SIZE]);
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        slot_state(&self.control(), &self.layout, index)
    }

    /// Header of the slot the consumer would drain next.
    pub fn peek_header(&self) -> Option<SlotHeader> {
        peek_header(&self.region[..], &self.layout)
    }

    /// Write one frame into the slot at `write_index` and publish it in the
    /// control block.
    ///
    /// Detections past `max_detections` are dropped. An image whose byte
    /// length differs from the layout is replaced by zeros.
    pub fn produce(
        &mut self,
        frame_id: i32,
        image: &Image,
        detections: &[Detection],
    ) -> Result<Produced, RingError> {
        let mut control = self.control();
        let queue_size = self.layout.queue_size();
        if control.count >= queue_size as i32 {
            return Err(RingError::Full {
                count: control.count,
            });
        }

        let slot = control.write_index as usize % queue_size;
        let start = self.layout.slot_offset(slot);
        let end = start + self.layout.slot_size();
        if end > self.region.len() {
            return Err(RingError::SlotOutOfBounds { slot });
        }

        let max = self.layout.max_detections();
        let kept = detections.len().min(max);
        if kept < detections.len() {
            tracing::warn!(
                frame_id,
                declared = detections.len(),
                kept,
                "Detection count exceeds slot capacity, truncating"
            );
        }

        let image_zeroed = image.data().len() != self.layout.image_bytes();
        if image_zeroed {
            tracing::warn!(
                frame_id,
                actual = image.data().len(),
                expected = self.layout.image_bytes(),
                "Image size mismatch, writing zero image"
            );
        }
        let image_bytes = (!image_zeroed).then(|| image.data());

        encode_slot(
            &mut self.region[start..end],
            &self.layout,
            frame_id,
            &detections[..kept],
            image_bytes,
        );

        control.write_index = ((slot + 1) % queue_size) as u32;
        control.count = control.count.max(0) + 1;
        self.store_control(control);

        Ok(Produced {
            slot,
            detections_written: kept,
            image_zeroed,
        })
    }

    /// Read the slot at `read_index` and release it in the control block.
    ///
    /// A slot whose image cannot be fully read still advances the indices;
    /// the returned frame then carries a zero-filled image and `degraded`.
    pub fn consume(&mut self) -> Result<Consumed, RingError> {
        let mut control = self.control();
        if control.count <= 0 {
            return Err(RingError::Empty {
                count: control.count,
            });
        }

        let queue_size = self.layout.queue_size();
        let slot = control.read_index as usize % queue_size;
        let frame = self.decode_frame(slot);

        control.read_index = ((slot + 1) % queue_size) as u32;
        control.count = (control.count - 1).min(queue_size as i32 - 1);
        self.store_control(control);

        Ok(Consumed { slot, frame })
    }

    fn decode_frame(&self, slot: usize) -> Frame {
        let layout = &self.layout;
        let placeholder = || {
            Image::zeroed(layout.width(), layout.height(), layout.channels())
        };

        let decoded = match decode_slot(slot_window(&self.region[..], layout, slot), layout) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(slot, error = %e, "Slot header unreadable, substituting placeholder");
                return Frame {
                    frame_id: 0,
                    image: placeholder(),
                    detections: Detections::with_capacity(layout.max_detections()),
                    degraded: true,
                };
            }
        };

        let frame_id = decoded.header.frame_id;
        let header = &decoded.header;
        let expected = (
            layout.width() as i32,
            layout.height() as i32,
            layout.channels() as i32,
        );
        if (header.width, header.height, header.channels) != expected {
            tracing::warn!(
                frame_id,
                slot,
                width = header.width,
                height = header.height,
                channels = header.channels,
                "Slot dimensions disagree with layout, substituting placeholder"
            );
            return Frame {
                frame_id,
                image: placeholder(),
                detections: Detections::with_capacity(layout.max_detections()),
                degraded: true,
            };
        }

        if decoded.dropped_detections > 0 {
            tracing::warn!(
                frame_id,
                declared = decoded.header.detection_count,
                kept = decoded.detections.len(),
                "Declared detection count exceeds slot capacity, truncating"
            );
        }

        let (image, degraded) = match decoded.image {
            Ok(image) => (image, false),
            Err(e) => {
                tracing::warn!(frame_id, slot, error = %e, "Image read failed, substituting placeholder");
                (placeholder(), true)
            }
        };

        Frame {
            frame_id,
            image,
            detections: decoded.detections,
            degraded,
        }
    }
}

/// Bytes of slot `index`, cut short if the region ends early.
fn slot_window<'r>(region: &'r [u8], layout: &SlotLayout, index: usize) -> &'r [u8] {
    let start = layout.slot_offset(index).min(region.len());
    let end = (start + layout.slot_size()).min(region.len());
    &region[start..end]
}

pub(crate) fn slot_state(control: &ControlBlock, layout: &SlotLayout, index: usize) -> SlotState {
    let queue_size = layout.queue_size();
    let read = control.read_index as usize % queue_size;
    let distance = (index % queue_size + queue_size - read) % queue_size;
    if (distance as i64) < control.count as i64 {
        SlotState::Full
    } else {
        SlotState::Empty
    }
}

pub(crate) fn peek_header(region: &[u8], layout: &SlotLayout) -> Option<SlotHeader> {
    let control = ControlBlock::decode(region.get(..CONTROL_SIZE)?);
    if control.count <= 0 {
        return None;
    }
    let slot = control.read_index as usize % layout.queue_size();
    let window = slot_window(region, layout, slot);
    window.get(..HEADER_SIZE).map(SlotHeader::decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SlotLayout {
        SlotLayout::new(3, 4, 4, 4, 3).unwrap()
    }

    fn image(layout: &SlotLayout, fill: u8) -> Image {
        Image::new(
            layout.width(),
            layout.height(),
            layout.channels(),
            vec![fill; layout.image_bytes()],
        )
    }

    fn det(class_id: i32) -> Detection {
        Detection {
            class_id,
            confidence: 0.75,
            x: class_id,
            y: 2 * class_id,
            width: 3,
            height: 4,
        }
    }

    #[test]
    fn test_init_zeroes_control_block() {
        let layout = layout();
        let mut region = vec![0xFFu8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        assert_eq!(ring.control(), ControlBlock::default());
        for slot in 0..3 {
            assert_eq!(ring.slot_state(slot), SlotState::Empty);
        }
    }

    #[test]
    fn test_produce_then_consume_is_fifo() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        ring.produce(1, &image(&layout, 1), &[det(1)]).unwrap();
        ring.produce(2, &image(&layout, 2), &[det(2), det(3)]).unwrap();

        let first = ring.consume().unwrap();
        assert_eq!(first.slot, 0);
        assert_eq!(first.frame.frame_id, 1);
        assert_eq!(first.frame.detections.as_slice(), &[det(1)]);
        assert!(first.frame.image.data().iter().all(|&b| b == 1));

        let second = ring.consume().unwrap();
        assert_eq!(second.slot, 1);
        assert_eq!(second.frame.frame_id, 2);
        assert_eq!(second.frame.detections.len(), 2);
        assert!(!second.frame.degraded);
    }

    #[test]
    fn test_count_tracks_writes_minus_reads() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        let img = image(&layout, 0);
        let mut writes = 0;
        let mut reads = 0;
        // Interleave so the indices wrap several times.
        for round in 0..10 {
            for _ in 0..(round % 3 + 1) {
                ring.produce(writes, &img, &[]).unwrap();
                writes += 1;
            }
            for _ in 0..(round % 3 + 1) {
                let consumed = ring.consume().unwrap();
                assert_eq!(consumed.frame.frame_id, reads, "frames leave in order");
                reads += 1;
                let count = ring.control().count;
                assert!((0..=3).contains(&count));
                assert_eq!(count, writes - reads);
            }
        }
    }

    #[test]
    fn test_indices_wrap_modulo_queue_size() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        let img = image(&layout, 0);
        for id in 0..3 {
            ring.produce(id, &img, &[]).unwrap();
        }
        assert_eq!(ring.control().write_index, 0);
        assert_eq!(ring.control().count, 3);

        for _ in 0..3 {
            ring.consume().unwrap();
        }
        assert_eq!(ring.control().read_index, 0);
        assert_eq!(ring.control().count, 0);
    }

    #[test]
    fn test_produce_into_full_ring_is_refused() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        let img = image(&layout, 0);
        for id in 0..3 {
            ring.produce(id, &img, &[]).unwrap();
        }
        let before = ring.control();
        assert_eq!(
            ring.produce(3, &img, &[]),
            Err(RingError::Full { count: 3 })
        );
        assert_eq!(ring.control(), before, "control block untouched");
    }

    #[test]
    fn test_consume_from_empty_ring_is_refused() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        assert_eq!(ring.consume(), Err(RingError::Empty { count: 0 }));
    }

    #[test]
    fn test_slot_state_follows_read_window() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        let img = image(&layout, 0);
        ring.produce(0, &img, &[]).unwrap();
        ring.produce(1, &img, &[]).unwrap();
        ring.consume().unwrap();

        // read_index = 1, count = 1
        assert_eq!(ring.slot_state(0), SlotState::Empty);
        assert_eq!(ring.slot_state(1), SlotState::Full);
        assert_eq!(ring.slot_state(2), SlotState::Empty);
    }

    #[test]
    fn test_produce_truncates_excess_detections() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        let dets: Vec<Detection> = (0..6).map(det).collect();
        let produced = ring.produce(9, &image(&layout, 0), &dets).unwrap();
        assert_eq!(produced.detections_written, 4);

        let consumed = ring.consume().unwrap();
        assert_eq!(consumed.frame.detections.as_slice(), &dets[..4]);
    }

    #[test]
    fn test_produce_replaces_mismatched_image_with_zeros() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();

        let wrong = Image::new(2, 2, 3, vec![9; 12]);
        let produced = ring.produce(5, &wrong, &[]).unwrap();
        assert!(produced.image_zeroed);

        let frame = ring.consume().unwrap().frame;
        assert_eq!(frame.image.width(), 4);
        assert_eq!(frame.image.data().len(), layout.image_bytes());
        assert!(frame.image.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_consume_clamps_oversized_declared_count() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        {
            let mut ring = Ring::new(&mut region, layout).unwrap();
            ring.init();
            let dets: Vec<Detection> = (0..4).map(det).collect();
            ring.produce(11, &image(&layout, 0), &dets).unwrap();
        }

        // Overwrite the declared count in slot 0 with a value above capacity.
        let count_at = layout.slot_offset(0) + 16;
        region[count_at..count_at + 4].copy_from_slice(&250i32.to_le_bytes());

        let mut ring = Ring::new(&mut region, layout).unwrap();
        let frame = ring.consume().unwrap().frame;
        assert_eq!(frame.detections.len(), 4);
        assert!(!frame.degraded);
    }

    #[test]
    fn test_short_region_yields_placeholder_and_advances() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        {
            let mut ring = Ring::new(&mut region, layout).unwrap();
            ring.init();
            ring.produce(1, &image(&layout, 7), &[]).unwrap();
            ring.produce(2, &image(&layout, 7), &[]).unwrap();
        }

        // Cut the region inside slot 1's image.
        region.truncate(layout.slot_offset(2) - 10);

        let mut ring = Ring::new(&mut region, layout).unwrap();
        assert!(!ring.consume().unwrap().frame.degraded);

        let consumed = ring.consume().unwrap();
        assert_eq!(consumed.frame.frame_id, 2);
        assert!(consumed.frame.degraded);
        assert_eq!(consumed.frame.image, Image::zeroed(4, 4, 3));
        assert_eq!(ring.control().read_index, 2);
        assert_eq!(ring.control().count, 0);
    }

    #[test]
    fn test_foreign_dimensions_yield_placeholder() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        {
            let mut ring = Ring::new(&mut region, layout).unwrap();
            ring.init();
            ring.produce(21, &image(&layout, 9), &[det(1)]).unwrap();
        }

        // A writer with another frame size would stamp its own width.
        let width_at = layout.slot_offset(0) + 4;
        region[width_at..width_at + 4].copy_from_slice(&8i32.to_le_bytes());

        let mut ring = Ring::new(&mut region, layout).unwrap();
        let frame = ring.consume().unwrap().frame;
        assert!(frame.degraded);
        assert_eq!(frame.frame_id, 21);
        assert!(frame.detections.is_empty());
        assert_eq!(frame.image, Image::zeroed(4, 4, 3));
        assert_eq!(ring.control().count, 0);
    }

    #[test]
    fn test_peek_header_reports_next_frame() {
        let layout = layout();
        let mut region = vec![0u8; layout.total_size()];
        let mut ring = Ring::new(&mut region, layout).unwrap();
        ring.init();
        assert!(ring.peek_header().is_none());

        ring.produce(77, &image(&layout, 0), &[det(1)]).unwrap();
        let header = ring.peek_header().unwrap();
        assert_eq!(header.frame_id, 77);
        assert_eq!(header.detection_count, 1);
    }

    #[test]
    fn test_region_smaller_than_control_block_rejected() {
        let mut region = vec![0u8; 4];
        assert!(matches!(
            Ring::new(&mut region, layout()),
            Err(RingError::RegionTooSmall { actual: 4 })
        ));
    }
}
