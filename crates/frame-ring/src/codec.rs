//! Little-endian encoding of the control block and slot contents.
//!
//! Encoders panic if handed a buffer shorter than the record they write;
//! callers size their windows from [`SlotLayout`]. Decoders of whole slots
//! tolerate short windows and report them as [`DecodeError::ShortRead`].

use crate::layout::{CONTROL_SIZE, HEADER_SIZE, RECORD_SIZE, SlotLayout};
use crate::types::{Detection, Detections, Image};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    i32::from_le_bytes(bytes)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_f32(buf: &[u8], at: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    f32::from_le_bytes(bytes)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlBlock {
    /// Next slot the producer fills.
    pub write_index: u32,
    /// Next slot the consumer drains.
    pub read_index: u32,
    /// Slots holding unread data.
    pub count: i32,
}

impl ControlBlock {
    pub const SIZE: usize = CONTROL_SIZE;

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.write_index.to_le_bytes());
        buf[4..8].copy_from_slice(&self.read_index.to_le_bytes());
        buf[8..12].copy_from_slice(&self.count.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            write_index: read_u32(buf, 0),
            read_index: read_u32(buf, 4),
            count: read_i32(buf, 8),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotHeader {
    pub frame_id: i32,
    pub width: i32,
    pub height: i32,
    pub channels: i32,
    /// Count as declared by the producer; use [`Self::clamped_detection_count`]
    /// before indexing records.
    pub detection_count: i32,
}

impl SlotHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.width.to_le_bytes());
        buf[8..12].copy_from_slice(&self.height.to_le_bytes());
        buf[12..16].copy_from_slice(&self.channels.to_le_bytes());
        buf[16..20].copy_from_slice(&self.detection_count.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            frame_id: read_i32(buf, 0),
            width: read_i32(buf, 4),
            height: read_i32(buf, 8),
            channels: read_i32(buf, 12),
            detection_count: read_i32(buf, 16),
        }
    }

    /// Number of records that may be read: negative counts become 0 and
    /// counts above `max` become `max`. Lossy on purpose.
    pub fn clamped_detection_count(&self, max: usize) -> usize {
        usize::try_from(self.detection_count)
            .unwrap_or(0)
            .min(max)
    }
}

impl Detection {
    pub const SIZE: usize = RECORD_SIZE;

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.class_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.confidence.to_le_bytes());
        buf[8..12].copy_from_slice(&self.x.to_le_bytes());
        buf[12..16].copy_from_slice(&self.y.to_le_bytes());
        buf[16..20].copy_from_slice(&self.width.to_le_bytes());
        buf[20..24].copy_from_slice(&self.height.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            class_id: read_i32(buf, 0),
            confidence: read_f32(buf, 4),
            x: read_i32(buf, 8),
            y: read_i32(buf, 12),
            width: read_i32(buf, 16),
            height: read_i32(buf, 20),
        }
    }
}

/// Write one full slot.
///
/// `detections` must not exceed `layout.max_detections()`; unused records are
/// zeroed. `image` must be exactly `layout.image_bytes()` long, or `None` to
/// write a zero image.
///
/// # Panics
///
/// If `slot` is shorter than `layout.slot_size()` or the detections or image
/// do not fit the layout.
pub fn encode_slot(
    slot: &mut [u8],
    layout: &SlotLayout,
    frame_id: i32,
    detections: &[Detection],
    image: Option<&[u8]>,
) {
    assert!(
        detections.len() <= layout.max_detections(),
        "detections exceed slot capacity"
    );

    let header = SlotHeader {
        frame_id,
        width: layout.width() as i32,
        height: layout.height() as i32,
        channels: layout.channels() as i32,
        detection_count: detections.len() as i32,
    };
    header.encode(&mut slot[..HEADER_SIZE]);

    let records_start = layout.detections_offset();
    let records_end = layout.image_offset();
    let records = &mut slot[records_start..records_end];
    for (chunk, det) in records.chunks_exact_mut(RECORD_SIZE).zip(detections) {
        det.encode(chunk);
    }
    records[detections.len() * RECORD_SIZE..].fill(0);

    let image_region = &mut slot[records_end..records_end + layout.image_bytes()];
    match image {
        Some(bytes) => image_region.copy_from_slice(bytes),
        None => image_region.fill(0),
    }
}

/// Slot contents as read back from the region.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSlot {
    pub header: SlotHeader,
    pub detections: Detections,
    /// Declared records that were not decoded, either beyond the capacity or
    /// beyond the end of a short window.
    pub dropped_detections: usize,
    pub image: Result<Image, DecodeError>,
}

/// Decode one slot window. The window may be shorter than the slot size when
/// the mapped region is truncated; whatever does not fit is reported rather
/// than read.
pub fn decode_slot(slot: &[u8], layout: &SlotLayout) -> Result<DecodedSlot, DecodeError> {
    if slot.len() < HEADER_SIZE {
        return Err(DecodeError::ShortRead {
            expected: HEADER_SIZE,
            actual: slot.len(),
        });
    }

    let header = SlotHeader::decode(&slot[..HEADER_SIZE]);
    let declared = usize::try_from(header.detection_count).unwrap_or(0);
    let wanted = header.clamped_detection_count(layout.max_detections());

    let records_end = layout.image_offset().min(slot.len());
    let records = &slot[layout.detections_offset()..records_end];
    let available = records.len() / RECORD_SIZE;
    let (detections, _) = Detections::truncating(
        layout.max_detections(),
        records
            .chunks_exact(RECORD_SIZE)
            .take(wanted.min(available))
            .map(Detection::decode),
    );

    let image = decode_image(slot.get(layout.image_offset()..).unwrap_or(&[]), layout);

    Ok(DecodedSlot {
        header,
        dropped_detections: declared - detections.len(),
        detections,
        image,
    })
}

/// Copy the image block out of `bytes`, which starts at the image offset.
/// Anything other than exactly `layout.image_bytes()` available is a short read.
pub fn decode_image(bytes: &[u8], layout: &SlotLayout) -> Result<Image, DecodeError> {
    let expected = layout.image_bytes();
    if bytes.len() < expected {
        return Err(DecodeError::ShortRead {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(Image::new(
        layout.width(),
        layout.height(),
        layout.channels(),
        bytes[..expected].to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_layout() -> SlotLayout {
        SlotLayout::new(2, 4, 4, 2, 3).unwrap()
    }

    fn det(class_id: i32, confidence: f32, x: i32, y: i32, w: i32, h: i32) -> Detection {
        Detection {
            class_id,
            confidence,
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_control_block_wire_format() {
        let block = ControlBlock {
            write_index: 3,
            read_index: 1,
            count: 2,
        };
        let mut buf = [0u8; CONTROL_SIZE];
        block.encode(&mut buf);

        assert_eq!(buf, [3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(ControlBlock::decode(&buf), block);
    }

    #[test]
    fn test_detection_wire_format() {
        let d = det(5, 0.5, 1, 2, 3, 4);
        let mut buf = [0u8; RECORD_SIZE];
        d.encode(&mut buf);

        assert_eq!(&buf[0..4], &5i32.to_le_bytes());
        assert_eq!(&buf[4..8], &0.5f32.to_le_bytes());
        assert_eq!(&buf[20..24], &4i32.to_le_bytes());
        assert_eq!(Detection::decode(&buf), d);
    }

    #[test]
    fn test_clamp_detection_count() {
        let mut header = SlotHeader {
            detection_count: 250,
            ..Default::default()
        };
        assert_eq!(header.clamped_detection_count(200), 200);

        header.detection_count = -3;
        assert_eq!(header.clamped_detection_count(200), 0);

        header.detection_count = 17;
        assert_eq!(header.clamped_detection_count(200), 17);
    }

    #[test]
    fn test_slot_roundtrip_for_each_valid_count() {
        let layout = small_layout();
        let image: Vec<u8> = (0..layout.image_bytes() as u8).collect();

        for count in 0..=layout.max_detections() {
            let dets: Vec<Detection> = (0..count as i32)
                .map(|i| det(i, 0.25 * i as f32, i, i + 1, i + 2, i + 3))
                .collect();

            let mut slot = vec![0xAAu8; layout.slot_size()];
            encode_slot(&mut slot, &layout, 42, &dets, Some(&image));

            let decoded = decode_slot(&slot, &layout).unwrap();
            assert_eq!(decoded.header.frame_id, 42);
            assert_eq!(decoded.header.width, 4);
            assert_eq!(decoded.header.height, 2);
            assert_eq!(decoded.header.channels, 3);
            assert_eq!(decoded.detections.as_slice(), dets.as_slice());
            assert_eq!(decoded.dropped_detections, 0);
            assert_eq!(decoded.image.unwrap().data(), image.as_slice());
        }
    }

    #[test]
    fn test_unused_records_are_zeroed() {
        let layout = small_layout();
        let mut slot = vec![0xFFu8; layout.slot_size()];
        encode_slot(&mut slot, &layout, 1, &[det(1, 1.0, 1, 1, 1, 1)], None);

        let padding = &slot[HEADER_SIZE + RECORD_SIZE..layout.image_offset()];
        assert!(padding.iter().all(|&b| b == 0));
        assert!(slot[layout.image_offset()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_declared_count_above_capacity_is_clamped() {
        let layout = small_layout();
        let dets: Vec<Detection> = (0..4).map(|i| det(i, 0.9, 0, 0, 1, 1)).collect();
        let mut slot = vec![0u8; layout.slot_size()];
        encode_slot(&mut slot, &layout, 7, &dets, None);

        // Producer claims more records than the slot holds.
        SlotHeader {
            frame_id: 7,
            width: 4,
            height: 2,
            channels: 3,
            detection_count: 9,
        }
        .encode(&mut slot[..HEADER_SIZE]);

        let decoded = decode_slot(&slot, &layout).unwrap();
        assert_eq!(decoded.detections.len(), 4);
        assert_eq!(decoded.dropped_detections, 5);
        assert!(decoded.image.is_ok());
    }

    #[test]
    fn test_short_image_window_reports_short_read() {
        let layout = small_layout();
        let mut slot = vec![0u8; layout.slot_size()];
        encode_slot(&mut slot, &layout, 3, &[], None);

        let truncated = &slot[..layout.slot_size() - 5];
        let decoded = decode_slot(truncated, &layout).unwrap();

        assert_eq!(
            decoded.image,
            Err(DecodeError::ShortRead {
                expected: layout.image_bytes(),
                actual: layout.image_bytes() - 5,
            })
        );
        assert_eq!(decoded.header.frame_id, 3);
    }

    #[test]
    fn test_window_shorter_than_header_fails() {
        let layout = small_layout();
        let err = decode_slot(&[0u8; 10], &layout).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortRead {
                expected: HEADER_SIZE,
                actual: 10
            }
        );
    }
}
