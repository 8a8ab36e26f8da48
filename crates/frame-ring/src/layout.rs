//! Byte layout of the shared ring region.
//!
//! ```text
//! 0                                   control block (write_index, read_index, count)
//! CONTROL_SIZE                        slot 0
//! CONTROL_SIZE + n * slot_size        slot n
//!
//! slot:  header (20 bytes) | detections (max_detections * 24 bytes) | image
//! ```
//!
//! Producer and consumer must build the same `SlotLayout`; nothing in the
//! region itself records the constants.

use crate::errors::ChannelError;

/// Control block: `i32 write_index, i32 read_index, i32 count`
pub const CONTROL_SIZE: usize = 12;

/// Slot header: `i32 frame_id, width, height, channels, detection_count`
pub const HEADER_SIZE: usize = 20;

/// Detection record: `i32 class_id, f32 confidence, i32 x, y, width, height`
pub const RECORD_SIZE: usize = 24;

pub const DEFAULT_QUEUE_SIZE: usize = 5;
pub const DEFAULT_MAX_DETECTIONS: usize = 200;
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 640;
pub const DEFAULT_CHANNELS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    queue_size: usize,
    max_detections: usize,
    width: u32,
    height: u32,
    channels: u32,
    image_bytes: usize,
    slot_size: usize,
    total_size: usize,
}

impl SlotLayout {
    /// Build a layout, computing slot and region sizes once.
    ///
    /// Every dimension must be non-zero and every wire field must fit in an
    /// `i32`, since the header and control block store them as such.
    pub fn new(
        queue_size: usize,
        max_detections: usize,
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<Self, ChannelError> {
        if queue_size == 0 || max_detections == 0 || width == 0 || height == 0 || channels == 0 {
            return Err(ChannelError::InvalidLayout(format!(
                "all dimensions must be non-zero (queue_size={queue_size}, max_detections={max_detections}, {width}x{height}x{channels})"
            )));
        }

        let fits_i32 = |v: u64| v <= i32::MAX as u64;
        if !fits_i32(queue_size as u64)
            || !fits_i32(max_detections as u64)
            || !fits_i32(width as u64)
            || !fits_i32(height as u64)
            || !fits_i32(channels as u64)
        {
            return Err(ChannelError::InvalidLayout(
                "dimensions must fit in a 32-bit signed field".to_string(),
            ));
        }

        let overflow = || ChannelError::InvalidLayout("region size overflows usize".to_string());

        let image_bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(channels as usize))
            .ok_or_else(overflow)?;
        let slot_size = max_detections
            .checked_mul(RECORD_SIZE)
            .and_then(|v| v.checked_add(HEADER_SIZE))
            .and_then(|v| v.checked_add(image_bytes))
            .ok_or_else(overflow)?;
        let total_size = slot_size
            .checked_mul(queue_size)
            .and_then(|v| v.checked_add(CONTROL_SIZE))
            .ok_or_else(overflow)?;

        Ok(Self {
            queue_size,
            max_detections,
            width,
            height,
            channels,
            image_bytes,
            slot_size,
            total_size,
        })
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub fn max_detections(&self) -> usize {
        self.max_detections
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Size of the raw image block in every slot.
    pub fn image_bytes(&self) -> usize {
        self.image_bytes
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Size of the whole shared region.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Absolute offset of slot `index` within the region.
    pub fn slot_offset(&self, index: usize) -> usize {
        CONTROL_SIZE + index * self.slot_size
    }

    /// Offset of the detection array relative to the start of a slot.
    pub fn detections_offset(&self) -> usize {
        HEADER_SIZE
    }

    /// Offset of the image block relative to the start of a slot.
    pub fn image_offset(&self) -> usize {
        HEADER_SIZE + self.max_detections * RECORD_SIZE
    }
}

impl Default for SlotLayout {
    fn default() -> Self {
        let image_bytes = (DEFAULT_WIDTH * DEFAULT_HEIGHT * DEFAULT_CHANNELS) as usize;
        let slot_size = HEADER_SIZE + DEFAULT_MAX_DETECTIONS * RECORD_SIZE + image_bytes;
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            max_detections: DEFAULT_MAX_DETECTIONS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            channels: DEFAULT_CHANNELS,
            image_bytes,
            slot_size,
            total_size: CONTROL_SIZE + DEFAULT_QUEUE_SIZE * slot_size,
        }
    }
}
