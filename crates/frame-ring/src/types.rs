use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// One object-detection record as carried in a slot.
/// Box coordinates are in image pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Detection {
    pub class_id: i32,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Bounded list of detections.
///
/// Mirrors the slot's fixed record array: a capacity fixed at construction
/// and an explicit valid length. Pushing past the capacity is refused.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    records: Vec<Detection>,
    capacity: usize,
}

impl Detections {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Collect up to `capacity` detections and return how many were dropped.
    pub fn truncating<I>(capacity: usize, detections: I) -> (Self, usize)
    where
        I: IntoIterator<Item = Detection>,
    {
        let mut out = Self::with_capacity(capacity);
        let mut dropped = 0;
        for det in detections {
            if out.push(det).is_err() {
                dropped += 1;
            }
        }
        (out, dropped)
    }

    /// Append a detection, handing it back if the list is full.
    pub fn push(&mut self, detection: Detection) -> Result<(), Detection> {
        if self.is_full() {
            return Err(detection);
        }
        self.records.push(detection);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<Detection> {
        self.records
    }
}

impl Deref for Detections {
    type Target = [Detection];

    fn deref(&self) -> &[Detection] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a Detections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Raw image, row-major with interleaved channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Zero-filled image, used as the placeholder for unreadable slots.
    pub fn zeroed(width: u32, height: u32, channels: u32) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![0; len])
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

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Channel values of the pixel at (`x`, `y`), if in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        self.data.get(start..start + c)
    }
}

/// A frame drained from the ring. Owns its buffers; nothing aliases the
/// shared region once it is returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_id: i32,
    pub image: Image,
    pub detections: Detections,
    /// Set when the image could not be read and a zero-filled placeholder
    /// was substituted.
    pub degraded: bool,
}

impl Frame {
    pub fn into_parts(self) -> (Image, Detections, i32) {
        (self.image, self.detections, self.frame_id)
    }
}
