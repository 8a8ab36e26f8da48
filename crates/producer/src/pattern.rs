use frame_ring::{Detection, Image, SlotLayout};

const BOX_SIZE: u32 = 64;

/// Synthetic camera: a diagonal gradient that scrolls one pixel per frame
/// and a single box drifting across it, reported as a detection.
pub struct TestPattern {
    layout: SlotLayout,
    frame: u64,
}

impl TestPattern {
    pub fn new(layout: SlotLayout) -> Self {
        Self { layout, frame: 0 }
    }

    /// Ids start at 1 and wrap around like `i32::wrapping_add`.
    pub fn next_frame(&mut self) -> (i32, Image, Vec<Detection>) {
        self.frame += 1;
        let frame_id = self.frame as i32;

        let image = self.render();
        let detections = self.boxes();
        (frame_id, image, detections)
    }

    fn box_origin(&self) -> (u32, u32) {
        let width = self.layout.width();
        let height = self.layout.height();
        let side = BOX_SIZE.min(width).min(height);
        let x = (self.frame % u64::from(width - side + 1)) as u32;
        let y = ((self.frame / 2) % u64::from(height - side + 1)) as u32;
        (x, y)
    }

    fn render(&self) -> Image {
        let (width, height, channels) = (
            self.layout.width(),
            self.layout.height(),
            self.layout.channels(),
        );
        let side = BOX_SIZE.min(width).min(height);
        let (bx, by) = self.box_origin();
        let shift = self.frame as usize;

        let mut data = Vec::with_capacity(self.layout.image_bytes());
        for y in 0..height {
            for x in 0..width {
                let inside = x >= bx && x < bx + side && y >= by && y < by + side;
                for c in 0..channels {
                    let value = if inside {
                        255
                    } else {
                        ((x as usize + y as usize + shift + c as usize * 85) % 256) as u8
                    };
                    data.push(value);
                }
            }
        }

        Image::new(width, height, channels, data)
    }

    fn boxes(&self) -> Vec<Detection> {
        let side = BOX_SIZE.min(self.layout.width()).min(self.layout.height());
        let (x, y) = self.box_origin();
        vec![Detection {
            class_id: 0,
            confidence: 0.9,
            x: x as i32,
            y: y as i32,
            width: side as i32,
            height: side as i32,
        }]
    }
}
