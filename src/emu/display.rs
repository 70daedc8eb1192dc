use super::{DISPLAY_X, DISPLAY_Y, Display};

/// 64x32 monochrome framebuffer.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pixels: Display<bool>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pixels: [[false; DISPLAY_X]; DISPLAY_Y],
        }
    }

    pub fn clear(&mut self) {
        self.pixels = [[false; DISPLAY_X]; DISPLAY_Y];
    }

    /// XORs an 8-pixel-wide sprite onto the buffer with its top-left corner at (x, y).
    ///
    /// Coordinates wrap around both edges. Returns true if any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut any_erased = false;

        for (row, sprite_byte) in sprite.iter().enumerate() {
            let py = (y + row) % DISPLAY_Y;

            for col in 0..8 {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let px = (x + col) % DISPLAY_X;
                    let pixel = &mut self.pixels[py][px];

                    any_erased |= *pixel;
                    // Flip the pixel
                    *pixel ^= true;
                }
            }
        }

        any_erased
    }

    /// Get the state of a pixel (true = on, false = off).
    pub fn pixel(&self, y: usize, x: usize) -> bool {
        self.pixels[y][x]
    }

    pub fn pixels(&self) -> &Display<bool> {
        &self.pixels
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().flatten().filter(|p| **p).count()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("lit", &self.lit_count())
            .finish()
    }
}
