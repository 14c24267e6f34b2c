//! Panel framebuffers and bit-image sources
//!
//! [`PanelImage`] is the full-frame buffer the timing controller expects: a
//! 16-byte header followed by row-major pixel data, 8 pixels per byte, MSB
//! first. [`BitImage`] wraps an XBM-style bitmap (LSB first) and keeps both a
//! bit-reversed copy and its complement ready for sending.
//!
//! ## Buffer Layout
//!
//! | Offset | Content |
//! |--------|---------|
//! | 0      | Panel type (`0x33`) |
//! | 1..3   | X resolution, big-endian |
//! | 3..5   | Y resolution, big-endian |
//! | 5      | Color depth (`0x01`) |
//! | 6      | Pixel data format (`0x00`, raw) |
//! | 7..16  | Reserved (zero) |
//! | 16..   | Pixels |
//!
//! ## Example
//!
//! ```
//! use pd_eink::{BitImage, Color, Dimensions, PanelImage};
//!
//! let mut image = PanelImage::new(Dimensions::default());
//! image.clear(Color::White);
//! assert_eq!(image.length(), 16 + 400 * 300 / 8);
//!
//! // 16x2 XBM glyph
//! let glyph = match BitImage::new(&[0x01, 0x80, 0xFF, 0x00], 16, 2) {
//!     Ok(glyph) => glyph,
//!     Err(_) => return,
//! };
//! image.add_bit_image(&glyph, 8, 4);
//! assert_eq!(image.pixels()[4 * 50 + 1], 0x80);
//! ```

use alloc::vec;
use alloc::vec::Vec;

use crate::color::Color;
use crate::config::{Dimensions, Polarity};
use crate::error::BuilderError;

/// Length of the panel image header in bytes
pub const HEADER_LEN: usize = 16;

/// Panel type identifier of the 4.41" panel
pub const PANEL_TYPE: u8 = 0x33;
/// One bit per pixel
pub const COLOR_DEPTH: u8 = 0x01;
/// Raw (unoptimized) pixel data
pub const PIXEL_FORMAT_RAW: u8 = 0x00;

/// Build the 16-byte image header for a panel of the given size
pub fn header(dimensions: Dimensions) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = PANEL_TYPE;
    header[1..3].copy_from_slice(&dimensions.width.to_be_bytes());
    header[3..5].copy_from_slice(&dimensions.height.to_be_bytes());
    header[5] = COLOR_DEPTH;
    header[6] = PIXEL_FORMAT_RAW;
    header
}

/// Reverse the bit order of a byte (XBM LSB-first to panel MSB-first)
#[inline]
pub fn reverse_bits(byte: u8) -> u8 {
    byte.reverse_bits()
}

/// Full-frame image with header
///
/// The header is written once at construction and never changes, so
/// [`as_bytes`](Self::as_bytes) can be handed to
/// [`Display::send_image`](crate::display::Display::send_image) directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelImage {
    dimensions: Dimensions,
    buffer: Vec<u8>,
}

impl PanelImage {
    /// Create a black image with a header for `dimensions`
    pub fn new(dimensions: Dimensions) -> Self {
        let mut buffer = vec![Color::Black.buffer_byte(); HEADER_LEN + dimensions.buffer_size()];
        buffer[..HEADER_LEN].copy_from_slice(&header(dimensions));
        Self { dimensions, buffer }
    }

    /// Fill every pixel with `color`
    pub fn clear(&mut self, color: Color) {
        self.pixels_mut().fill(color.buffer_byte());
    }

    /// Copy a bit image into the frame at pixel offset (`x`, `y`)
    ///
    /// Copying is byte-granular: `x` is rounded down to a multiple of 8.
    /// Source bytes that would land right of the panel edge or below the
    /// last row are dropped. The normal view of the bit image is used.
    pub fn add_bit_image(&mut self, image: &BitImage, x: u16, y: u16) {
        let width = self.dimensions.width as usize;
        let height = self.dimensions.height as usize;
        let (x, y) = (x as usize, y as usize);
        let row_bytes = image.width() as usize / 8;
        let src = image.normal();
        let pixels = self.pixels_mut();

        for row in 0..image.height() as usize {
            if y + row >= height {
                break;
            }
            let src_start = row * row_bytes;
            let dst_start = ((y + row) * width + x) / 8;
            for col in 0..row_bytes {
                if x + col * 8 >= width {
                    break;
                }
                pixels[dst_start + col] = src[src_start + col];
            }
        }
    }

    /// Set a single pixel; coordinates outside the panel are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        let width = u32::from(self.dimensions.width);
        if x >= width || y >= u32::from(self.dimensions.height) {
            return;
        }
        let index = ((y * width + x) / 8) as usize;
        let bit = 0x80 >> (x % 8);
        let pixels = self.pixels_mut();
        if color.is_set() {
            pixels[index] |= bit;
        } else {
            pixels[index] &= !bit;
        }
    }

    /// Read back a single pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let width = u32::from(self.dimensions.width);
        if x >= width || y >= u32::from(self.dimensions.height) {
            return None;
        }
        let byte = self.pixels()[((y * width + x) / 8) as usize];
        if byte & (0x80 >> (x % 8)) != 0 {
            Some(Color::White)
        } else {
            Some(Color::Black)
        }
    }

    /// Header and pixels as sent to the panel
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// The 16-byte header
    pub fn header(&self) -> &[u8] {
        &self.buffer[..HEADER_LEN]
    }

    /// Pixel bytes without the header
    pub fn pixels(&self) -> &[u8] {
        &self.buffer[HEADER_LEN..]
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[HEADER_LEN..]
    }

    /// Total length in bytes: `16 + width * height / 8`
    pub fn length(&self) -> usize {
        self.buffer.len()
    }

    /// Width in pixels
    pub fn width(&self) -> u16 {
        self.dimensions.width
    }

    /// Height in pixels
    pub fn height(&self) -> u16 {
        self.dimensions.height
    }

    /// Image dimensions
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

/// XBM-style bitmap converted to panel bit order
///
/// Both the normal and the inverted view are computed once at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitImage {
    dimensions: Dimensions,
    normal: Vec<u8>,
    inverted: Vec<u8>,
}

impl BitImage {
    /// Convert an XBM bitmap of `width` x `height` pixels
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidDimensions` if the dimensions are not
    /// valid panel dimensions and `BuilderError::BufferTooSmall` if `source`
    /// holds fewer than `width * height / 8` bytes.
    pub fn new(source: &[u8], width: u16, height: u16) -> Result<Self, BuilderError> {
        let dimensions = Dimensions::new(width, height)?;
        let required = dimensions.buffer_size();
        if source.len() < required {
            return Err(BuilderError::BufferTooSmall {
                required,
                provided: source.len(),
            });
        }

        let normal: Vec<u8> = source[..required].iter().map(|b| reverse_bits(*b)).collect();
        let inverted = normal.iter().map(|b| !b).collect();
        Ok(Self {
            dimensions,
            normal,
            inverted,
        })
    }

    /// Bit-reversed source bytes
    pub fn normal(&self) -> &[u8] {
        &self.normal
    }

    /// Complement of [`normal`](Self::normal)
    pub fn inverted(&self) -> &[u8] {
        &self.inverted
    }

    /// The view to send to a panel with the given polarity
    pub fn bits(&self, polarity: Polarity) -> &[u8] {
        if polarity.is_inverted() {
            &self.inverted
        } else {
            &self.normal
        }
    }

    /// The opposite view of [`bits`](Self::bits)
    pub fn inverse(&self, polarity: Polarity) -> &[u8] {
        if polarity.is_inverted() {
            &self.normal
        } else {
            &self.inverted
        }
    }

    /// Nominal length including a panel header: `16 + width * height / 8`
    ///
    /// Only the pixel bytes are stored; this is the size the image takes in
    /// a [`PanelImage`]-style transfer.
    pub fn length(&self) -> usize {
        HEADER_LEN + self.dimensions.buffer_size()
    }

    /// Width in pixels
    pub fn width(&self) -> u16 {
        self.dimensions.width
    }

    /// Height in pixels
    pub fn height(&self) -> u16 {
        self.dimensions.height
    }
}
