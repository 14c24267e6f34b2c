//! Color types for monochrome e-paper panels
//!
//! This module defines the [`Color`] enum and how it maps onto the two byte
//! encodings the driver deals with:
//!
//! | Color | Framebuffer byte | Fill payload (normal) | Fill payload (inverted) |
//! |-------|------------------|-----------------------|-------------------------|
//! | Black | 0x00             | 0xFF                  | 0x00                    |
//! | White | 0xFF             | 0x00                  | 0xFF                    |
//!
//! The fill command of the timing controller uses the opposite convention of
//! the framebuffer, which is why the two columns differ.
//!
//! ## Example
//!
//! ```
//! use pd_eink::{Color, Polarity};
//!
//! assert_eq!(Color::White.buffer_byte(), 0xFF);
//! assert_eq!(Color::White.fill_byte(Polarity::Normal), 0x00);
//! assert_eq!(Color::White.fill_byte(Polarity::Inverted), 0xFF);
//! ```

use crate::config::Polarity;

/// Colors supported by monochrome panels
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Color {
    /// Black pixels
    Black,
    /// White pixels
    White,
}

#[cfg(feature = "graphics")]
impl embedded_graphics_core::prelude::PixelColor for Color {
    type Raw = embedded_graphics_core::pixelcolor::raw::RawU1;
}

#[cfg(feature = "graphics")]
impl From<embedded_graphics_core::pixelcolor::BinaryColor> for Color {
    fn from(color: embedded_graphics_core::pixelcolor::BinaryColor) -> Self {
        match color {
            embedded_graphics_core::pixelcolor::BinaryColor::Off => Self::Black,
            embedded_graphics_core::pixelcolor::BinaryColor::On => Self::White,
        }
    }
}

impl Color {
    /// Get the byte value for a framebuffer filled with this color
    ///
    /// ## Example
    ///
    /// ```
    /// use pd_eink::Color;
    ///
    /// assert_eq!(Color::Black.buffer_byte(), 0x00);
    /// assert_eq!(Color::White.buffer_byte(), 0xFF);
    /// ```
    pub fn buffer_byte(self) -> u8 {
        match self {
            Self::Black => 0x00,
            Self::White => 0xFF,
        }
    }

    /// Get the payload of the fixed-value fill command
    pub fn fill_byte(self, polarity: Polarity) -> u8 {
        let white = (self == Self::White) != polarity.is_inverted();
        if white { 0x00 } else { 0xFF }
    }

    /// Whether a framebuffer bit for this color is set
    pub fn is_set(self) -> bool {
        self == Self::White
    }
}
