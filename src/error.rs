//! Error types for the driver
//!
//! This module defines error types for configuration building ([`BuilderError`])
//! and display operations ([`Error`]).
//!
//! ## Error Types
//!
//! - [`BuilderError`] - Errors during configuration or image construction
//! - [`Error`] - Runtime errors during display operations
//! - [`InterfaceError`](crate::interface::InterfaceError) - Low-level hardware communication errors
//!
//! Protocol-level failures (rejected packets, timeouts on the BUSY line) are
//! not errors: they are logged and reported as `false` results, because the
//! next update usually recovers from a missed one.
//!
//! ## Example
//!
//! ```
//! use pd_eink::{Builder, BuilderError, Dimensions};
//!
//! // Missing dimensions
//! let result = Builder::new().build();
//! assert!(matches!(result, Err(BuilderError::MissingDimensions)));
//!
//! // Invalid dimensions
//! let result = Dimensions::new(401, 300); // Not byte-aligned
//! assert!(result.is_err());
//! ```

use crate::frame::PayloadTooLong;
use crate::interface::PanelInterface;

/// Largest width or height accepted by the driver
///
/// Keeps ROI bounds (`x + w`, `y + h`) inside a u16.
pub const MAX_DIMENSION: u16 = 0x7FFF;

/// Errors that can occur when interacting with the display
///
/// Generic over the interface type to preserve the specific error type.
/// This allows error handling code to match on the underlying hardware error.
pub enum Error<I: PanelInterface> {
    /// Interface error (SPI/GPIO)
    ///
    /// Wraps the underlying hardware error from the [`PanelInterface`] implementation.
    Interface(I::Error),
    /// Region of interest is empty or starts outside the panel
    InvalidRegion {
        /// X coordinate
        x: u16,
        /// Y coordinate
        y: u16,
        /// Width
        w: u16,
        /// Height
        h: u16,
    },
    /// Buffer is too small for the transfer
    BufferTooSmall {
        /// Required buffer size in bytes
        required: usize,
        /// Provided buffer size in bytes
        provided: usize,
    },
    /// Packet length is zero or does not fit the one-byte length field
    InvalidPacketLength(u16),
    /// Command payload does not fit the one-byte length field
    PayloadTooLong {
        /// Provided payload length in bytes
        provided: usize,
    },
}

impl<I: PanelInterface> From<PayloadTooLong> for Error<I> {
    fn from(err: PayloadTooLong) -> Self {
        Self::PayloadTooLong {
            provided: err.provided,
        }
    }
}

impl<I: PanelInterface> core::fmt::Debug for Error<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Interface(e) => f.debug_tuple("Interface").field(e).finish(),
            Self::InvalidRegion { x, y, w, h } => f
                .debug_struct("InvalidRegion")
                .field("x", x)
                .field("y", y)
                .field("w", w)
                .field("h", h)
                .finish(),
            Self::BufferTooSmall { required, provided } => f
                .debug_struct("BufferTooSmall")
                .field("required", required)
                .field("provided", provided)
                .finish(),
            Self::InvalidPacketLength(len) => {
                f.debug_tuple("InvalidPacketLength").field(len).finish()
            }
            Self::PayloadTooLong { provided } => f
                .debug_struct("PayloadTooLong")
                .field("provided", provided)
                .finish(),
        }
    }
}

impl<I: PanelInterface> core::fmt::Display for Error<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Interface(_) => write!(f, "Interface error"),
            Self::InvalidRegion { x, y, w, h } => {
                write!(f, "Invalid region: x={x}, y={y}, w={w}, h={h}")
            }
            Self::BufferTooSmall { required, provided } => {
                write!(
                    f,
                    "Buffer too small: required {required} bytes, provided {provided}"
                )
            }
            Self::InvalidPacketLength(len) => write!(f, "Invalid packet length: {len}"),
            Self::PayloadTooLong { provided } => {
                write!(f, "Payload too long: {provided} bytes (max 255)")
            }
        }
    }
}

impl<I: PanelInterface> core::error::Error for Error<I> {}

/// Errors that can occur when building configuration or images
#[derive(Debug, PartialEq, Eq)]
pub enum BuilderError {
    /// Dimensions were not specified
    ///
    /// [`Builder::dimensions()`](crate::config::Builder::dimensions) must be called before building.
    MissingDimensions,
    /// Invalid dimensions provided
    ///
    /// See [`Dimensions::new()`](crate::config::Dimensions::new) for constraints.
    InvalidDimensions {
        /// Width requested
        width: u16,
        /// Height requested
        height: u16,
    },
    /// Packet length must be non-zero
    InvalidPacketLength,
    /// Source bitmap is shorter than its dimensions require
    BufferTooSmall {
        /// Required buffer size in bytes
        required: usize,
        /// Provided buffer size in bytes
        provided: usize,
    },
}

impl core::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingDimensions => write!(f, "Dimensions must be specified"),
            Self::InvalidDimensions { width, height } => write!(
                f,
                "Invalid dimensions {width}x{height} (max {MAX_DIMENSION}, width must be multiple of 8)"
            ),
            Self::InvalidPacketLength => write!(f, "Packet length must be non-zero"),
            Self::BufferTooSmall { required, provided } => write!(
                f,
                "Bitmap too small: required {required} bytes, provided {provided}"
            ),
        }
    }
}

impl core::error::Error for BuilderError {}
