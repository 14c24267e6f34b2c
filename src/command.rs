//! Timing controller command definitions
//!
//! This module defines the opcode table of the panel's on-board timing
//! controller (TCon). Every command is a short frame sent with chip-select
//! asserted:
//!
//! ```text
//! simple:        [opcode, subcode, slot]
//! parametrized:  [opcode, subcode, slot, len, payload...]
//! image data:    [0x20, init, 0x00, len, payload...]
//! ```
//!
//! The opcodes are fixed by the vendor protocol and are not configurable.
//!
//! ## Example
//!
//! ```
//! use pd_eink::command::{self, Transition};
//!
//! assert_eq!(command::ERASE, (0x20, 0x0E));
//! assert_eq!(Transition::Flashless.opcode(), 0x85);
//! ```

// Frame opcodes

/// Opcode shared by erase, image upload and all ROI commands (0x20)
pub const IMAGE_OPCODE: u8 = 0x20;

/// Erase command (0x20, 0x0E)
///
/// Clears the display memory. Takes up to the long timeout to complete.
pub const ERASE: (u8, u8) = (IMAGE_OPCODE, 0x0E);

/// Subcode sent with every display update transition (0x01)
pub const UPDATE_SUBCODE: u8 = 0x01;

// Parametrized subcodes (opcode 0x20)

/// Set region of interest (0x0A)
///
/// Requires 8 bytes: [x_min, x_max, y_min, y_max], each big-endian u16.
pub const SET_ROI: u8 = 0x0A;

/// Fill the region of interest with a fixed value (0x0B)
///
/// Requires 1 byte: 0x00 or 0xFF.
pub const FILL: u8 = 0x0B;

/// Copy the region of interest from another image slot (0x0C)
///
/// Requires 1 byte: source slot.
pub const COPY_SLOT: u8 = 0x0C;

/// Reset the image data pointer before an upload (0x0D)
///
/// Sent as a simple 3-byte frame; the controller answers with a status.
pub const RESET_DATA_POINTER: u8 = 0x0D;

// Image data

/// Init byte of an image data packet (0x01)
pub const IMAGE_DATA_INIT: u8 = 0x01;

/// Largest payload a single frame can carry (length is one byte)
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Default payload size of a full-frame image packet
pub const DEFAULT_PACKET_LENGTH: u8 = 40;

/// Display update transition
///
/// Each transition is sent as a simple command with [`UPDATE_SUBCODE`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Transition {
    /// Full refresh with the visible flash cycle (0x24)
    #[default]
    Full = 0x24,
    /// Refresh without the flash cycle (0x85)
    ///
    /// Faster, at the cost of some ghosting.
    Flashless = 0x85,
    /// Flashless refresh with inverted colors (0x86)
    FlashlessInverted = 0x86,
}

impl Transition {
    /// Opcode byte for this transition
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// Hardware image slot targeted by copy operations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Slot {
    /// The most recently used slot
    #[default]
    Last,
    /// A specific slot index
    Index(u8),
}

impl Slot {
    /// Wire encoding of the slot (`Last` is 0xFF)
    pub fn byte(self) -> u8 {
        match self {
            Self::Last => 0xFF,
            Self::Index(index) => index,
        }
    }
}
