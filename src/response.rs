//! Status responses of the timing controller
//!
//! After an image packet or a data pointer reset, the controller answers with
//! a two byte status word that is clocked out by a full-duplex exchange of two
//! zero bytes.
//!
//! | Bytes      | Status                      |
//! |------------|-----------------------------|
//! | `90 00`    | [`Status::Success`]         |
//! | `67 00`    | [`Status::LengthError`]     |
//! | `6A 00`    | [`Status::ParameterError`]  |
//! | `00 00`    | [`Status::NotReady`]        |
//! | `FF FF`    | [`Status::NotReady`]        |
//! | other      | [`Status::Error`]           |
//!
//! ## Example
//!
//! ```
//! use pd_eink::Status;
//!
//! assert_eq!(Status::classify([0x90, 0x00]), Status::Success);
//! assert_eq!(Status::classify([0x6A, 0x00]), Status::ParameterError);
//! assert!(Status::classify([0xFF, 0xFF]).is_not_ready());
//! ```

/// Length of a status response in bytes
pub const RESPONSE_LEN: usize = 2;

/// Status word reported after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Command accepted (0x9000)
    Success,
    /// Wrong length in the command frame (0x6700)
    LengthError,
    /// Invalid command parameter (0x6A00)
    ParameterError,
    /// The controller has not produced a status yet (0x0000 or 0xFFFF)
    NotReady,
    /// Any other status word
    Error(u16),
}

impl Status {
    /// Status word for success
    pub const SUCCESS: u16 = 0x9000;
    /// Status word for a length error
    pub const LENGTH_ERROR: u16 = 0x6700;
    /// Status word for a parameter error
    pub const PARAMETER_ERROR: u16 = 0x6A00;

    /// Classify the raw bytes of a status exchange
    pub fn classify(bytes: [u8; RESPONSE_LEN]) -> Self {
        match u16::from_be_bytes(bytes) {
            0x0000 | 0xFFFF => Self::NotReady,
            Self::SUCCESS => Self::Success,
            Self::LENGTH_ERROR => Self::LengthError,
            Self::PARAMETER_ERROR => Self::ParameterError,
            code => Self::Error(code),
        }
    }

    /// Status word as a big-endian u16
    ///
    /// `NotReady` reports 0x0000.
    pub fn code(self) -> u16 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::LengthError => Self::LENGTH_ERROR,
            Self::ParameterError => Self::PARAMETER_ERROR,
            Self::NotReady => 0x0000,
            Self::Error(code) => code,
        }
    }

    /// Whether the command succeeded
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Whether the read should be repeated before giving up
    pub fn is_not_ready(self) -> bool {
        self == Self::NotReady
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::LengthError => write!(f, "length error (0x6700)"),
            Self::ParameterError => write!(f, "parameter error (0x6A00)"),
            Self::NotReady => write!(f, "no response"),
            Self::Error(code) => write!(f, "error (0x{code:04X})"),
        }
    }
}
