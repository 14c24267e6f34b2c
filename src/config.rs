//! Display configuration types and builder

use crate::command::DEFAULT_PACKET_LENGTH;
pub use crate::error::{BuilderError, MAX_DIMENSION};
use crate::timing::Timeouts;

/// Width of the 4.41" panel in pixels
pub const DEFAULT_WIDTH: u16 = 400;
/// Height of the 4.41" panel in pixels
pub const DEFAULT_HEIGHT: u16 = 300;

/// Display dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
}

impl Dimensions {
    /// Create new dimensions with validation
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidDimensions` if:
    /// - width or height is zero
    /// - width or height exceeds [`MAX_DIMENSION`]
    /// - width % 8 != 0 (rows must be byte-aligned)
    pub fn new(width: u16, height: u16) -> Result<Self, BuilderError> {
        if height == 0 || height > MAX_DIMENSION {
            return Err(BuilderError::InvalidDimensions { width, height });
        }
        if width == 0 || width > MAX_DIMENSION || width % 8 != 0 {
            return Err(BuilderError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// Calculate the pixel buffer size in bytes (header excluded)
    pub fn buffer_size(&self) -> usize {
        (self.width as usize * self.height as usize) / 8
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Pixel polarity convention of the panel
///
/// Panels are built either with "0 = black" or with "1 = black". The
/// polarity selects which [`BitImage`](crate::image::BitImage) view is sent
/// and whether fill values are inverted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Native convention
    #[default]
    Normal,
    /// Inverted convention
    Inverted,
}

impl Polarity {
    /// Whether values must be complemented
    pub fn is_inverted(self) -> bool {
        self == Self::Inverted
    }
}

/// How per-packet results are combined into the result of a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulatePolicy {
    /// Every packet must succeed
    All,
    /// At least one packet must succeed
    Any,
}

impl AccumulatePolicy {
    /// Result of a transfer before any packet was sent
    pub fn initial(self) -> bool {
        match self {
            Self::All => true,
            Self::Any => false,
        }
    }

    /// Fold one packet result into the running result
    pub fn combine(self, acc: bool, packet_ok: bool) -> bool {
        match self {
            Self::All => acc && packet_ok,
            Self::Any => acc || packet_ok,
        }
    }
}

/// Display configuration
///
/// This struct holds all configurable parameters of the driver.
/// Use `Builder` to create a Config.
#[derive(Clone, Debug)]
pub struct Config {
    /// Display dimensions
    pub dimensions: Dimensions,
    /// Pixel polarity convention
    pub polarity: Polarity,
    /// Timeout classes and polling intervals
    pub timeouts: Timeouts,
    /// Packet length used for full-frame uploads
    pub packet_length: u8,
    /// Result accumulation for full-frame uploads
    pub image_policy: AccumulatePolicy,
    /// Result accumulation for ROI uploads
    pub roi_policy: AccumulatePolicy,
    /// Extra passes of a failed ROI upload
    pub roi_transfer_retries: u8,
    /// Extra sends of a rejected image packet
    pub packet_retries: u8,
    /// Extra status reads while the controller is not ready
    pub response_retries: u8,
    /// Extra data pointer resets after a length error
    pub reset_retries: u8,
    /// Init byte of the first image packet after power-up
    pub first_transfer_init: u8,
}

/// Builder for constructing display configuration
///
/// # Example
///
/// ```rust,no_run
/// use pd_eink::{AccumulatePolicy, Builder, Dimensions, Polarity};
///
/// let dims = match Dimensions::new(400, 300) {
///     Ok(dims) => dims,
///     Err(_) => return,
/// };
/// let config = match Builder::new()
///     .dimensions(dims)
///     .polarity(Polarity::Inverted)
///     .roi_policy(AccumulatePolicy::All)
///     .build()
/// {
///     Ok(config) => config,
///     Err(_) => return,
/// };
/// let _ = config;
/// ```
#[must_use]
pub struct Builder {
    /// Display dimensions (required)
    dimensions: Option<Dimensions>,
    /// Pixel polarity convention
    polarity: Polarity,
    /// Timeout classes and polling intervals
    timeouts: Timeouts,
    /// Packet length used for full-frame uploads
    packet_length: u8,
    /// Result accumulation for full-frame uploads
    image_policy: AccumulatePolicy,
    /// Result accumulation for ROI uploads
    roi_policy: AccumulatePolicy,
    /// Extra passes of a failed ROI upload
    roi_transfer_retries: u8,
    /// Extra sends of a rejected image packet
    packet_retries: u8,
    /// Extra status reads while the controller is not ready
    response_retries: u8,
    /// Extra data pointer resets after a length error
    reset_retries: u8,
    /// Init byte of the first image packet after power-up
    first_transfer_init: u8,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            dimensions: None,
            polarity: Polarity::Normal,
            timeouts: Timeouts::default(),
            packet_length: DEFAULT_PACKET_LENGTH,
            // Full-frame uploads need every packet, ROI uploads any one
            image_policy: AccumulatePolicy::All,
            roi_policy: AccumulatePolicy::Any,
            roi_transfer_retries: 1,
            packet_retries: 3,
            response_retries: 2,
            reset_retries: 2,
            first_transfer_init: crate::command::IMAGE_DATA_INIT,
        }
    }
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set display dimensions (required)
    pub fn dimensions(mut self, dims: Dimensions) -> Self {
        self.dimensions = Some(dims);
        self
    }

    /// Set pixel polarity convention
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Set all timeouts at once
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the packet length used for full-frame uploads
    pub fn packet_length(mut self, value: u8) -> Self {
        self.packet_length = value;
        self
    }

    /// Set result accumulation for full-frame uploads
    pub fn image_policy(mut self, policy: AccumulatePolicy) -> Self {
        self.image_policy = policy;
        self
    }

    /// Set result accumulation for ROI uploads
    pub fn roi_policy(mut self, policy: AccumulatePolicy) -> Self {
        self.roi_policy = policy;
        self
    }

    /// Set how many times a failed ROI upload is repeated
    pub fn roi_transfer_retries(mut self, value: u8) -> Self {
        self.roi_transfer_retries = value;
        self
    }

    /// Set how many times a rejected image packet is resent
    pub fn packet_retries(mut self, value: u8) -> Self {
        self.packet_retries = value;
        self
    }

    /// Set how many extra status reads are made while the controller is not ready
    pub fn response_retries(mut self, value: u8) -> Self {
        self.response_retries = value;
        self
    }

    /// Set how many extra data pointer resets follow a length error
    pub fn reset_retries(mut self, value: u8) -> Self {
        self.reset_retries = value;
        self
    }

    /// Set the init byte of the first image packet after power-up
    pub fn first_transfer_init(mut self, value: u8) -> Self {
        self.first_transfer_init = value;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::MissingDimensions` if dimensions were not set
    /// and `BuilderError::InvalidPacketLength` if the packet length is zero.
    pub fn build(self) -> Result<Config, BuilderError> {
        if self.packet_length == 0 {
            return Err(BuilderError::InvalidPacketLength);
        }
        Ok(Config {
            dimensions: self.dimensions.ok_or(BuilderError::MissingDimensions)?,
            polarity: self.polarity,
            timeouts: self.timeouts,
            packet_length: self.packet_length,
            image_policy: self.image_policy,
            roi_policy: self.roi_policy,
            roi_transfer_retries: self.roi_transfer_retries,
            packet_retries: self.packet_retries,
            response_retries: self.response_retries,
            reset_retries: self.reset_retries,
            first_transfer_init: self.first_transfer_init,
        })
    }
}
