//! Hardware interface abstraction
//!
//! This module provides the [`PanelInterface`] trait and the [`Interface`] struct
//! for communicating with the panel's timing controller over SPI.
//!
//! ## Hardware Requirements
//!
//! The timing controller requires:
//! - SPI bus (MOSI + MISO + SCK), driven as a raw [`SpiBus`]
//! - 3 GPIO pins:
//!   - **EN**: Panel power enable (output, active low)
//!   - **CS**: Chip select (output, active low), gated by the driver
//!   - **BUSY**: Busy status (input, active low by default)
//!
//! Chip select is owned by the interface rather than by an `SpiDevice`
//! because the power-up sequence drives it together with EN.
//!
//! ## Example
//!
//! ```rust,no_run
//! use embedded_hal::delay::DelayNs;
//! use embedded_hal::digital::{InputPin, OutputPin};
//! use embedded_hal::spi::SpiBus;
//! use pd_eink::{Interface, PanelInterface};
//! # use core::convert::Infallible;
//! # struct MockSpi;
//! # impl embedded_hal::spi::ErrorType for MockSpi { type Error = Infallible; }
//! # impl SpiBus for MockSpi {
//! #     fn read(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn write(&mut self, _words: &[u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn transfer(&mut self, _read: &mut [u8], _write: &[u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn transfer_in_place(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # struct MockPin;
//! # impl embedded_hal::digital::ErrorType for MockPin { type Error = Infallible; }
//! # impl OutputPin for MockPin {
//! #     fn set_low(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl InputPin for MockPin {
//! #     fn is_high(&mut self) -> Result<bool, Self::Error> { Ok(true) }
//! #     fn is_low(&mut self) -> Result<bool, Self::Error> { Ok(false) }
//! # }
//! # struct MockDelay;
//! # impl DelayNs for MockDelay { fn delay_ns(&mut self, _ns: u32) {} }
//! # let mut delay = MockDelay;
//! // Create interface with SPI bus and GPIO pins
//! let mut interface = Interface::new(MockSpi, MockPin, MockPin, MockPin);
//!
//! // Bring the bus controller out of reset
//! let _ = interface.power_up(&mut delay);
//!
//! // Erase command
//! let _ = interface.send(&[0x20, 0x0E, 0x00]);
//!
//! // Clock out the two status bytes
//! let mut status = [0u8; 2];
//! let _ = interface.exchange(&mut status);
//! ```

use core::fmt::Debug;
use core::marker::PhantomData;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::SpiBus;

type InterfaceResult<T, E> = core::result::Result<T, E>;

/// Hold time of the first power-up phase (EN high, CS low)
pub const POWER_UP_RESET_MS: u32 = 5;
/// Hold time of the second power-up phase (EN low, CS low)
pub const POWER_UP_SETTLE_MS: u32 = 25;

/// Trait for hardware interface to the timing controller
///
/// This trait abstracts over different hardware implementations,
/// allowing the [`Display`](crate::display::Display) to work with any
/// SPI + GPIO implementation that satisfies embedded-hal traits.
///
/// ## Implementing
///
/// For most cases, use the provided [`Interface`] struct. Implement this
/// trait yourself for transports with their own chip-select handling.
pub trait PanelInterface {
    /// Error type for interface operations
    ///
    /// Must implement [`Debug`] for error reporting.
    type Error: Debug;

    /// Bring the bus controller out of reset
    ///
    /// The implementation must drive EN and CS through:
    /// 1. EN high, CS low, wait 5ms
    /// 2. EN low, CS low, wait 25ms
    /// 3. EN low, CS high (deselected)
    ///
    /// # Errors
    ///
    /// Returns an error if a pin cannot be driven.
    fn power_up<D: DelayNs>(&mut self, delay: &mut D) -> InterfaceResult<(), Self::Error>;

    /// Leave the bus idle and cut panel power
    ///
    /// # Errors
    ///
    /// Returns an error if a pin cannot be driven.
    fn power_down(&mut self) -> InterfaceResult<(), Self::Error>;

    /// Drive the panel power enable line
    ///
    /// EN is active low: `true` drives it low.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be driven.
    fn set_enabled(&mut self, enabled: bool) -> InterfaceResult<(), Self::Error>;

    /// Send a frame with chip select asserted
    ///
    /// Chip select must be released afterwards, also when the write fails.
    ///
    /// # Errors
    ///
    /// Returns an error if SPI communication or GPIO fails.
    fn send(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error>;

    /// Full-duplex exchange in place with chip select asserted
    ///
    /// # Errors
    ///
    /// Returns an error if SPI communication or GPIO fails.
    fn exchange(&mut self, data: &mut [u8]) -> InterfaceResult<(), Self::Error>;

    /// Read the BUSY line, already corrected for its polarity
    ///
    /// # Errors
    ///
    /// Returns an error if the pin cannot be read.
    fn busy_line_active(&mut self) -> InterfaceResult<bool, Self::Error>;
}

/// Errors that can occur at the interface level
///
/// Generic over SPI and GPIO error types.
#[derive(Debug)]
pub enum InterfaceError<SpiErr, PinErr> {
    /// SPI communication error
    Spi(SpiErr),
    /// GPIO pin error
    Pin(PinErr),
}

impl<SpiErr: Debug, PinErr: Debug> core::fmt::Display for InterfaceError<SpiErr, PinErr> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {e:?}"),
            Self::Pin(e) => write!(f, "Pin error: {e:?}"),
        }
    }
}

impl<SpiErr: Debug, PinErr: Debug> core::error::Error for InterfaceError<SpiErr, PinErr> {}

/// Hardware interface implementation for the timing controller
///
/// Implements [`PanelInterface`] for embedded-hal v1.0 SPI bus and GPIO traits.
///
/// ## Type Parameters
///
/// * `SPI` - SPI bus implementing [`SpiBus`]
/// * `EN` - Power enable pin implementing [`OutputPin`]
/// * `CS` - Chip select pin implementing [`OutputPin`]
/// * `BUSY` - Busy pin implementing [`InputPin`]
pub struct Interface<SPI, EN, CS, BUSY> {
    /// SPI bus for communication
    spi: SPI,
    /// Panel power enable (active low)
    en: EN,
    /// Chip select (active low)
    cs: CS,
    /// Busy status
    busy: BUSY,
    /// Busy pin polarity (true = active high, false = active low)
    busy_active_high: bool,
}

impl<SPI, EN, CS, BUSY> Interface<SPI, EN, CS, BUSY>
where
    SPI: SpiBus,
    EN: OutputPin,
    CS: OutputPin,
    BUSY: InputPin,
{
    /// Create a new Interface
    ///
    /// No pin is touched until [`PanelInterface::power_up`] runs.
    ///
    /// # Arguments
    ///
    /// * `spi` - SPI bus (must implement [`SpiBus`])
    /// * `en` - Power enable pin (output, active low)
    /// * `cs` - Chip select pin (output, active low)
    /// * `busy` - Busy pin (input, active low unless changed)
    pub fn new(spi: SPI, en: EN, cs: CS, busy: BUSY) -> Self {
        Self {
            spi,
            en,
            cs,
            busy,
            busy_active_high: false,
        }
    }

    /// Set busy pin polarity
    ///
    /// Default is active-low. Set to true for active-high wiring.
    pub fn set_busy_active_high(&mut self, active_high: bool) -> &mut Self {
        self.busy_active_high = active_high;
        self
    }

    /// Get busy pin polarity (true = active high)
    pub fn busy_active_high(&self) -> bool {
        self.busy_active_high
    }

    /// Give back the SPI bus and pins
    pub fn release(self) -> (SPI, EN, CS, BUSY) {
        (self.spi, self.en, self.cs, self.busy)
    }
}

impl<SPI, EN, CS, BUSY, PinErr> Interface<SPI, EN, CS, BUSY>
where
    SPI: SpiBus,
    EN: OutputPin<Error = PinErr>,
    CS: OutputPin<Error = PinErr>,
    BUSY: InputPin<Error = PinErr>,
{
    /// Run `op` with chip select asserted, releasing it on every path
    fn selected<F>(&mut self, op: F) -> InterfaceResult<(), InterfaceError<SPI::Error, PinErr>>
    where
        F: FnOnce(&mut SPI) -> Result<(), SPI::Error>,
    {
        self.cs.set_low().map_err(InterfaceError::Pin)?;
        let result = op(&mut self.spi).and_then(|()| self.spi.flush());
        self.cs.set_high().map_err(InterfaceError::Pin)?;
        result.map_err(InterfaceError::Spi)
    }
}

impl<SPI, EN, CS, BUSY, PinErr> PanelInterface for Interface<SPI, EN, CS, BUSY>
where
    SPI: SpiBus,
    SPI::Error: Debug,
    EN: OutputPin<Error = PinErr>,
    CS: OutputPin<Error = PinErr>,
    BUSY: InputPin<Error = PinErr>,
    PinErr: Debug,
{
    type Error = InterfaceError<SPI::Error, PinErr>;

    fn power_up<D: DelayNs>(&mut self, delay: &mut D) -> InterfaceResult<(), Self::Error> {
        self.en.set_high().map_err(InterfaceError::Pin)?;
        self.cs.set_low().map_err(InterfaceError::Pin)?;
        delay.delay_ms(POWER_UP_RESET_MS);

        self.en.set_low().map_err(InterfaceError::Pin)?;
        self.cs.set_low().map_err(InterfaceError::Pin)?;
        delay.delay_ms(POWER_UP_SETTLE_MS);

        self.cs.set_high().map_err(InterfaceError::Pin)?;
        Ok(())
    }

    fn power_down(&mut self) -> InterfaceResult<(), Self::Error> {
        self.spi.flush().map_err(InterfaceError::Spi)?;
        self.cs.set_high().map_err(InterfaceError::Pin)?;
        self.en.set_high().map_err(InterfaceError::Pin)?;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> InterfaceResult<(), Self::Error> {
        if enabled {
            self.en.set_low().map_err(InterfaceError::Pin)
        } else {
            self.en.set_high().map_err(InterfaceError::Pin)
        }
    }

    fn send(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error> {
        self.selected(|spi| spi.write(data))
    }

    fn exchange(&mut self, data: &mut [u8]) -> InterfaceResult<(), Self::Error> {
        self.selected(|spi| spi.transfer_in_place(data))
    }

    fn busy_line_active(&mut self) -> InterfaceResult<bool, Self::Error> {
        let level = if self.busy_active_high {
            self.busy.is_high()
        } else {
            self.busy.is_low()
        };
        level.map_err(InterfaceError::Pin)
    }
}

/// Placeholder for a pin that is not wired
///
/// Writes are ignored and reads always return low. The error type is a
/// parameter so the placeholder can sit next to real pins that share one
/// error type.
#[derive(Debug)]
pub struct NoPin<E = core::convert::Infallible> {
    _error: PhantomData<E>,
}

impl<E> NoPin<E> {
    /// Create a placeholder pin
    pub fn new() -> Self {
        Self {
            _error: PhantomData,
        }
    }
}

impl<E> Default for NoPin<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: digital::Error> digital::ErrorType for NoPin<E> {
    type Error = E;
}

impl<E: digital::Error> OutputPin for NoPin<E> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<E: digital::Error> InputPin for NoPin<E> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
