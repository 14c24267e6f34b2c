//! Pervasive Displays E-Paper Panel Driver
//!
//! A driver for the 4.41" Pervasive Displays e-paper panel (400x300) with an
//! on-panel timing controller, driven over a raw SPI bus with EN, CS and
//! BUSY lines.
//!
//! ## Features
//!
//! - `no_std` compatible
//! - `embedded-hal` v1.0 support
//! - `embedded-graphics` integration (with `graphics` feature)
//! - Full-frame and region-of-interest image transfers
//! - Fill and slot-copy commands
//! - Full and flashless refresh transitions
//! - Busy tracking that survives the controller's early "ready" reports
//!
//! ## Example
//!
//! ```rust,no_run
//! use embedded_hal::delay::DelayNs;
//! use pd_eink::{Builder, Color, Dimensions, Display, Interface, PanelImage};
//! # use core::convert::Infallible;
//! # use embedded_hal::digital::{InputPin, OutputPin};
//! # use embedded_hal::spi::SpiBus;
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
//! # struct MockClock;
//! # impl pd_eink::Clock for MockClock { fn now_us(&self) -> u64 { 0 } }
//! # let (spi, en, cs, busy) = (MockSpi, MockPin, MockPin, MockPin);
//! # let mut delay = MockDelay;
//! # let clock = MockClock;
//! let interface = Interface::new(spi, en, cs, busy);
//! let config = match Builder::new().dimensions(Dimensions::default()).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//!
//! let mut display = match Display::new(interface, config, clock, &mut delay) {
//!     Ok(display) => display,
//!     Err(_) => return,
//! };
//!
//! let mut image = PanelImage::new(Dimensions::default());
//! image.clear(Color::White);
//!
//! let _ = display.erase(&mut delay);
//! let _ = display.send_image(&image, &mut delay);
//! let _ = display.update();
//! let _ = display.wait_until_free(&mut delay);
//! ```

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

/// Color types for monochrome e-paper panels
pub mod color;
/// Timing controller command definitions
pub mod command;
/// Display configuration types and builder
pub mod config;
/// Core display operations
pub mod display;
/// Error types for the driver
pub mod error;
/// Command frame construction and image packetization
pub mod frame;
/// Hardware interface abstraction
pub mod interface;
/// Status responses of the timing controller
pub mod response;
/// Busy and timing model
pub mod timing;

/// Panel framebuffers and bit-image sources (requires `alloc` feature)
#[cfg(feature = "alloc")]
pub mod image;

/// Graphics support via embedded-graphics (requires `graphics` feature)
#[cfg(feature = "graphics")]
pub mod graphics;

pub use color::Color;
pub use command::{Slot, Transition};
pub use config::{AccumulatePolicy, Builder, Config, Dimensions, MAX_DIMENSION, Polarity};
pub use display::{Display, Region};
pub use error::{BuilderError, Error};
pub use interface::{Interface, InterfaceError, NoPin, PanelInterface};
pub use response::Status;
pub use timing::{BusyState, Clock, Timeouts, WaitOutcome};

#[cfg(feature = "std")]
pub use timing::StdClock;

#[cfg(feature = "alloc")]
pub use image::{BitImage, PanelImage};
