//! Busy and timing model
//!
//! The BUSY line of the timing controller is unreliable right after a display
//! update command: it may report "ready" before the refresh has actually
//! started. The driver therefore fuses the line with a software blackout
//! window measured from the last update command.
//!
//! ```text
//!             elapsed < guard                 -> SoftBlackout (busy)
//! line active, elapsed < upper_bound          -> HardwareBusy (busy)
//! line active, elapsed >= upper_bound         -> TimedOut     (not busy)
//! otherwise                                   -> Idle         (not busy)
//! ```
//!
//! ## Example
//!
//! ```
//! use pd_eink::timing::{BusyState, BusyTracker, Timeouts};
//!
//! let timeouts = Timeouts::default();
//! let mut tracker = BusyTracker::new();
//! tracker.record_update(1_000);
//!
//! // Inside the guard interval the line is ignored
//! assert_eq!(tracker.state(1_500, false, &timeouts), BusyState::SoftBlackout);
//! let after_guard = 1_000 + u64::from(timeouts.guard.to_micros());
//! assert_eq!(tracker.state(after_guard, false, &timeouts), BusyState::Idle);
//! ```

use fugit::MicrosDurationU32;

/// Monotonic time source in microseconds
///
/// Only differences between readings are used, so the epoch is arbitrary.
pub trait Clock {
    /// Current time in microseconds
    fn now_us(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// [`Clock`] backed by [`std::time::Instant`]
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Create a clock whose epoch is now
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Timeout classes and polling intervals
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Wait after an image data packet
    pub data_packet: MicrosDurationU32,
    /// Wait after a status exchange
    pub response: MicrosDurationU32,
    /// Wait after erase, ROI, fill, copy and data pointer reset
    pub long: MicrosDurationU32,
    /// Blackout after an update command during which the line is ignored
    pub guard: MicrosDurationU32,
    /// Longest time after an update during which an active line counts as busy
    pub upper_bound: MicrosDurationU32,
    /// Interval between BUSY line reads
    pub poll_interval: MicrosDurationU32,
    /// Pause before the first BUSY line read of a wait
    pub settle: MicrosDurationU32,
    /// Sleep between [`is_busy`](crate::Display::is_busy) checks in `wait_until_free`
    pub free_poll: MicrosDurationU32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            data_packet: MicrosDurationU32::millis(5),
            response: MicrosDurationU32::millis(5),
            long: MicrosDurationU32::millis(300),
            guard: MicrosDurationU32::millis(100),
            upper_bound: MicrosDurationU32::millis(1_500),
            poll_interval: MicrosDurationU32::micros(100),
            settle: MicrosDurationU32::millis(1),
            free_poll: MicrosDurationU32::micros(10),
        }
    }
}

/// Busy state of the panel as seen by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusyState {
    /// Line inactive and no recent update
    Idle,
    /// An update was issued less than the guard interval ago
    SoftBlackout,
    /// Line active within the upper bound after the last update
    HardwareBusy,
    /// Line active but the upper bound has passed; treated as ready
    TimedOut,
}

impl BusyState {
    /// Whether the next command must be held back
    pub fn is_busy(self) -> bool {
        matches!(self, Self::SoftBlackout | Self::HardwareBusy)
    }
}

/// Result of a bounded wait on the BUSY line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The line cleared in time
    Ready,
    /// The timeout elapsed with the line still active
    TimedOut,
}

/// Tracks the time of the last state-changing command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusyTracker {
    last_update_us: Option<u64>,
}

impl BusyTracker {
    /// Create a tracker with no update recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that an update command was sent at `now_us`
    pub fn record_update(&mut self, now_us: u64) {
        self.last_update_us = Some(now_us);
    }

    /// Time of the last update command, if any
    pub fn last_update(&self) -> Option<u64> {
        self.last_update_us
    }

    /// Microseconds since the last update (`None` if there never was one)
    pub fn elapsed(&self, now_us: u64) -> Option<u64> {
        self.last_update_us.map(|last| now_us.saturating_sub(last))
    }

    /// Combine the blackout window with the BUSY line reading
    pub fn state(&self, now_us: u64, line_active: bool, timeouts: &Timeouts) -> BusyState {
        let elapsed = self.elapsed(now_us);
        if elapsed.is_some_and(|e| e < u64::from(timeouts.guard.to_micros())) {
            return BusyState::SoftBlackout;
        }
        if !line_active {
            return BusyState::Idle;
        }
        if elapsed.is_some_and(|e| e < u64::from(timeouts.upper_bound.to_micros())) {
            BusyState::HardwareBusy
        } else {
            BusyState::TimedOut
        }
    }
}
