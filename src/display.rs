//! Core display operations

use core::num::NonZeroU8;

use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;
use log::{debug, warn};

use crate::color::Color;
use crate::command::{
    COPY_SLOT, ERASE, FILL, IMAGE_DATA_INIT, IMAGE_OPCODE, RESET_DATA_POINTER, Slot, Transition,
    UPDATE_SUBCODE,
};
use crate::config::{Config, Dimensions};
use crate::error::Error;
use crate::frame::{Frame, Packets};
#[cfg(feature = "alloc")]
use crate::image::{BitImage, PanelImage};
use crate::interface::PanelInterface;
use crate::response::{RESPONSE_LEN, Status};
use crate::timing::{BusyState, BusyTracker, Clock, WaitOutcome};

type DisplayResult<I, T = ()> = core::result::Result<T, Error<I>>;

/// Pause between setting the ROI and a fill command
const FILL_SETTLE_MS: u32 = 1;
/// Pause between setting the ROI and a slot copy
const COPY_SETTLE_MS: u32 = 10;
/// ROI widths above this are sent in two packets per row
const ROI_SPLIT_WIDTH: u16 = 250;

/// Region of interest on the panel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// X coordinate in pixels (should be byte-aligned, i.e., multiple of 8)
    pub x: u16,
    /// Y coordinate in pixels
    pub y: u16,
    /// Width in pixels (should be multiple of 8)
    pub w: u16,
    /// Height in pixels
    pub h: u16,
}

impl Region {
    /// Create a new region
    #[allow(clippy::many_single_char_names)]
    pub fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }

    /// Region covering the whole panel
    pub fn full(dimensions: Dimensions) -> Self {
        Self::new(0, 0, dimensions.width, dimensions.height)
    }

    /// Calculate the buffer size in bytes for this region
    pub fn buffer_size(&self) -> usize {
        self.w as usize * self.h as usize / 8
    }
}

/// Owns the interface while the panel is powered
///
/// Dropping the guard powers the panel down. [`release`](Self::release)
/// powers down explicitly and hands the interface back.
struct Powered<I: PanelInterface>(Option<I>);

impl<I: PanelInterface> Powered<I> {
    fn get(&mut self) -> &mut I {
        match self.0.as_mut() {
            Some(interface) => interface,
            // Only `release` empties the guard, and it consumes it.
            None => unreachable!(),
        }
    }

    fn release(mut self) -> Result<I, I::Error> {
        match self.0.take() {
            Some(mut interface) => interface.power_down().map(|()| interface),
            None => unreachable!(),
        }
    }
}

impl<I: PanelInterface> Drop for Powered<I> {
    fn drop(&mut self) {
        if let Some(interface) = self.0.as_mut() {
            match interface.power_down() {
                Ok(()) => debug!("panel powered down on drop"),
                Err(_) => warn!("power down on drop failed"),
            }
        }
    }
}

/// Protocol driver for the panel's timing controller
///
/// Owns the [`PanelInterface`], the [`Config`] and a [`Clock`]. Every bus
/// operation takes `&mut self`, so a single owner drives the panel.
///
/// Protocol failures (rejected packets, BUSY timeouts) are logged and
/// reported as `false` results. `Err` is reserved for hardware faults and
/// invalid arguments.
///
/// Dropping the driver powers the panel down; [`release`](Self::release)
/// does the same and returns the interface.
pub struct Display<I, C>
where
    I: PanelInterface,
    C: Clock,
{
    /// Hardware interface, powered down on drop
    interface: Powered<I>,
    /// Display configuration
    config: Config,
    /// Time source for busy tracking and timeouts
    clock: C,
    /// Time of the last update command
    tracker: BusyTracker,
    /// Whether an image packet was sent since power-up
    transfer_initialized: bool,
}

impl<I, C> Display<I, C>
where
    I: PanelInterface,
    C: Clock,
{
    /// Power up the panel and create a new Display instance
    ///
    /// Runs the EN/CS power-up sequence (about 30ms).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interface`] if a pin cannot be driven.
    pub fn new<D: DelayNs>(
        mut interface: I,
        config: Config,
        clock: C,
        delay: &mut D,
    ) -> DisplayResult<I, Self> {
        interface.power_up(delay).map_err(Error::Interface)?;
        debug!(
            "panel powered up ({}x{})",
            config.dimensions.width, config.dimensions.height
        );
        Ok(Self {
            interface: Powered(Some(interface)),
            config,
            clock,
            tracker: BusyTracker::new(),
            transfer_initialized: false,
        })
    }

    /// Power down the panel and give back the interface and clock
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interface`] if the bus cannot be idled.
    pub fn release(self) -> DisplayResult<I, (I, C)> {
        let Self { interface, clock, .. } = self;
        let interface = interface.release().map_err(Error::Interface)?;
        debug!("panel powered down");
        Ok((interface, clock))
    }

    /// Turn panel power on (EN low)
    pub fn enable(&mut self) -> DisplayResult<I> {
        debug!("enable");
        self.interface.get().set_enabled(true).map_err(Error::Interface)
    }

    /// Turn panel power off (EN high)
    pub fn disable(&mut self) -> DisplayResult<I> {
        debug!("disable");
        self.interface.get().set_enabled(false).map_err(Error::Interface)
    }

    /// Erase the panel and wait for the controller
    pub fn erase<D: DelayNs>(&mut self, delay: &mut D) -> DisplayResult<I> {
        self.send_simple_command(ERASE.0, ERASE.1, 0x00, delay)
    }

    /// Refresh the panel with the full transition
    pub fn update(&mut self) -> DisplayResult<I> {
        self.update_with(Transition::Full)
    }

    /// Refresh the panel without the flash cycle
    pub fn update_flashless(&mut self) -> DisplayResult<I> {
        self.update_with(Transition::Flashless)
    }

    /// Refresh the panel without the flash cycle, inverting colors
    pub fn update_flashless_inverted(&mut self) -> DisplayResult<I> {
        self.update_with(Transition::FlashlessInverted)
    }

    /// Refresh the panel with the given transition
    ///
    /// Does not wait: the refresh runs in the background and
    /// [`is_busy`](Self::is_busy) reports busy for at least the guard
    /// interval afterwards.
    pub fn update_with(&mut self, transition: Transition) -> DisplayResult<I> {
        self.send_frame(&Frame::simple(transition.opcode(), UPDATE_SUBCODE, 0x00))?;
        self.tracker.record_update(self.clock.now_us());
        Ok(())
    }

    /// Send a 3-byte command frame `[opcode, subcode, slot]` and wait at the
    /// long timeout
    pub fn send_simple_command<D: DelayNs>(
        &mut self,
        opcode: u8,
        subcode: u8,
        slot: u8,
        delay: &mut D,
    ) -> DisplayResult<I> {
        self.send_frame(&Frame::simple(opcode, subcode, slot))?;
        self.wait_for_busy(self.config.timeouts.long, delay)?;
        Ok(())
    }

    /// Send a command with payload and wait at the long timeout
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLong`] if `payload` exceeds 255 bytes.
    pub fn send_parametrized_command<D: DelayNs>(
        &mut self,
        opcode: u8,
        subcode: u8,
        slot: u8,
        payload: &[u8],
        delay: &mut D,
    ) -> DisplayResult<I> {
        let frame = Frame::parametrized(opcode, subcode, slot, payload)?;
        self.send_frame(&frame)?;
        self.wait_for_busy(self.config.timeouts.long, delay)?;
        Ok(())
    }

    /// Set the region of interest for the next fill, copy or image transfer
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRegion` if:
    /// - w == 0 or h == 0
    /// - x + w > width or y + h > height (out of bounds)
    #[allow(clippy::many_single_char_names)]
    pub fn set_roi<D: DelayNs>(&mut self, region: Region, delay: &mut D) -> DisplayResult<I> {
        let Region { x, y, w, h } = region;
        if w == 0 || h == 0 {
            return Err(Error::InvalidRegion { x, y, w, h });
        }
        let dims = self.config.dimensions;
        if x.saturating_add(w) > dims.width || y.saturating_add(h) > dims.height {
            return Err(Error::InvalidRegion { x, y, w, h });
        }

        debug!("set ROI {w}x{h} @ ({x}, {y})");
        let frame = Frame::roi(x, x + w, y, y + h);
        self.send_frame(&frame)?;
        self.wait_for_busy(self.config.timeouts.long, delay)?;
        Ok(())
    }

    /// Fill the whole panel with a color
    pub fn fill<D: DelayNs>(&mut self, color: Color, delay: &mut D) -> DisplayResult<I> {
        self.fill_roi(Region::full(self.config.dimensions), color, delay)
    }

    /// Fill a region with a color
    pub fn fill_roi<D: DelayNs>(
        &mut self,
        region: Region,
        color: Color,
        delay: &mut D,
    ) -> DisplayResult<I> {
        self.set_roi(region, delay)?;
        delay.delay_ms(FILL_SETTLE_MS);
        let value = color.fill_byte(self.config.polarity);
        self.send_parametrized_command(IMAGE_OPCODE, FILL, 0x00, &[value], delay)
    }

    /// Copy a region from a stored image slot into the current frame
    pub fn copy_image_roi<D: DelayNs>(
        &mut self,
        region: Region,
        slot: Slot,
        delay: &mut D,
    ) -> DisplayResult<I> {
        self.set_roi(region, delay)?;
        delay.delay_ms(COPY_SETTLE_MS);
        self.send_parametrized_command(IMAGE_OPCODE, COPY_SLOT, 0x00, &[slot.byte()], delay)
    }

    /// Send a full-frame image, header included
    #[cfg(feature = "alloc")]
    pub fn send_image<D: DelayNs>(
        &mut self,
        image: &PanelImage,
        delay: &mut D,
    ) -> DisplayResult<I, bool> {
        self.send_image_buffer(image.as_bytes(), self.config.packet_length, delay)
    }

    /// Send the pixel bytes of a bit image as a full-frame transfer
    ///
    /// The view matching the configured polarity is sent.
    #[cfg(feature = "alloc")]
    pub fn send_bit_image<D: DelayNs>(
        &mut self,
        image: &BitImage,
        delay: &mut D,
    ) -> DisplayResult<I, bool> {
        let bits = image.bits(self.config.polarity);
        self.send_image_buffer(bits, self.config.packet_length, delay)
    }

    /// Send a bit image into the region at (`x`, `y`) with its own size
    #[cfg(feature = "alloc")]
    pub fn send_bit_image_roi<D: DelayNs>(
        &mut self,
        image: &BitImage,
        x: u16,
        y: u16,
        delay: &mut D,
    ) -> DisplayResult<I, bool> {
        let region = Region::new(x, y, image.width(), image.height());
        self.send_image_roi(image.bits(self.config.polarity), region, delay)
    }

    /// Send a raw buffer as a full-frame transfer
    ///
    /// Resets the controller's data pointer, then sends `len / packet_len`
    /// full packets followed by one remainder packet, which is sent even
    /// when empty. Packet results are combined with
    /// [`Config::image_policy`]; a failed packet does not stop the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacketLength`] if `packet_len` is zero.
    pub fn send_image_buffer<D: DelayNs>(
        &mut self,
        buffer: &[u8],
        packet_len: u8,
        delay: &mut D,
    ) -> DisplayResult<I, bool> {
        let packet_len = NonZeroU8::new(packet_len).ok_or(Error::InvalidPacketLength(0))?;

        if !self.reset_data_pointer(delay)? {
            warn!("data pointer reset failed, sending image anyway");
        }

        let packets = Packets::new(buffer, packet_len);
        debug!(
            "send image: {} bytes in {} packets of {}",
            buffer.len(),
            packets.len(),
            packet_len
        );

        let policy = self.config.image_policy;
        let mut written = policy.initial();
        for packet in packets {
            let sent = self.send_image_data_packet(packet, delay)?;
            written = policy.combine(written, sent);
        }
        if !written {
            warn!("image transfer failed");
        }
        Ok(written)
    }

    /// Send a buffer into a region of interest
    ///
    /// The height is clamped to the panel bottom. Rows wider than 250 pixels
    /// go out as two packets each; an empty remainder is skipped. Packet
    /// results are combined with [`Config::roi_policy`]. A failed transfer is
    /// repeated, ROI included, up to [`Config::roi_transfer_retries`] times.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRegion` if the region is empty or outside the panel
    /// - `Error::InvalidPacketLength` if the packet size exceeds 255 bytes
    /// - `Error::BufferTooSmall` if `buffer` is shorter than `w * h / 8`
    #[allow(clippy::many_single_char_names)]
    pub fn send_image_roi<D: DelayNs>(
        &mut self,
        buffer: &[u8],
        region: Region,
        delay: &mut D,
    ) -> DisplayResult<I, bool> {
        let Region { x, y, w, h } = region;
        let height = self.config.dimensions.height;
        if w == 0 || h == 0 || y >= height {
            return Err(Error::InvalidRegion { x, y, w, h });
        }
        let region = Region::new(x, y, w, h.min(height - y));

        let packet_len = if w > ROI_SPLIT_WIDTH { w / 2 } else { w };
        let packet_len = u8::try_from(packet_len)
            .ok()
            .and_then(NonZeroU8::new)
            .ok_or(Error::InvalidPacketLength(packet_len))?;

        let length = region.buffer_size();
        if buffer.len() < length {
            return Err(Error::BufferTooSmall {
                required: length,
                provided: buffer.len(),
            });
        }
        let data = &buffer[..length];

        let policy = self.config.roi_policy;
        let passes = u16::from(self.config.roi_transfer_retries) + 1;
        let mut written = false;
        for pass in 0..passes {
            if pass > 0 {
                warn!("ROI transfer failed, retrying ({pass}/{})", passes - 1);
            }
            self.set_roi(region, delay)?;
            debug!("send ROI image: {length} bytes, packets of {packet_len}");

            written = policy.initial();
            for packet in Packets::new(data, packet_len) {
                if packet.is_empty() {
                    continue;
                }
                let sent = self.send_image_data_packet(packet, delay)?;
                written = policy.combine(written, sent);
            }
            if written {
                break;
            }
        }
        Ok(written)
    }

    /// Send one image data packet and check the controller's answer
    ///
    /// A rejected packet is resent up to [`Config::packet_retries`] times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLong`] if `payload` exceeds 255 bytes.
    pub fn send_image_data_packet<D: DelayNs>(
        &mut self,
        payload: &[u8],
        delay: &mut D,
    ) -> DisplayResult<I, bool> {
        let init = if self.transfer_initialized {
            IMAGE_DATA_INIT
        } else {
            self.config.first_transfer_init
        };
        let frame = Frame::image_data(init, payload)?;
        self.transfer_initialized = true;

        let attempts = u16::from(self.config.packet_retries) + 1;
        for attempt in 1..=attempts {
            self.send_frame(&frame)?;
            self.wait_for_busy(self.config.timeouts.data_packet, delay)?;
            let status = self.read_response(delay)?;
            if status.is_success() {
                return Ok(true);
            }
            warn!(
                "image packet of {} bytes rejected: {status} (attempt {attempt}/{attempts})",
                payload.len()
            );
        }
        Ok(false)
    }

    /// Clock out the controller's status word
    ///
    /// While the controller has not answered (`00 00` or `FF FF`) the read
    /// is repeated up to [`Config::response_retries`] times; if it never
    /// answers, the last word is reported as [`Status::Error`].
    pub fn read_response<D: DelayNs>(&mut self, delay: &mut D) -> DisplayResult<I, Status> {
        let reads = u16::from(self.config.response_retries) + 1;
        let mut word = [0u8; RESPONSE_LEN];
        for read in 1..=reads {
            word = [0u8; RESPONSE_LEN];
            self.interface.get().exchange(&mut word).map_err(Error::Interface)?;
            self.wait_for_busy(self.config.timeouts.response, delay)?;

            let status = Status::classify(word);
            if status.is_not_ready() {
                debug!(
                    "no response yet ({:02X} {:02X}), read {read}/{reads}",
                    word[0], word[1]
                );
                continue;
            }
            if !status.is_success() {
                debug!("response: {status}");
                delay.delay_us(self.config.timeouts.settle.to_micros());
            }
            return Ok(status);
        }
        Ok(Status::Error(u16::from_be_bytes(word)))
    }

    /// Rewind the controller's image data pointer
    ///
    /// Repeated up to [`Config::reset_retries`] times while the controller
    /// answers with a length error. Any other answer counts as done.
    pub fn reset_data_pointer<D: DelayNs>(&mut self, delay: &mut D) -> DisplayResult<I, bool> {
        let attempts = u16::from(self.config.reset_retries) + 1;
        for attempt in 1..=attempts {
            self.send_simple_command(IMAGE_OPCODE, RESET_DATA_POINTER, 0x00, delay)?;
            if self.read_response(delay)? != Status::LengthError {
                return Ok(true);
            }
            warn!("data pointer reset rejected (attempt {attempt}/{attempts})");
        }
        Ok(false)
    }

    /// Whether the next command must be held back
    ///
    /// See [`busy_state`](Self::busy_state).
    pub fn is_busy(&mut self) -> DisplayResult<I, bool> {
        Ok(self.busy_state()?.is_busy())
    }

    /// Busy state from the blackout window and the BUSY line
    ///
    /// The line is not read while the blackout window is open.
    pub fn busy_state(&mut self) -> DisplayResult<I, BusyState> {
        let now = self.clock.now_us();
        let timeouts = &self.config.timeouts;
        if self.tracker.state(now, false, timeouts) == BusyState::SoftBlackout {
            return Ok(BusyState::SoftBlackout);
        }
        let line = self.interface.get().busy_line_active().map_err(Error::Interface)?;
        Ok(self.tracker.state(now, line, &self.config.timeouts))
    }

    /// Wait until the BUSY line clears or `timeout` has passed
    ///
    /// A timeout is logged and returned as [`WaitOutcome::TimedOut`].
    pub fn wait_for_busy<D: DelayNs>(
        &mut self,
        timeout: MicrosDurationU32,
        delay: &mut D,
    ) -> DisplayResult<I, WaitOutcome> {
        delay.delay_us(self.config.timeouts.settle.to_micros());
        let start = self.clock.now_us();
        while self.interface.get().busy_line_active().map_err(Error::Interface)? {
            let elapsed = self.clock.now_us().saturating_sub(start);
            if elapsed > u64::from(timeout.to_micros()) {
                warn!(
                    "busy timeout after {elapsed}us (limit {}us)",
                    timeout.to_micros()
                );
                return Ok(WaitOutcome::TimedOut);
            }
            delay.delay_us(self.config.timeouts.poll_interval.to_micros());
        }
        Ok(WaitOutcome::Ready)
    }

    /// Block until the controller is ready for the next command
    ///
    /// Waits on the BUSY line at the long timeout, then polls
    /// [`is_busy`](Self::is_busy) until the blackout window has passed.
    pub fn wait_until_free<D: DelayNs>(&mut self, delay: &mut D) -> DisplayResult<I> {
        self.wait_for_busy(self.config.timeouts.long, delay)?;
        while self.is_busy()? {
            delay.delay_us(self.config.timeouts.free_poll.to_micros());
        }
        Ok(())
    }

    /// Get display dimensions
    pub fn dimensions(&self) -> &Dimensions {
        &self.config.dimensions
    }

    /// Access the underlying configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send a frame to the display controller
    fn send_frame(&mut self, frame: &Frame) -> DisplayResult<I> {
        debug!("send {frame:?}");
        self.interface.get().send(frame.as_bytes()).map_err(Error::Interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccumulatePolicy, Builder, Polarity};
    use crate::timing::Timeouts;
    use alloc::collections::VecDeque;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    const OK: [u8; 2] = [0x90, 0x00];
    const LENGTH_ERR: [u8; 2] = [0x67, 0x00];
    const PARAM_ERR: [u8; 2] = [0x6A, 0x00];

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        PowerUp,
        PowerDown,
        Enabled(bool),
        Send(Vec<u8>),
        Exchange,
    }

    /// Shared state between a test and its mock interface
    #[derive(Default)]
    struct Bus {
        events: Vec<Event>,
        /// Scripted status words; success once exhausted
        responses: VecDeque<[u8; 2]>,
        /// Scripted BUSY readings; `busy_default` once exhausted
        busy: VecDeque<bool>,
        busy_default: bool,
        busy_reads: usize,
    }

    impl Bus {
        fn sent(&self) -> Vec<Vec<u8>> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Send(bytes) => Some(bytes.clone()),
                    _ => None,
                })
                .collect()
        }

        fn exchanges(&self) -> usize {
            self.events
                .iter()
                .filter(|event| **event == Event::Exchange)
                .count()
        }
    }

    #[derive(Debug, PartialEq)]
    struct MockError;

    struct MockInterface {
        bus: Rc<RefCell<Bus>>,
        fail_pins: bool,
    }

    impl PanelInterface for MockInterface {
        type Error = MockError;

        fn power_up<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Self::Error> {
            if self.fail_pins {
                return Err(MockError);
            }
            delay.delay_ms(30);
            self.bus.borrow_mut().events.push(Event::PowerUp);
            Ok(())
        }

        fn power_down(&mut self) -> Result<(), Self::Error> {
            self.bus.borrow_mut().events.push(Event::PowerDown);
            Ok(())
        }

        fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
            self.bus.borrow_mut().events.push(Event::Enabled(enabled));
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
            self.bus.borrow_mut().events.push(Event::Send(data.to_vec()));
            Ok(())
        }

        fn exchange(&mut self, data: &mut [u8]) -> Result<(), Self::Error> {
            let mut bus = self.bus.borrow_mut();
            let reply = bus.responses.pop_front().unwrap_or(OK);
            data.copy_from_slice(&reply);
            bus.events.push(Event::Exchange);
            Ok(())
        }

        fn busy_line_active(&mut self) -> Result<bool, Self::Error> {
            let mut bus = self.bus.borrow_mut();
            bus.busy_reads += 1;
            let default = bus.busy_default;
            Ok(bus.busy.pop_front().unwrap_or(default))
        }
    }

    struct MockClock(Rc<Cell<u64>>);

    impl Clock for MockClock {
        fn now_us(&self) -> u64 {
            self.0.get()
        }
    }

    /// Advances the shared clock instead of sleeping
    struct MockDelay(Rc<Cell<u64>>);

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + u64::from(ns / 1_000));
        }
    }

    struct Harness {
        display: Display<MockInterface, MockClock>,
        bus: Rc<RefCell<Bus>>,
        time: Rc<Cell<u64>>,
        delay: MockDelay,
    }

    impl Harness {
        fn new(config: Config) -> Self {
            let bus = Rc::new(RefCell::new(Bus::default()));
            let time = Rc::new(Cell::new(0));
            let mut delay = MockDelay(time.clone());
            let interface = MockInterface {
                bus: bus.clone(),
                fail_pins: false,
            };
            let display = Display::new(interface, config, MockClock(time.clone()), &mut delay)
                .unwrap();
            bus.borrow_mut().events.clear();
            Self {
                display,
                bus,
                time,
                delay,
            }
        }

        fn respond(&self, words: &[[u8; 2]]) {
            self.bus.borrow_mut().responses.extend(words.iter().copied());
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.bus.borrow().sent()
        }

        fn advance(&self, us: u64) {
            self.time.set(self.time.get() + us);
        }
    }

    fn builder() -> Builder {
        Builder::new().dimensions(Dimensions::default())
    }

    fn harness() -> Harness {
        Harness::new(builder().build().unwrap())
    }

    fn is_image_packet(frame: &[u8]) -> bool {
        frame.len() >= 4 && frame[0] == IMAGE_OPCODE && frame[1] == IMAGE_DATA_INIT
    }

    fn is_roi(frame: &[u8]) -> bool {
        frame.len() == 12 && frame[..2] == [IMAGE_OPCODE, 0x0A]
    }

    #[test]
    fn test_new_runs_power_up() {
        let bus = Rc::new(RefCell::new(Bus::default()));
        let time = Rc::new(Cell::new(0));
        let mut delay = MockDelay(time.clone());
        let interface = MockInterface {
            bus: bus.clone(),
            fail_pins: false,
        };
        let config = builder().build().unwrap();
        let display = Display::new(interface, config, MockClock(time.clone()), &mut delay);
        assert!(display.is_ok());
        assert_eq!(bus.borrow().events, vec![Event::PowerUp]);
        assert_eq!(time.get(), 30_000);
    }

    #[test]
    fn test_new_propagates_pin_error() {
        let time = Rc::new(Cell::new(0));
        let interface = MockInterface {
            bus: Rc::new(RefCell::new(Bus::default())),
            fail_pins: true,
        };
        let config = builder().build().unwrap();
        let result = Display::new(
            interface,
            config,
            MockClock(time.clone()),
            &mut MockDelay(time.clone()),
        );
        assert!(matches!(result, Err(Error::Interface(MockError))));
    }

    #[test]
    fn test_release_powers_down() {
        let h = harness();
        let bus = h.bus.clone();
        let (_interface, _clock) = h.display.release().unwrap();
        assert_eq!(bus.borrow().events, vec![Event::PowerDown]);
    }

    #[test]
    fn test_drop_powers_down() {
        let h = harness();
        let bus = h.bus.clone();
        drop(h);
        assert_eq!(bus.borrow().events, vec![Event::PowerDown]);
    }

    #[test]
    fn test_enable_disable() {
        let mut h = harness();
        h.display.enable().unwrap();
        h.display.disable().unwrap();
        assert_eq!(
            h.bus.borrow().events,
            vec![Event::Enabled(true), Event::Enabled(false)]
        );
    }

    #[test]
    fn test_erase_sends_frame_and_waits() {
        let mut h = harness();
        h.display.erase(&mut h.delay).unwrap();
        assert_eq!(h.sent(), vec![vec![0x20, 0x0E, 0x00]]);
        assert_eq!(h.time.get(), 30_000 + 1_000);
        assert_eq!(h.bus.borrow().busy_reads, 1);
    }

    #[test]
    fn test_update_frames_do_not_wait() {
        let mut h = harness();
        h.display.update().unwrap();
        h.display.update_flashless().unwrap();
        h.display.update_flashless_inverted().unwrap();
        assert_eq!(
            h.sent(),
            vec![
                vec![0x24, 0x01, 0x00],
                vec![0x85, 0x01, 0x00],
                vec![0x86, 0x01, 0x00]
            ]
        );
        assert_eq!(h.time.get(), 30_000);
        assert_eq!(h.bus.borrow().busy_reads, 0);
    }

    #[test]
    fn test_busy_blackout_after_update() {
        let mut h = harness();
        h.display.update().unwrap();

        // Line is not consulted inside the blackout window
        assert!(h.display.is_busy().unwrap());
        h.advance(99_999);
        assert_eq!(h.display.busy_state().unwrap(), BusyState::SoftBlackout);
        assert_eq!(h.bus.borrow().busy_reads, 0);

        h.advance(1);
        assert_eq!(h.display.busy_state().unwrap(), BusyState::Idle);

        h.bus.borrow_mut().busy.push_back(true);
        assert_eq!(h.display.busy_state().unwrap(), BusyState::HardwareBusy);

        h.advance(1_400_000);
        h.bus.borrow_mut().busy.push_back(true);
        assert_eq!(h.display.busy_state().unwrap(), BusyState::TimedOut);
    }

    #[test]
    fn test_busy_without_update_follows_upper_bound() {
        let mut h = harness();
        h.bus.borrow_mut().busy_default = true;
        assert_eq!(h.display.busy_state().unwrap(), BusyState::TimedOut);
        assert!(!h.display.is_busy().unwrap());
    }

    #[test]
    fn test_wait_for_busy_times_out() {
        let mut h = harness();
        h.bus.borrow_mut().busy_default = true;
        let timeout = MicrosDurationU32::millis(5);
        let outcome = h.display.wait_for_busy(timeout, &mut h.delay).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        let waited = h.time.get() - 30_000;
        assert!(waited > 6_000 && waited <= 6_200);
    }

    #[test]
    fn test_wait_for_busy_returns_when_line_clears() {
        let mut h = harness();
        h.bus.borrow_mut().busy.extend([true, true, true]);
        let timeout = MicrosDurationU32::millis(5);
        let outcome = h.display.wait_for_busy(timeout, &mut h.delay).unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(h.time.get() - 30_000, 1_000 + 3 * 100);
    }

    #[test]
    fn test_custom_long_timeout_bounds_erase() {
        let timeouts = Timeouts {
            long: MicrosDurationU32::millis(2),
            ..Timeouts::default()
        };
        let mut h = Harness::new(builder().timeouts(timeouts).build().unwrap());
        h.bus.borrow_mut().busy_default = true;
        h.display.erase(&mut h.delay).unwrap();
        let waited = h.time.get() - 30_000;
        assert!(waited > 3_000 && waited <= 3_200);
    }

    #[test]
    fn test_wait_until_free_outlasts_blackout() {
        let mut h = harness();
        h.display.update().unwrap();
        let updated_at = h.time.get();
        h.display.wait_until_free(&mut h.delay).unwrap();
        assert!(h.time.get() - updated_at >= 100_000);
        assert!(!h.display.is_busy().unwrap());
    }

    #[test]
    fn test_send_image_buffer_packet_count() {
        let mut h = harness();
        let buffer = vec![0xAAu8; 1000];
        assert!(h.display.send_image_buffer(&buffer, 40, &mut h.delay).unwrap());

        let sent = h.sent();
        assert_eq!(sent[0], vec![0x20, 0x0D, 0x00]);
        let packets: Vec<_> = sent[1..].iter().filter(|f| is_image_packet(f)).collect();
        assert_eq!(packets.len(), 26);
        assert_eq!(sent.len(), 27);
        assert_eq!(packets[0][3], 40);
        assert_eq!(packets[0].len(), 44);
        assert_eq!(*packets[25], vec![0x20, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_send_image_buffer_continues_after_failed_packet() {
        let mut h = harness();
        // Reset succeeds, first packet is rejected on every attempt
        h.respond(&[OK, PARAM_ERR, PARAM_ERR, PARAM_ERR, PARAM_ERR]);
        let buffer = vec![0u8; 100];
        assert!(!h.display.send_image_buffer(&buffer, 40, &mut h.delay).unwrap());

        let packets = h.sent().iter().filter(|f| is_image_packet(f)).count();
        assert_eq!(packets, 4 + 2);
    }

    #[test]
    fn test_send_image_buffer_any_policy() {
        let config = builder().image_policy(AccumulatePolicy::Any).build().unwrap();
        let mut h = Harness::new(config);
        h.respond(&[OK, PARAM_ERR, PARAM_ERR, PARAM_ERR, PARAM_ERR]);
        assert!(h.display.send_image_buffer(&[0u8; 100], 40, &mut h.delay).unwrap());
    }

    #[test]
    fn test_send_image_buffer_rejects_zero_packet_length() {
        let mut h = harness();
        let result = h.display.send_image_buffer(&[0u8; 8], 0, &mut h.delay);
        assert!(matches!(result, Err(Error::InvalidPacketLength(0))));
        assert!(h.sent().is_empty());
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_send_image_sends_header_and_pixels() {
        let mut h = harness();
        let mut image = PanelImage::new(Dimensions::default());
        image.clear(Color::White);
        assert!(h.display.send_image(&image, &mut h.delay).unwrap());

        let sent = h.sent();
        let packets: Vec<_> = sent.iter().filter(|f| is_image_packet(f)).collect();
        // 15016 bytes: 375 full packets and a 16 byte tail
        assert_eq!(packets.len(), 376);
        assert_eq!(&packets[0][4..9], &[0x33, 0x01, 0x90, 0x01, 0x2C]);
        assert_eq!(packets[375].len(), 4 + 16);
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_send_bit_image_uses_polarity_view() {
        let config = builder().polarity(Polarity::Inverted).build().unwrap();
        let mut h = Harness::new(config);
        let image = BitImage::new(&[0x01, 0x00], 16, 1).unwrap();
        assert!(h.display.send_bit_image(&image, &mut h.delay).unwrap());

        let sent = h.sent();
        let packets: Vec<_> = sent.iter().filter(|f| is_image_packet(f)).collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(*packets[0], vec![0x20, 0x01, 0x00, 0x02, 0x7F, 0xFF]);
    }

    #[test]
    fn test_first_transfer_init_byte() {
        let config = builder().first_transfer_init(0x49).build().unwrap();
        let mut h = Harness::new(config);
        assert!(h.display.send_image_data_packet(&[1, 2], &mut h.delay).unwrap());
        assert!(h.display.send_image_data_packet(&[3], &mut h.delay).unwrap());
        assert_eq!(
            h.sent(),
            vec![vec![0x20, 0x49, 0x00, 0x02, 1, 2], vec![0x20, 0x01, 0x00, 0x01, 3]]
        );
    }

    #[test]
    fn test_first_init_byte_kept_after_rejected_payload() {
        let config = builder().first_transfer_init(0x49).build().unwrap();
        let mut h = Harness::new(config);
        let result = h.display.send_image_data_packet(&[0u8; 256], &mut h.delay);
        assert!(matches!(result, Err(Error::PayloadTooLong { provided: 256 })));
        assert!(h.display.send_image_data_packet(&[7], &mut h.delay).unwrap());
        assert_eq!(h.sent(), vec![vec![0x20, 0x49, 0x00, 0x01, 7]]);
    }

    #[test]
    fn test_packet_retried_until_success() {
        let mut h = harness();
        h.respond(&[PARAM_ERR, PARAM_ERR, OK]);
        assert!(h.display.send_image_data_packet(&[0xFF; 8], &mut h.delay).unwrap());
        assert_eq!(h.sent().len(), 3);
        assert_eq!(h.bus.borrow().exchanges(), 3);
    }

    #[test]
    fn test_packet_gives_up_after_four_attempts() {
        let mut h = harness();
        h.respond(&[LENGTH_ERR, PARAM_ERR, [0x12, 0x34], PARAM_ERR, OK]);
        assert!(!h.display.send_image_data_packet(&[0xFF; 8], &mut h.delay).unwrap());
        assert_eq!(h.sent().len(), 4);
    }

    #[test]
    fn test_packet_rejects_long_payload() {
        let mut h = harness();
        let result = h.display.send_image_data_packet(&[0u8; 256], &mut h.delay);
        assert!(matches!(result, Err(Error::PayloadTooLong { provided: 256 })));
    }

    #[test]
    fn test_read_response_rereads_when_not_ready() {
        let mut h = harness();
        h.respond(&[[0x00, 0x00], [0xFF, 0xFF], OK]);
        assert_eq!(h.display.read_response(&mut h.delay).unwrap(), Status::Success);
        assert_eq!(h.bus.borrow().exchanges(), 3);
    }

    #[test]
    fn test_read_response_gives_up_when_never_ready() {
        let mut h = harness();
        h.respond(&[[0x00, 0x00], [0x00, 0x00], [0xFF, 0xFF], OK]);
        assert_eq!(
            h.display.read_response(&mut h.delay).unwrap(),
            Status::Error(0xFFFF)
        );
        assert_eq!(h.bus.borrow().exchanges(), 3);
    }

    #[test]
    fn test_reset_data_pointer_retries_on_length_error() {
        let mut h = harness();
        h.respond(&[LENGTH_ERR, OK]);
        assert!(h.display.reset_data_pointer(&mut h.delay).unwrap());
        assert_eq!(h.sent().len(), 2);

        let mut h = harness();
        h.respond(&[LENGTH_ERR, LENGTH_ERR, LENGTH_ERR]);
        assert!(!h.display.reset_data_pointer(&mut h.delay).unwrap());
        assert_eq!(h.sent(), vec![vec![0x20, 0x0D, 0x00]; 3]);
    }

    #[test]
    fn test_reset_data_pointer_ignores_other_errors() {
        let mut h = harness();
        h.respond(&[PARAM_ERR]);
        assert!(h.display.reset_data_pointer(&mut h.delay).unwrap());
        assert_eq!(h.sent().len(), 1);
    }

    #[test]
    fn test_set_roi_frame() {
        let mut h = harness();
        h.display
            .set_roi(Region::new(8, 16, 100, 50), &mut h.delay)
            .unwrap();
        assert_eq!(
            h.sent(),
            vec![vec![
                0x20, 0x0A, 0x00, 0x08, 0x00, 0x08, 0x00, 0x6C, 0x00, 0x10, 0x00, 0x42
            ]]
        );
        // No status read follows an ROI
        assert_eq!(h.bus.borrow().exchanges(), 0);
    }

    #[test]
    fn test_set_roi_rejects_invalid_regions() {
        let mut h = harness();
        for region in [
            Region::new(0, 0, 0, 10),
            Region::new(0, 0, 10, 0),
            Region::new(392, 0, 16, 10),
            Region::new(0, 290, 16, 20),
        ] {
            let result = h.display.set_roi(region, &mut h.delay);
            assert!(matches!(result, Err(Error::InvalidRegion { .. })));
        }
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_send_image_roi_clamps_height() {
        let mut h = harness();
        let buffer = vec![0u8; 16 * 40 / 8];
        assert!(h
            .display
            .send_image_roi(&buffer, Region::new(0, 290, 16, 40), &mut h.delay)
            .unwrap());

        let sent = h.sent();
        assert_eq!(
            sent[0],
            vec![0x20, 0x0A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x10, 0x01, 0x22, 0x01, 0x2C]
        );
        // 16 * 10 / 8 = 20 bytes in packets of 16: one full, one tail
        let lens: Vec<_> = sent[1..].iter().map(|f| f[3]).collect();
        assert_eq!(lens, vec![16, 4]);
    }

    #[test]
    fn test_send_image_roi_skips_empty_tail() {
        let mut h = harness();
        let buffer = vec![0u8; 32];
        assert!(h
            .display
            .send_image_roi(&buffer, Region::new(0, 0, 16, 16), &mut h.delay)
            .unwrap());
        let packets = h.sent().iter().filter(|f| is_image_packet(f)).count();
        assert_eq!(packets, 2);
    }

    #[test]
    fn test_send_image_roi_splits_wide_rows() {
        let mut h = harness();
        let buffer = vec![0u8; 400 * 2 / 8];
        assert!(h
            .display
            .send_image_roi(&buffer, Region::new(0, 0, 400, 2), &mut h.delay)
            .unwrap());
        let sent = h.sent();
        let lens: Vec<_> = sent.iter().filter(|f| is_image_packet(f)).map(|f| f[3]).collect();
        // 100 bytes in packets of 200: only the tail
        assert_eq!(lens, vec![100]);
    }

    #[test]
    fn test_send_image_roi_any_packet_suffices() {
        let mut h = harness();
        h.respond(&[PARAM_ERR; 4]);
        let buffer = vec![0u8; 20];
        assert!(h
            .display
            .send_image_roi(&buffer, Region::new(0, 0, 16, 10), &mut h.delay)
            .unwrap());
        assert_eq!(h.sent().iter().filter(|f| is_roi(f)).count(), 1);
    }

    #[test]
    fn test_send_image_roi_repeats_failed_transfer() {
        let mut h = harness();
        // Two packets, four attempts each, all rejected on the first pass
        h.respond(&[PARAM_ERR; 8]);
        let buffer = vec![0u8; 20];
        assert!(h
            .display
            .send_image_roi(&buffer, Region::new(0, 0, 16, 10), &mut h.delay)
            .unwrap());
        assert_eq!(h.sent().iter().filter(|f| is_roi(f)).count(), 2);
    }

    #[test]
    fn test_send_image_roi_fails_after_retry() {
        let mut h = harness();
        h.respond(&[PARAM_ERR; 16]);
        let buffer = vec![0u8; 20];
        assert!(!h
            .display
            .send_image_roi(&buffer, Region::new(0, 0, 16, 10), &mut h.delay)
            .unwrap());
        let sent = h.sent();
        assert_eq!(sent.iter().filter(|f| is_roi(f)).count(), 2);
        assert_eq!(sent.iter().filter(|f| is_image_packet(f)).count(), 16);
    }

    #[test]
    fn test_send_image_roi_argument_errors() {
        let mut h = harness();
        let buffer = vec![0u8; 20];
        assert!(matches!(
            h.display
                .send_image_roi(&buffer, Region::new(0, 300, 16, 10), &mut h.delay),
            Err(Error::InvalidRegion { .. })
        ));
        assert!(matches!(
            h.display
                .send_image_roi(&buffer, Region::new(0, 0, 16, 20), &mut h.delay),
            Err(Error::BufferTooSmall {
                required: 40,
                provided: 20
            })
        ));

        let wide = Dimensions::new(800, 100).unwrap();
        let mut h = Harness::new(Builder::new().dimensions(wide).build().unwrap());
        assert!(matches!(
            h.display
                .send_image_roi(&buffer, Region::new(0, 0, 520, 1), &mut h.delay),
            Err(Error::InvalidPacketLength(260))
        ));
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_fill_follows_polarity() {
        let mut h = harness();
        h.display.fill(Color::White, &mut h.delay).unwrap();
        let sent = h.sent();
        assert_eq!(
            sent[0],
            vec![0x20, 0x0A, 0x00, 0x08, 0x00, 0x00, 0x01, 0x90, 0x00, 0x00, 0x01, 0x2C]
        );
        assert_eq!(sent[1], vec![0x20, 0x0B, 0x00, 0x01, 0x00]);

        let config = builder().polarity(Polarity::Inverted).build().unwrap();
        let mut h = Harness::new(config);
        h.display
            .fill_roi(Region::new(0, 0, 8, 8), Color::White, &mut h.delay)
            .unwrap();
        assert_eq!(h.sent()[1], vec![0x20, 0x0B, 0x00, 0x01, 0xFF]);
    }

    #[test]
    fn test_copy_image_roi_slot_encoding() {
        let mut h = harness();
        let start = h.time.get();
        h.display
            .copy_image_roi(Region::new(0, 0, 8, 8), Slot::Last, &mut h.delay)
            .unwrap();
        h.display
            .copy_image_roi(Region::new(0, 0, 8, 8), Slot::Index(2), &mut h.delay)
            .unwrap();
        let sent = h.sent();
        assert_eq!(sent[1], vec![0x20, 0x0C, 0x00, 0x01, 0xFF]);
        assert_eq!(sent[3], vec![0x20, 0x0C, 0x00, 0x01, 0x02]);
        assert!(h.time.get() - start >= 2 * 10_000);
    }

    #[test]
    fn test_send_parametrized_command_rejects_long_payload() {
        let mut h = harness();
        let result = h
            .display
            .send_parametrized_command(0x20, 0x0B, 0x00, &[0u8; 256], &mut h.delay);
        assert!(matches!(result, Err(Error::PayloadTooLong { provided: 256 })));
        assert!(h.sent().is_empty());
    }
}
