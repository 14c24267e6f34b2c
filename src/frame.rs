//! Command frame construction and image packetization
//!
//! A [`Frame`] owns exactly one command frame. Frames are built per call and
//! dropped after the exchange, so no transmit scratch area is shared between
//! operations.

use core::num::NonZeroU8;

use crate::command::{IMAGE_OPCODE, MAX_PAYLOAD_LEN, SET_ROI};

/// Header bytes in front of a parametrized payload (opcode, subcode, slot, length)
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest frame the protocol can express
pub const MAX_FRAME_LEN: usize = FRAME_HEADER_LEN + MAX_PAYLOAD_LEN;

/// Payload did not fit in the one-byte length field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadTooLong {
    /// Payload length that was provided
    pub provided: usize,
}

impl core::fmt::Display for PayloadTooLong {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Payload too long: {} bytes (max {MAX_PAYLOAD_LEN})",
            self.provided
        )
    }
}

impl core::error::Error for PayloadTooLong {}

/// A single command frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    /// Build a simple 3-byte command: `[opcode, subcode, slot]`
    pub fn simple(opcode: u8, subcode: u8, slot: u8) -> Self {
        let mut bytes = [0u8; MAX_FRAME_LEN];
        bytes[..3].copy_from_slice(&[opcode, subcode, slot]);
        Self { bytes, len: 3 }
    }

    /// Build a parametrized command: `[opcode, subcode, slot, len, payload...]`
    ///
    /// # Errors
    ///
    /// Returns [`PayloadTooLong`] if the payload exceeds 255 bytes.
    pub fn parametrized(
        opcode: u8,
        subcode: u8,
        slot: u8,
        payload: &[u8],
    ) -> Result<Self, PayloadTooLong> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PayloadTooLong {
                provided: payload.len(),
            });
        }
        let mut bytes = [0u8; MAX_FRAME_LEN];
        bytes[..FRAME_HEADER_LEN].copy_from_slice(&[opcode, subcode, slot, payload.len() as u8]);
        let len = FRAME_HEADER_LEN + payload.len();
        bytes[FRAME_HEADER_LEN..len].copy_from_slice(payload);
        Ok(Self { bytes, len })
    }

    /// Build an image data packet: `[0x20, init, 0x00, len, payload...]`
    ///
    /// # Errors
    ///
    /// Returns [`PayloadTooLong`] if the payload exceeds 255 bytes.
    pub fn image_data(init: u8, payload: &[u8]) -> Result<Self, PayloadTooLong> {
        Self::parametrized(IMAGE_OPCODE, init, 0x00, payload)
    }

    /// Build a region-of-interest frame
    ///
    /// Bounds are sent as big-endian u16 values in the order
    /// x_min, x_max, y_min, y_max.
    pub fn roi(x_min: u16, x_max: u16, y_min: u16, y_max: u16) -> Self {
        let mut payload = [0u8; 8];
        for (chunk, value) in payload
            .chunks_exact_mut(2)
            .zip([x_min, x_max, y_min, y_max])
        {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        let mut bytes = [0u8; MAX_FRAME_LEN];
        bytes[..FRAME_HEADER_LEN].copy_from_slice(&[IMAGE_OPCODE, SET_ROI, 0x00, 8]);
        bytes[FRAME_HEADER_LEN..FRAME_HEADER_LEN + 8].copy_from_slice(&payload);
        Self {
            bytes,
            len: FRAME_HEADER_LEN + 8,
        }
    }

    /// Frame bytes as sent on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the frame is empty (never true for a built frame)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Frame").field(&self.as_bytes()).finish()
    }
}

/// Iterator splitting an image buffer into data packets
///
/// Yields `len / packet_len` full packets followed by exactly one remainder
/// packet of `len % packet_len` bytes. The remainder is empty when the buffer
/// is an exact multiple of the packet length.
#[derive(Clone, Debug)]
pub struct Packets<'a> {
    remaining: &'a [u8],
    packet_len: usize,
    done: bool,
}

impl<'a> Packets<'a> {
    /// Split `buffer` into packets of `packet_len` bytes
    pub fn new(buffer: &'a [u8], packet_len: NonZeroU8) -> Self {
        Self {
            remaining: buffer,
            packet_len: packet_len.get() as usize,
            done: false,
        }
    }
}

impl<'a> Iterator for Packets<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining.len() >= self.packet_len {
            let (packet, rest) = self.remaining.split_at(self.packet_len);
            self.remaining = rest;
            return Some(packet);
        }
        self.done = true;
        Some(self.remaining)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = if self.done {
            0
        } else {
            self.remaining.len() / self.packet_len + 1
        };
        (count, Some(count))
    }
}

impl ExactSizeIterator for Packets<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn packet_len(value: u8) -> NonZeroU8 {
        NonZeroU8::new(value).unwrap()
    }

    #[test]
    fn test_simple_frame() {
        let frame = Frame::simple(0x20, 0x0E, 0x00);
        assert_eq!(frame.as_bytes(), &[0x20, 0x0E, 0x00]);
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_parametrized_frame_carries_length() {
        let frame = Frame::parametrized(0x20, 0x0C, 0x00, &[0x03]).unwrap();
        assert_eq!(frame.as_bytes(), &[0x20, 0x0C, 0x00, 0x01, 0x03]);
    }

    #[test]
    fn test_parametrized_frame_rejects_long_payload() {
        let payload = [0u8; 256];
        let result = Frame::parametrized(0x20, 0x0B, 0x00, &payload);
        assert_eq!(result, Err(PayloadTooLong { provided: 256 }));
    }

    #[test]
    fn test_parametrized_frame_accepts_max_payload() {
        let payload = [0xA5u8; 255];
        let frame = Frame::parametrized(0x20, 0x01, 0x00, &payload).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
        assert_eq!(frame.as_bytes()[3], 0xFF);
    }

    #[test]
    fn test_image_data_frame() {
        let frame = Frame::image_data(0x01, &[0xAA, 0xBB]).unwrap();
        assert_eq!(frame.as_bytes(), &[0x20, 0x01, 0x00, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn test_roi_frame_is_big_endian() {
        let frame = Frame::roi(0, 400, 0x0102, 300);
        assert_eq!(
            frame.as_bytes(),
            &[0x20, 0x0A, 0x00, 0x08, 0x00, 0x00, 0x01, 0x90, 0x01, 0x02, 0x01, 0x2C]
        );
    }

    #[test]
    fn test_packets_exact_multiple_has_empty_tail() {
        let buffer = [0u8; 1000];
        let packets: Vec<&[u8]> = Packets::new(&buffer, packet_len(40)).collect();
        assert_eq!(packets.len(), 26);
        assert!(packets[..25].iter().all(|p| p.len() == 40));
        assert!(packets[25].is_empty());
    }

    #[test]
    fn test_packets_remainder() {
        for (len, plen) in [(0usize, 1u8), (1, 40), (15_016, 40), (97, 7), (255, 255), (256, 255)] {
            let buffer = alloc::vec![0u8; len];
            let packets: Vec<&[u8]> = Packets::new(&buffer, packet_len(plen)).collect();
            let plen = plen as usize;
            let full = packets.iter().filter(|p| p.len() == plen).count();
            let tail = packets.last().unwrap();
            assert_eq!(packets.len(), len / plen + 1);
            assert_eq!(tail.len(), len % plen);
            assert_eq!(full, len / plen);
            assert_eq!(packets.iter().map(|p| p.len()).sum::<usize>(), len);
        }
    }

    #[test]
    fn test_packets_size_hint() {
        let buffer = [0u8; 95];
        let packets = Packets::new(&buffer, packet_len(40));
        assert_eq!(packets.len(), 3);
    }
}
