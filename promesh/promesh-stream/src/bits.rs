//! MSB-first bit packing.

use crate::error::{StreamError, StreamResult};

/// Minimal number of bits needed to represent `value` (at least 1).
#[must_use]
pub fn bit_width(value: u32) -> u32 {
    (32 - value.leading_zeros()).max(1)
}

/// Appends bits MSB-first into a byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    used: usize,
}

impl BitWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.used
    }

    pub fn write_bit(&mut self, bit: bool) {
        let slot = self.used % 8;
        if slot == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> slot;
        }
        self.used += 1;
    }

    /// Write the low `width` bits of `value`, most significant first.
    ///
    /// `width` must be at most 32 and `value` must fit in `width` bits.
    pub fn write_bits(&mut self, value: u32, width: u32) {
        debug_assert!(width <= 32);
        debug_assert!(width == 32 || value < (1u32 << width));
        for i in (0..width).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Write a nibble-group VLQ: groups of `continue:1 data:3`, low groups
    /// first, continuation set while more groups follow.
    pub fn write_vlq(&mut self, mut value: u32) {
        loop {
            let group = value & 0x7;
            value >>= 3;
            self.write_bit(value != 0);
            self.write_bits(group, 3);
            if value == 0 {
                return;
            }
        }
    }

    /// Zero-pad to a byte boundary and return the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bits MSB-first from a byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Number of unread bits.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.bytes.len() * 8 - self.pos
    }

    /// Current bit position.
    #[must_use]
    pub fn bit_pos(&self) -> usize {
        self.pos
    }

    /// Jump to a bit position recorded by [`Self::bit_pos`].
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn read_bit(&mut self) -> StreamResult<bool> {
        if self.pos >= self.bytes.len() * 8 {
            return Err(StreamError::UnexpectedEof { context: "bits" });
        }
        let bit = (self.bytes[self.pos / 8] >> (7 - self.pos % 8)) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    /// Read `width` bits, most significant first. `width` must be at most 32.
    pub fn read_bits(&mut self, width: u32) -> StreamResult<u32> {
        debug_assert!(width <= 32);
        let mut value = 0u32;
        for _ in 0..width {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Read a nibble-group VLQ written by [`BitWriter::write_vlq`].
    pub fn read_vlq(&mut self) -> StreamResult<u32> {
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            let more = self.read_bit()?;
            let group = self.read_bits(3)?;
            if shift >= 32 {
                return Err(StreamError::InvalidFormat {
                    context: "vlq",
                    detail: "value exceeds 32 bits".to_string(),
                });
            }
            value |= group << shift;
            shift += 3;
            if !more {
                return Ok(value);
            }
        }
    }

    /// Check that only zero padding remains (less than one byte of it).
    pub fn expect_consumed(&self, context: &'static str) -> StreamResult<()> {
        let remaining = self.remaining_bits();
        if remaining >= 8 {
            return Err(StreamError::InvalidFormat {
                context,
                detail: format!("{remaining} unread bits after final record"),
            });
        }
        let mut probe = Self {
            bytes: self.bytes,
            pos: self.pos,
        };
        for _ in 0..remaining {
            if probe.read_bit()? {
                return Err(StreamError::InvalidFormat {
                    context,
                    detail: "nonzero padding bits".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bits_are_msb_first() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bit(false);
        w.write_bit(true);
        assert_eq!(w.into_bytes(), vec![0b1010_0000]);

        let mut w = BitWriter::new();
        w.write_bits(0b1101, 4);
        w.write_bits(0b0011, 4);
        w.write_bits(0xFF, 8);
        assert_eq!(w.into_bytes(), vec![0b1101_0011, 0xFF]);
    }

    #[test]
    fn read_matches_write() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(4095, 12);
        w.write_bit(true);
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        assert_eq!(r.read_bits(12).unwrap(), 4095);
        assert!(r.read_bit().unwrap());
        r.expect_consumed("test").unwrap();
    }

    #[test]
    fn reading_past_end_is_eof() {
        let bytes = [0xAB];
        let mut r = BitReader::new(&bytes);
        r.read_bits(8).unwrap();
        assert!(matches!(
            r.read_bit(),
            Err(StreamError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn vlq_small_values_use_one_group() {
        let mut w = BitWriter::new();
        w.write_vlq(5);
        // continue=0, data=101.
        assert_eq!(w.bit_len(), 4);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0b0101_0000]);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_vlq().unwrap(), 5);
    }

    #[test]
    fn vlq_larger_values_chain_groups() {
        // 10 = 0b1010: groups 010 (low), 001 (high).
        let mut w = BitWriter::new();
        w.write_vlq(10);
        assert_eq!(w.bit_len(), 8);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0b1010_0001]);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_vlq().unwrap(), 10);
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        let bytes = [0b0000_0100];
        let mut r = BitReader::new(&bytes);
        r.read_bits(3).unwrap();
        assert!(matches!(
            r.expect_consumed("test"),
            Err(StreamError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn bit_width_bounds() {
        assert_eq!(bit_width(0), 1);
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(2), 2);
        assert_eq!(bit_width(255), 8);
        assert_eq!(bit_width(256), 9);
        assert_eq!(bit_width(u32::MAX), 32);
    }

    proptest! {
        #[test]
        fn vlq_round_trips(value in any::<u32>()) {
            let mut w = BitWriter::new();
            w.write_vlq(value);
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            prop_assert_eq!(r.read_vlq().unwrap(), value);
        }

        #[test]
        fn bits_round_trip(value in any::<u32>(), width in 1u32..=32) {
            let masked = if width == 32 { value } else { value & ((1 << width) - 1) };
            let mut w = BitWriter::new();
            w.write_bits(masked, width);
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            prop_assert_eq!(r.read_bits(width).unwrap(), masked);
        }
    }
}
