//! # Bit Stream
//!
//! Growable bit-level sink/source. Every wire format in the workspace
//! (packets, control-state CRCs, the execution journal) goes through it.
//!
//! ## Layout
//!
//! Bits are packed LSB-first inside each byte:
//!
//! ```text
//! write_int(0b101, 3); write_int(0b1111, 4);
//!
//! byte 0:  [ 0 1 1 1 1 1 0 1 ]
//!            ^ ^^^^^^^ ^^^^^
//!          pad  0b1111 0b101
//! ```
//!
//! A single cursor serves both reads and writes. Writes grow the readable
//! size; reads never pass it (see [`BitStream::set_max_read_bit_position`]).

use crate::error::{StreamError, StreamResult};

/// Number of bits needed to store any value in `0..count`.
#[must_use]
pub const fn bits_for_count(count: u32) -> u32 {
    if count <= 1 {
        0
    } else {
        32 - (count - 1).leading_zeros()
    }
}

/// Bit-level read/write buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitStream {
    buffer: Vec<u8>,
    bit_position: usize,
    bit_len: usize,
}

impl BitStream {
    /// Creates an empty stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            bit_position: 0,
            bit_len: 0,
        }
    }

    /// Creates a stream positioned at the start of `bytes`, readable to the end.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let bit_len = bytes.len() * 8;
        Self {
            buffer: bytes,
            bit_position: 0,
            bit_len,
        }
    }

    /// Current cursor position in bits.
    #[must_use]
    #[inline]
    pub const fn bit_position(&self) -> usize {
        self.bit_position
    }

    /// Moves the cursor. Positions past the end are clamped for reads.
    pub fn set_bit_position(&mut self, position: usize) {
        self.bit_position = position;
    }

    /// Cursor position rounded up to whole bytes.
    #[must_use]
    pub const fn byte_position(&self) -> usize {
        (self.bit_position + 7) / 8
    }

    /// Number of readable bits.
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Limits reads to the first `bits` bits, even if more bytes are buffered.
    pub fn set_max_read_bit_position(&mut self, bits: usize) {
        self.bit_len = bits.min(self.buffer.len() * 8);
    }

    /// Bits left before the readable end.
    #[must_use]
    pub const fn remaining_bits(&self) -> usize {
        self.bit_len.saturating_sub(self.bit_position)
    }

    /// Buffered bytes covering every readable bit.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..(self.bit_len + 7) / 8]
    }

    /// Consumes the stream, returning the bytes covering every readable bit.
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buffer.truncate((self.bit_len + 7) / 8);
        self.buffer
    }

    /// Drops all content and rewinds.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.bit_position = 0;
        self.bit_len = 0;
    }

    // =========================================================================
    // Raw bits
    // =========================================================================

    /// Writes the low `bits` bits of `value` (0-32).
    pub fn write_bits(&mut self, value: u32, bits: u32) {
        debug_assert!(bits <= 32);
        let end = self.bit_position + bits as usize;
        let needed = (end + 7) / 8;
        if needed > self.buffer.len() {
            self.buffer.resize(needed, 0);
        }

        for i in 0..bits {
            let byte_idx = self.bit_position / 8;
            let bit_idx = self.bit_position % 8;
            if (value >> i) & 1 == 1 {
                self.buffer[byte_idx] |= 1 << bit_idx;
            } else {
                self.buffer[byte_idx] &= !(1 << bit_idx);
            }
            self.bit_position += 1;
        }

        self.bit_len = self.bit_len.max(self.bit_position);
    }

    /// Reads `bits` bits (0-32).
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] when fewer than `bits` readable bits remain.
    pub fn read_bits(&mut self, bits: u32) -> StreamResult<u32> {
        debug_assert!(bits <= 32);
        if self.bit_position + bits as usize > self.bit_len {
            return Err(StreamError::UnexpectedEnd {
                requested: bits as usize,
                position: self.bit_position,
                available: self.bit_len,
            });
        }

        let mut value = 0u32;
        for i in 0..bits {
            let byte_idx = self.bit_position / 8;
            let bit_idx = self.bit_position % 8;
            if (self.buffer[byte_idx] >> bit_idx) & 1 == 1 {
                value |= 1 << i;
            }
            self.bit_position += 1;
        }
        Ok(value)
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn zero_to_byte_boundary(&mut self) {
        let pad = (8 - self.bit_position % 8) % 8;
        self.write_bits(0, pad as u32);
    }

    /// Appends every readable bit of `other`.
    pub fn write_stream(&mut self, other: &Self) {
        let full_bytes = other.bit_len / 8;
        for byte in &other.buffer[..full_bytes] {
            self.write_bits(u32::from(*byte), 8);
        }
        let tail = other.bit_len % 8;
        if tail > 0 {
            self.write_bits(u32::from(other.buffer[full_bytes]), tail as u32);
        }
    }

    // =========================================================================
    // Typed fields
    // =========================================================================

    /// Writes one bit and returns the flag, for `if stream.write_flag(..)` chains.
    #[inline]
    pub fn write_flag(&mut self, flag: bool) -> bool {
        self.write_bits(u32::from(flag), 1);
        flag
    }

    /// Reads one bit.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] at the end of the stream.
    #[inline]
    pub fn read_flag(&mut self) -> StreamResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Writes an unsigned integer in exactly `bits` bits.
    #[inline]
    pub fn write_int(&mut self, value: u32, bits: u32) {
        self.write_bits(value, bits);
    }

    /// Reads an unsigned integer of `bits` bits.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] at the end of the stream.
    #[inline]
    pub fn read_int(&mut self, bits: u32) -> StreamResult<u32> {
        self.read_bits(bits)
    }

    /// Writes `value` clamped to `[min, max]` using the fewest bits that cover the range.
    pub fn write_ranged_u32(&mut self, value: u32, min: u32, max: u32) {
        debug_assert!(min <= max);
        debug_assert!(value >= min && value <= max, "{value} outside [{min}, {max}]");
        let value = value.clamp(min, max);
        let bits = bits_for_count((max - min).saturating_add(1));
        self.write_bits(value - min, bits);
    }

    /// Reads a value written by [`BitStream::write_ranged_u32`].
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] at the end of the stream.
    pub fn read_ranged_u32(&mut self, min: u32, max: u32) -> StreamResult<u32> {
        let bits = bits_for_count((max - min).saturating_add(1));
        let value = self.read_bits(bits)?;
        Ok((value + min).min(max))
    }

    /// Writes a float in `[0, 1]` quantized to `bits` bits (rounded).
    pub fn write_float(&mut self, value: f32, bits: u32) {
        let max_int = (1u32 << bits) - 1;
        let quantized = (value.clamp(0.0, 1.0) * max_int as f32).round() as u32;
        self.write_bits(quantized.min(max_int), bits);
    }

    /// Reads a float written by [`BitStream::write_float`].
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] at the end of the stream.
    pub fn read_float(&mut self, bits: u32) -> StreamResult<f32> {
        let max_int = (1u32 << bits) - 1;
        Ok(self.read_bits(bits)? as f32 / max_int as f32)
    }

    /// Writes a raw 32-bit unsigned integer.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    /// Reads a raw 32-bit unsigned integer.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] at the end of the stream.
    #[inline]
    pub fn read_u32(&mut self) -> StreamResult<u32> {
        self.read_bits(32)
    }

    /// Writes a raw IEEE-754 float (bit-exact).
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }

    /// Reads a raw IEEE-754 float.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] at the end of the stream.
    #[inline]
    pub fn read_f32(&mut self) -> StreamResult<f32> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    /// Writes a string with an 8-bit length prefix. Longer strings are cut at
    /// the last character boundary within 255 bytes.
    pub fn write_string(&mut self, value: &str) {
        let mut end = value.len().min(255);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.write_bits(end as u32, 8);
        for byte in &value.as_bytes()[..end] {
            self.write_bits(u32::from(*byte), 8);
        }
    }

    /// Reads a string written by [`BitStream::write_string`].
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] on a short stream,
    /// [`StreamError::InvalidUtf8`] on a corrupt payload.
    pub fn read_string(&mut self) -> StreamResult<String> {
        let len = self.read_bits(8)? as usize;
        let bytes = self.read_byte_run(len)?;
        String::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)
    }

    /// Writes a byte buffer with a 32-bit length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        for byte in bytes {
            self.write_bits(u32::from(*byte), 8);
        }
    }

    /// Reads a buffer written by [`BitStream::write_bytes`].
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEnd`] on a short stream.
    pub fn read_bytes(&mut self) -> StreamResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_byte_run(len)
    }

    fn read_byte_run(&mut self, len: usize) -> StreamResult<Vec<u8>> {
        if self.remaining_bits() < len.saturating_mul(8) {
            return Err(StreamError::UnexpectedEnd {
                requested: len.saturating_mul(8),
                position: self.bit_position,
                available: self.bit_len,
            });
        }
        (0..len).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }

    // =========================================================================
    // Integrity
    // =========================================================================

    /// CRC-32 of the buffered bytes in `start..end` (byte offsets, clamped).
    #[must_use]
    pub fn calculate_crc(&self, start: usize, end: usize) -> u32 {
        let end = end.min(self.buffer.len());
        let start = start.min(end);
        crc32fast::hash(&self.buffer[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first_layout() {
        let mut stream = BitStream::new();
        stream.write_int(0b101, 3);
        stream.write_int(0b1111, 4);
        assert_eq!(stream.as_bytes(), &[0b0111_1101]);

        stream.set_bit_position(0);
        assert_eq!(stream.read_int(3).unwrap(), 0b101);
        assert_eq!(stream.read_int(4).unwrap(), 0b1111);
    }

    #[test]
    fn test_ranged_bits() {
        assert_eq!(bits_for_count(1), 0);
        assert_eq!(bits_for_count(2), 1);
        assert_eq!(bits_for_count(64), 6);
        assert_eq!(bits_for_count(128), 7);
        assert_eq!(bits_for_count(129), 8);

        let mut stream = BitStream::new();
        stream.write_ranged_u32(100, 0, 127);
        assert_eq!(stream.bit_position(), 7);
        stream.set_bit_position(0);
        assert_eq!(stream.read_ranged_u32(0, 127).unwrap(), 100);
    }

    #[test]
    fn test_quantized_float_is_stable() {
        let mut stream = BitStream::new();
        stream.write_float(0.4, 4);
        stream.set_bit_position(0);
        let once = stream.read_float(4).unwrap();

        let mut again = BitStream::new();
        again.write_float(once, 4);
        again.set_bit_position(0);
        assert_eq!(again.read_float(4).unwrap(), once);
        assert!((once - 0.4).abs() <= 1.0 / 30.0);
    }

    #[test]
    fn test_long_string_is_cut_at_char_boundary() {
        // 254 ASCII bytes then a 2-byte character straddling the limit
        let text = format!("{}é tail", "a".repeat(254));
        let mut stream = BitStream::new();
        stream.write_string(&text);
        assert_eq!(stream.bit_position(), 8 + 254 * 8);
        stream.set_bit_position(0);
        assert_eq!(stream.read_string().unwrap(), "a".repeat(254));

        let exact = "b".repeat(255);
        let mut stream = BitStream::new();
        stream.write_string(&exact);
        stream.set_bit_position(0);
        assert_eq!(stream.read_string().unwrap(), exact);
    }

    #[test]
    fn test_oversized_byte_count_is_an_underrun() {
        let mut stream = BitStream::new();
        stream.write_u32(u32::MAX);
        stream.write_int(7, 8);
        stream.set_bit_position(0);
        assert!(matches!(stream.read_bytes(), Err(StreamError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_read_past_end() {
        let mut stream = BitStream::new();
        stream.write_flag(true);
        stream.set_bit_position(0);
        assert!(stream.read_flag().unwrap());
        assert!(matches!(
            stream.read_flag(),
            Err(StreamError::UnexpectedEnd { requested: 1, position: 1, available: 1 })
        ));
    }

    #[test]
    fn test_max_read_position_limits_reads() {
        let mut stream = BitStream::from_bytes(vec![0xFF, 0xFF]);
        stream.set_max_read_bit_position(12);
        assert_eq!(stream.read_int(12).unwrap(), 0xFFF);
        assert!(stream.read_flag().is_err());
    }

    #[test]
    fn test_strings_and_bytes() {
        let mut stream = BitStream::new();
        stream.write_flag(true);
        stream.write_string("client_idle");
        stream.write_bytes(&[1, 2, 3]);
        stream.write_f32(-12.5);

        stream.set_bit_position(0);
        assert!(stream.read_flag().unwrap());
        assert_eq!(stream.read_string().unwrap(), "client_idle");
        assert_eq!(stream.read_bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(stream.read_f32().unwrap(), -12.5);
    }

    #[test]
    fn test_overwrite_clears_bits() {
        let mut stream = BitStream::new();
        stream.write_u32(u32::MAX);
        stream.set_bit_position(0);
        stream.write_u32(5);
        stream.set_bit_position(0);
        assert_eq!(stream.read_u32().unwrap(), 5);
    }

    #[test]
    fn test_write_stream_appends_partial_byte() {
        let mut inner = BitStream::new();
        inner.write_int(0x2AB, 11);

        let mut outer = BitStream::new();
        outer.write_flag(true);
        outer.write_stream(&inner);
        assert_eq!(outer.bit_len(), 12);

        outer.set_bit_position(1);
        assert_eq!(outer.read_int(11).unwrap(), 0x2AB);
    }

    #[test]
    fn test_crc_covers_byte_range() {
        let mut a = BitStream::new();
        a.write_u32(0xDEAD_BEEF);
        let mut b = a.clone();
        assert_eq!(a.calculate_crc(0, 4), b.calculate_crc(0, 4));
        b.set_bit_position(0);
        b.write_u32(0xDEAD_BEEE);
        assert_ne!(a.calculate_crc(0, 4), b.calculate_crc(0, 4));
        a.zero_to_byte_boundary();
        assert_eq!(a.bit_position(), 32);
    }
}
