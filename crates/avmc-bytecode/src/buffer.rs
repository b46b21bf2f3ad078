//! Append-only byte buffer with in-place patching
//!
//! Every variable-length record in a module is written through this type:
//! unsigned and signed LEB-style integers, signed 24-bit branch offsets and
//! IEEE-754 doubles, all little-endian.

use serde::Serialize;

use crate::error::{BytecodeError, Result};

/// Largest value representable by a `u30` field
pub const MAX_U30: u32 = (1 << 30) - 1;

/// Smallest displacement representable by an `s24` field
pub const MIN_S24: i32 = -(1 << 23);

/// Largest displacement representable by an `s24` field
pub const MAX_S24: i32 = (1 << 23) - 1;

/// Growable byte sequence that supports overwriting previously reserved bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Wrap existing bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Number of bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current write position as a code address
    #[inline]
    pub fn position(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Borrow the written bytes
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the buffer, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte at `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Discard all content
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Append one byte
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Append a little-endian u16
    pub fn write_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Append a variable-length unsigned 32-bit integer
    pub fn write_u32(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    /// Append a variable-length u30, rejecting values that do not fit
    pub fn write_u30(&mut self, value: u32) -> Result<()> {
        if value > MAX_U30 {
            return Err(BytecodeError::IndexOverflow {
                what: "u30",
                value: u64::from(value),
            });
        }
        self.write_u32(value);
        Ok(())
    }

    /// Append a u30 count or index taken from a `usize`
    pub fn write_count(&mut self, what: &'static str, value: usize) -> Result<()> {
        if value > MAX_U30 as usize {
            return Err(BytecodeError::IndexOverflow {
                what,
                value: value as u64,
            });
        }
        self.write_u32(value as u32);
        Ok(())
    }

    /// Append a variable-length signed 32-bit integer
    ///
    /// The two's-complement bit pattern is written with the unsigned encoding;
    /// readers sign-extend from the 32-bit result.
    pub fn write_s32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    /// Append a signed 24-bit little-endian value
    pub fn write_s24(&mut self, value: i32) -> Result<()> {
        check_s24(value)?;
        self.bytes.extend_from_slice(&value.to_le_bytes()[..3]);
        Ok(())
    }

    /// Append a little-endian IEEE-754 double
    pub fn write_d64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrite three bytes at `at` with a signed 24-bit value
    pub fn patch_s24(&mut self, at: usize, value: i32) -> Result<()> {
        check_s24(value)?;
        let slot = self
            .bytes
            .get_mut(at..at + 3)
            .ok_or(BytecodeError::InvalidOperand(at))?;
        slot.copy_from_slice(&value.to_le_bytes()[..3]);
        Ok(())
    }

    /// Read back a signed 24-bit value previously written at `at`
    pub fn read_s24(&self, at: usize) -> Option<i32> {
        let b = self.bytes.get(at..at + 3)?;
        Some(decode_s24([b[0], b[1], b[2]]))
    }
}

/// Sign-extend three little-endian bytes
#[inline]
pub fn decode_s24(bytes: [u8; 3]) -> i32 {
    let raw = i32::from(bytes[0]) | (i32::from(bytes[1]) << 8) | (i32::from(bytes[2]) << 16);
    (raw << 8) >> 8
}

fn check_s24(value: i32) -> Result<()> {
    if (MIN_S24..=MAX_S24).contains(&value) {
        Ok(())
    } else {
        Err(BytecodeError::BranchOutOfRange(i64::from(value)))
    }
}
