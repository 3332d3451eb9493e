//! Growable MSB-first bit buffer.
//!
//! Used both for individual Huffman codes (whose length is bounded only by the
//! alphabet size) and for the packed payload bitstream of a blob. Bits fill each
//! byte from the most significant end; unused bits of the final byte are zero.

use crate::error::{Error, Result};

/// Number of bytes needed to hold `bits` packed bits.
pub fn packed_len(bits: u64) -> u64 {
    bits.div_ceil(8)
}

/// A packed, growable sequence of bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuf {
    bytes: Vec<u8>,
    len: usize,
}

impl BitBuf {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    /// Wrap already-packed bytes holding `len` bits.
    ///
    /// Extra trailing bytes are dropped and padding bits in the final byte are
    /// cleared, so two buffers with the same logical bits compare equal.
    pub fn from_packed(mut bytes: Vec<u8>, len: usize) -> Result<Self> {
        let needed = len.div_ceil(8);
        if bytes.len() < needed {
            return Err(Error::truncated(needed as u64, bytes.len() as u64));
        }
        bytes.truncate(needed);

        let used = len % 8;
        if used != 0
            && let Some(last) = bytes.last_mut()
        {
            *last &= 0xFFu8 << (8 - used);
        }

        Ok(Self { bytes, len })
    }

    /// Number of bits held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bits are held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packed bytes, final byte zero-padded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        let bit_offset = self.len % 8;
        if bit_offset == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 1 << (7 - bit_offset);
        }
        self.len += 1;
    }

    /// Remove and return the last bit.
    pub fn pop(&mut self) -> Option<bool> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let byte_index = self.len / 8;
        let bit_offset = self.len % 8;
        let mask = 1 << (7 - bit_offset);
        let bit = self.bytes[byte_index] & mask != 0;
        self.bytes[byte_index] &= !mask;
        if bit_offset == 0 {
            self.bytes.pop();
        }
        Some(bit)
    }

    /// Append every bit of `other`.
    pub fn extend_from(&mut self, other: &BitBuf) {
        if self.len % 8 == 0 {
            // Byte-aligned: copy whole bytes, other's padding is already zero.
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
            return;
        }
        for bit in other.iter() {
            self.push(bit);
        }
    }

    /// Iterate over the bits in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.bytes[i / 8] & (1 << (7 - i % 8)) != 0)
    }
}

impl std::fmt::Display for BitBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}
