//! Binary blob format.
//!
//! A blob is one Huffman-compressed file. Header fields are little-endian:
//!
//! ```text
//! 0x00  4   "HC1\0" magic
//! 0x04  8   original_size (u64 LE) - uncompressed length in bytes
//! 0x0C  8   code_count (u64 LE)    - number of codebook entries
//! 0x14  8   payload_bits (u64 LE)  - number of meaningful payload bits
//! 0x1C  ... codebook, code_count entries in ascending symbol order:
//!           1   symbol
//!           2   code length in bits (u16 LE)
//!           ..  ceil(length / 8) bytes of MSB-first code bits
//! ....  ... payload, ceil(payload_bits / 8) bytes, MSB-first, zero-padded
//! ```

use crate::bits::{BitBuf, packed_len};
use crate::error::{Error, Result};
use crate::huffman::{self, ALPHABET_SIZE, CodeTable, DecodeTrie};
use log::debug;

/// Magic bytes at the start of every blob.
pub const MAGIC: &[u8; 4] = b"HC1\0";

/// Size of the blob header in bytes.
pub const HEADER_SIZE: usize = 28;

/// Largest packed code accepted when reading a codebook (256 bits).
///
/// Huffman codes over 256 symbols never exceed 255 bits, so only corrupt
/// codebooks hit this bound.
pub const MAX_CODE_BYTES: usize = 32;

/// Size of a codebook entry without its code bits (symbol + u16 length).
const ENTRY_PREFIX_SIZE: usize = 3;

/// The fixed-size blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    /// Uncompressed length in bytes.
    pub original_size: u64,
    /// Number of codebook entries that follow the header.
    pub code_count: u64,
    /// Number of meaningful bits in the payload.
    pub payload_bits: u64,
}

impl BlobHeader {
    /// Encode the header to a 28-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..12].copy_from_slice(&self.original_size.to_le_bytes());
        buf[12..20].copy_from_slice(&self.code_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.payload_bits.to_le_bytes());
        buf
    }

    /// Decode a header, checking the magic first.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.get(0..MAGIC.len()) != Some(&MAGIC[..]) {
            return Err(Error::format(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[..buf.len().min(MAGIC.len())]
            )));
        }
        if buf.len() < HEADER_SIZE {
            return Err(Error::truncated(HEADER_SIZE as u64, buf.len() as u64));
        }

        let header = Self {
            original_size: read_u64(&buf[4..12]),
            code_count: read_u64(&buf[12..20]),
            payload_bits: read_u64(&buf[20..28]),
        };
        debug!(
            "blob header: original_size={} code_count={} payload_bits={}",
            header.original_size, header.code_count, header.payload_bits
        );
        Ok(header)
    }

    /// Compressed-to-original ratio implied by this header (0 for empty input).
    pub fn ratio(&self, blob_len: u64) -> f64 {
        if self.original_size == 0 {
            0.0
        } else {
            blob_len as f64 / self.original_size as f64
        }
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Sequential reader over a blob's bytes that reports short reads as truncation.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                Error::truncated(self.pos as u64 + n as u64, self.buf.len() as u64)
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// A decoded blob: header, code table and payload bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    header: BlobHeader,
    codes: CodeTable,
    payload: BitBuf,
}

impl Blob {
    /// Huffman-compress `data` into a blob.
    pub fn compress(data: &[u8]) -> Result<Self> {
        let codes = CodeTable::for_data(data);
        let payload = huffman::encode(data, &codes)?;
        let header = BlobHeader {
            original_size: data.len() as u64,
            code_count: codes.len() as u64,
            payload_bits: payload.len() as u64,
        };
        debug!(
            "compressed {} bytes: {} codes, {} payload bits, longest code {}",
            data.len(),
            header.code_count,
            header.payload_bits,
            codes.max_code_len()
        );
        Ok(Self {
            header,
            codes,
            payload,
        })
    }

    /// Restore the original bytes.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        DecodeTrie::from_table(&self.codes)?.decode(&self.payload, self.header.original_size)
    }

    /// The blob header.
    pub fn header(&self) -> &BlobHeader {
        &self.header
    }

    /// Serialized length in bytes.
    pub fn encoded_len(&self) -> u64 {
        let codebook: u64 = self
            .codes
            .iter()
            .map(|(_, code)| ENTRY_PREFIX_SIZE as u64 + packed_len(code.len() as u64))
            .sum();
        HEADER_SIZE as u64 + codebook + packed_len(self.header.payload_bits)
    }

    /// Serialize header, codebook and payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        buf.extend_from_slice(&self.header.encode());
        for (symbol, code) in self.codes.iter() {
            buf.push(symbol);
            // Codes are at most ALPHABET_SIZE - 1 bits long.
            buf.extend_from_slice(&(code.len() as u16).to_le_bytes());
            buf.extend_from_slice(code.as_bytes());
        }
        buf.extend_from_slice(self.payload.as_bytes());
        buf
    }

    /// Parse a serialized blob. Bytes after the payload are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = BlobHeader::decode(bytes)?;
        let mut cursor = Cursor {
            buf: bytes,
            pos: HEADER_SIZE,
        };

        if header.code_count > ALPHABET_SIZE as u64 {
            return Err(Error::format(format!(
                "Codebook declares {} entries (at most {})",
                header.code_count, ALPHABET_SIZE
            )));
        }

        let mut codes = CodeTable::new();
        for _ in 0..header.code_count {
            let symbol = cursor.take(1)?[0];
            let len_bytes = cursor.take(2)?;
            let code_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
            let code_bytes = code_len.div_ceil(8);
            if code_bytes > MAX_CODE_BYTES {
                return Err(Error::format(format!(
                    "Code for symbol {} is {} bits (limit {} bytes)",
                    symbol, code_len, MAX_CODE_BYTES
                )));
            }
            let bits = cursor.take(code_bytes)?;
            codes.insert(symbol, BitBuf::from_packed(bits.to_vec(), code_len)?)?;
        }

        let payload_bits = usize::try_from(header.payload_bits).map_err(|_| {
            Error::format(format!("Payload bit count {} too large", header.payload_bits))
        })?;
        let payload_bytes = cursor.take(payload_bits.div_ceil(8))?;
        let payload = BitBuf::from_packed(payload_bytes.to_vec(), payload_bits)?;

        Ok(Self {
            header,
            codes,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = BlobHeader {
            original_size: 13,
            code_count: 5,
            payload_bits: 29,
        };
        let encoded = header.encode();
        assert_eq!(&encoded[0..4], b"HC1\0");
        assert_eq!(&encoded[4..12], &13u64.to_le_bytes());
        assert_eq!(&encoded[12..20], &5u64.to_le_bytes());
        assert_eq!(&encoded[20..28], &29u64.to_le_bytes());
        assert_eq!(BlobHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(BlobHeader::decode(&buf), Err(Error::Format { .. })));
    }

    #[test]
    fn test_short_input_without_magic_is_format_error() {
        assert!(matches!(Blob::from_bytes(b"XY"), Err(Error::Format { .. })));
        assert!(matches!(BlobHeader::decode(b""), Err(Error::Format { .. })));
        assert!(matches!(BlobHeader::decode(b"HC1"), Err(Error::Format { .. })));
    }

    #[test]
    fn test_header_too_short() {
        let buf = *b"HC1\0\x01\x02";
        assert!(matches!(
            BlobHeader::decode(&buf),
            Err(Error::Truncated { expected: 28, actual: 6 })
        ));
    }

    #[test]
    fn test_known_blob() {
        let data = b"aaaa bbb cc d";
        let blob = Blob::compress(data).unwrap();
        assert_eq!(blob.header().original_size, 13);
        assert_eq!(blob.header().code_count, 5);
        assert_eq!(blob.header().payload_bits, 29);

        let bytes = blob.to_bytes();
        // 28 header + 5 * (3 + 1) codebook + 4 payload
        assert_eq!(bytes.len(), 52);
        assert_eq!(blob.encoded_len(), 52);

        // First codebook entry is the space character: "00"
        assert_eq!(bytes[28], b' ');
        assert_eq!(&bytes[29..31], &2u16.to_le_bytes());
        assert_eq!(bytes[31], 0b0000_0000);

        let parsed = Blob::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, blob);
        assert_eq!(parsed.decompress().unwrap(), data);
    }

    #[test]
    fn test_empty_blob() {
        let blob = Blob::compress(b"").unwrap();
        assert_eq!(blob.header().code_count, 0);
        assert_eq!(blob.header().payload_bits, 0);

        let bytes = blob.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let parsed = Blob::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.decompress().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_single_symbol_blob() {
        let blob = Blob::compress(b"xxxxxxxxxxx").unwrap();
        let bytes = blob.to_bytes();
        // 28 header + (1 + 2 + 1) codebook + 2 payload bytes for 11 bits
        assert_eq!(bytes.len(), 34);
        let parsed = Blob::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.decompress().unwrap(), b"xxxxxxxxxxx");
    }

    #[test]
    fn test_oversized_code_rejected() {
        let mut bytes = BlobHeader {
            original_size: 1,
            code_count: 1,
            payload_bits: 1,
        }
        .encode()
        .to_vec();
        bytes.push(b'a');
        bytes.extend_from_slice(&257u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);

        assert!(matches!(Blob::from_bytes(&bytes), Err(Error::Format { .. })));
    }

    #[test]
    fn test_too_many_codebook_entries() {
        let bytes = BlobHeader {
            original_size: 1,
            code_count: 257,
            payload_bits: 1,
        }
        .encode();
        assert!(matches!(Blob::from_bytes(&bytes), Err(Error::Format { .. })));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = Blob::compress(b"hello, truncation").unwrap().to_bytes();
        let cut = &bytes[..bytes.len() - 1];
        assert!(matches!(Blob::from_bytes(cut), Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_truncated_codebook() {
        let bytes = Blob::compress(b"abcdef").unwrap().to_bytes();
        let cut = &bytes[..HEADER_SIZE + 2];
        assert!(matches!(Blob::from_bytes(cut), Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let data = b"pool neighbours";
        let mut bytes = Blob::compress(data).unwrap().to_bytes();
        bytes.extend_from_slice(b"HC1\0next blob");
        let parsed = Blob::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.decompress().unwrap(), data);
    }

    #[test]
    fn test_ratio() {
        let header = BlobHeader {
            original_size: 100,
            code_count: 0,
            payload_bits: 0,
        };
        assert!((header.ratio(50) - 0.5).abs() < f64::EPSILON);
        let empty = BlobHeader {
            original_size: 0,
            code_count: 0,
            payload_bits: 0,
        };
        assert_eq!(empty.ratio(28), 0.0);
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Serialized blobs parse back and restore the input
        #[test]
        fn prop_blob_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
            let blob = Blob::compress(&data)?;
            let bytes = blob.to_bytes();
            prop_assert_eq!(bytes.len() as u64, blob.encoded_len());
            let parsed = Blob::from_bytes(&bytes)?;
            prop_assert_eq!(parsed.decompress()?, data);
        }

        /// Any bytes without the magic are rejected as a format error
        #[test]
        fn prop_bad_magic_rejected(mut bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            if bytes.starts_with(MAGIC) {
                bytes[0] ^= 0xFF;
            }
            let is_format_error = matches!(Blob::from_bytes(&bytes), Err(Error::Format { .. }));
            prop_assert!(is_format_error);
        }
    }
}
