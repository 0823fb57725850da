//! BGZF Block Format
//!
//! A container is a sequence of independently compressed gzip members
//! ("blocks"). Each block carries its own total length in a gzip extra
//! subfield, which is what makes the container seekable by block offset.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Header (18 bytes)                │
//! │ - ID1 ID2 CM FLG: 1f 8b 08 04    │
//! │ - MTIME: 0 (u32)                 │
//! │ - XFL OS: 00 ff                  │
//! │ - XLEN: 6 (u16 LE)               │
//! │ - subfield 'B' 'C', SLEN 2       │
//! │ - BSIZE - 1 (u16 LE)             │
//! ├──────────────────────────────────┤
//! │ Raw DEFLATE payload (variable)   │
//! ├──────────────────────────────────┤
//! │ Footer (8 bytes)                 │
//! │ - CRC32 of uncompressed data     │
//! │ - ISIZE: uncompressed length     │
//! └──────────────────────────────────┘
//! ```
//!
//! The container always ends with [`EOF_MARKER`], an empty block.

use flate2::{Compress, Compression, FlushCompress, Status};

/// Maximum uncompressed payload per block (255 * 256).
pub const BLOCK_DATA_LIMIT: usize = 0xff00;
/// Maximum total size of a block; BSIZE - 1 must fit in a u16.
pub const MAX_BLOCK_SIZE: usize = 0x10000;
/// Header size in bytes
pub const BLOCK_HEADER_SIZE: usize = 18;
/// Footer size in bytes
pub const BLOCK_FOOTER_SIZE: usize = 8;
/// Compression level used when nothing else is configured (zlib's default).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Fixed block header. Bytes 16..18 are patched with BSIZE - 1 per block.
pub const BLOCK_HEADER: [u8; BLOCK_HEADER_SIZE] = [
    0x1f, 0x8b, // gzip magic
    0x08, // CM = deflate
    0x04, // FLG = FEXTRA
    0x00, 0x00, 0x00, 0x00, // MTIME (none, keeps output reproducible)
    0x00, // XFL
    0xff, // OS = unknown
    0x06, 0x00, // XLEN = 6
    b'B', b'C', // subfield identifier
    0x02, 0x00, // SLEN = 2
    0x00, 0x00, // BSIZE - 1, filled in once the payload length is known
];

/// The empty block that terminates every container.
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, b'B', b'C', 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Error types for the block codec
#[derive(Debug, thiserror::Error)]
pub enum BgzfError {
    /// The deflate/inflate engine reported a failure
    #[error("deflate failed: {0}")]
    Codec(String),
    /// A compressed block does not fit the 16-bit BSIZE field
    #[error("compressed block of {size} bytes exceeds the {limit}-byte block limit")]
    BlockOverflow { size: usize, limit: usize },
    /// I/O error on the sink or source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Block header is not a BGZF header
    #[error("invalid block header: {0}")]
    InvalidHeader(String),
    /// Stream ended in the middle of a block
    #[error("container truncated inside a block")]
    Truncated,
    /// Footer CRC32 does not match the inflated payload
    #[error("block checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Footer ISIZE does not match the inflated payload
    #[error("block length mismatch: footer says {expected} bytes, inflated {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// Compressed payload could not be inflated
    #[error("inflate failed: {0}")]
    Inflate(String),
}

/// Upper bound on raw DEFLATE output for `len` input bytes (zlib's
/// `compressBound`, which also covers the wrapper-less format).
pub fn deflate_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

/// Largest block `len` payload bytes can encode to, header and footer included
pub fn worst_case_block_size(len: usize) -> usize {
    BLOCK_HEADER_SIZE + deflate_bound(len) + BLOCK_FOOTER_SIZE
}

/// Compresses uncompressed payloads into complete blocks.
///
/// Holds one deflate stream that is reset per block, plus a scratch
/// buffer sized for the worst case, so steady-state encoding allocates
/// nothing.
pub struct BlockEncoder {
    compressor: Compress,
    scratch: Vec<u8>,
}

impl BlockEncoder {
    /// Create an encoder at the given compression level (0-9)
    pub fn new(level: u32) -> Self {
        debug_assert!(level <= 9, "Precondition: compression level must be 0-9");
        debug_assert!(
            worst_case_block_size(BLOCK_DATA_LIMIT) <= MAX_BLOCK_SIZE,
            "Invariant: a full block of incompressible data must fit BSIZE"
        );

        BlockEncoder {
            // `false`: no zlib header/trailer, the gzip framing is ours
            compressor: Compress::new(Compression::new(level), false),
            scratch: Vec::with_capacity(worst_case_block_size(BLOCK_DATA_LIMIT)),
        }
    }

    /// Encode `data` as one complete block. The returned slice borrows the
    /// encoder's scratch buffer and is valid until the next call.
    pub fn encode(&mut self, data: &[u8]) -> Result<&[u8], BgzfError> {
        debug_assert!(
            data.len() <= BLOCK_DATA_LIMIT,
            "Precondition: block payload must not exceed BLOCK_DATA_LIMIT"
        );

        self.scratch.clear();
        self.scratch.extend_from_slice(&BLOCK_HEADER);
        self.scratch
            .reserve(worst_case_block_size(data.len()) - BLOCK_HEADER_SIZE);

        self.compressor.reset();
        let status = self
            .compressor
            .compress_vec(data, &mut self.scratch, FlushCompress::Finish)
            .map_err(|e| BgzfError::Codec(e.to_string()))?;

        match status {
            Status::StreamEnd => {}
            Status::Ok | Status::BufError => {
                // Output space ran out before the stream could finish
                return Err(BgzfError::BlockOverflow {
                    size: worst_case_block_size(data.len()),
                    limit: MAX_BLOCK_SIZE,
                });
            }
        }
        if self.compressor.total_in() != data.len() as u64 {
            return Err(BgzfError::Codec(format!(
                "deflate consumed {} of {} bytes",
                self.compressor.total_in(),
                data.len()
            )));
        }

        let block_size = self.scratch.len() + BLOCK_FOOTER_SIZE;
        if block_size > MAX_BLOCK_SIZE {
            return Err(BgzfError::BlockOverflow {
                size: block_size,
                limit: MAX_BLOCK_SIZE,
            });
        }

        let bsize_minus_one = (block_size - 1) as u16;
        self.scratch[16..18].copy_from_slice(&bsize_minus_one.to_le_bytes());
        self.scratch
            .extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        self.scratch
            .extend_from_slice(&(data.len() as u32).to_le_bytes());

        debug_assert_eq!(
            self.scratch.len(),
            block_size,
            "Postcondition: encoded size must match BSIZE"
        );

        Ok(&self.scratch)
    }
}

/// Parsed fixed part of a block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Total block size including header and footer
    pub block_size: usize,
    /// Length of the gzip extra field
    pub extra_len: usize,
}

impl BlockHeader {
    /// Length of the gzip header before the extra field
    pub const FIXED_LEN: usize = 12;

    /// Parse a block header from its fixed 12 bytes plus the extra field.
    pub fn parse(fixed: &[u8; Self::FIXED_LEN], extra: &[u8]) -> Result<Self, BgzfError> {
        if fixed[0..3] != BLOCK_HEADER[0..3] {
            return Err(BgzfError::InvalidHeader(format!(
                "bad magic {:02x?}",
                &fixed[0..3]
            )));
        }
        if fixed[3] & 0x04 == 0 {
            return Err(BgzfError::InvalidHeader(
                "FEXTRA flag not set".to_string(),
            ));
        }

        let extra_len = u16::from_le_bytes([fixed[10], fixed[11]]) as usize;
        debug_assert_eq!(extra.len(), extra_len, "Precondition: caller read XLEN bytes");

        let mut offset = 0;
        while offset + 4 <= extra.len() {
            let (si1, si2) = (extra[offset], extra[offset + 1]);
            let slen = u16::from_le_bytes([extra[offset + 2], extra[offset + 3]]) as usize;
            let value = offset + 4;
            if value + slen > extra.len() {
                break;
            }
            if si1 == b'B' && si2 == b'C' && slen == 2 {
                let bsize = u16::from_le_bytes([extra[value], extra[value + 1]]) as usize + 1;
                let minimum = Self::FIXED_LEN + extra_len + BLOCK_FOOTER_SIZE;
                if bsize < minimum {
                    return Err(BgzfError::InvalidHeader(format!(
                        "BSIZE {} smaller than header and footer ({})",
                        bsize, minimum
                    )));
                }
                return Ok(BlockHeader {
                    block_size: bsize,
                    extra_len,
                });
            }
            offset = value + slen;
        }

        Err(BgzfError::InvalidHeader(
            "missing BC subfield".to_string(),
        ))
    }

    /// Bytes remaining after the header: payload plus footer
    pub fn remaining(&self) -> usize {
        self.block_size - Self::FIXED_LEN - self.extra_len
    }
}
