//! BGZF Container Reader
//!
//! Decodes a container one block at a time, validating every block's
//! ISIZE and CRC32. Also implements [`std::io::Read`] over the
//! concatenated payloads so callers can wrap it in a `BufReader`.

use crate::bgzf::block::{
    BgzfError, BlockHeader, BLOCK_FOOTER_SIZE, EOF_MARKER, MAX_BLOCK_SIZE,
};
use flate2::{Decompress, FlushDecompress, Status};
use std::io::{self, Read};

/// One decoded block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Total on-disk size of the block
    pub compressed_len: usize,
    /// Inflated payload
    pub data: Vec<u8>,
}

impl Block {
    /// Whether this is a zero-length block
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Summary of a full pass over a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerScan {
    /// Total number of blocks
    pub blocks: u64,
    /// Blocks with a non-empty payload
    pub data_blocks: u64,
    /// Number of zero-length blocks anywhere in the container
    pub empty_blocks: u64,
    /// Sum of all inflated payload sizes
    pub uncompressed_bytes: u64,
    /// Sum of all block sizes
    pub compressed_bytes: u64,
    /// The last block is byte-identical to the standard EOF marker
    pub ends_with_eof_marker: bool,
}

/// Reader over a BGZF container
pub struct BgzfReader<R: Read> {
    inner: R,
    inflater: Decompress,
    current: Vec<u8>,
    position: usize,
}

impl<R: Read> BgzfReader<R> {
    pub fn new(inner: R) -> Self {
        BgzfReader {
            inner,
            inflater: Decompress::new(false),
            current: Vec::new(),
            position: 0,
        }
    }

    /// Read and validate the next block. Returns `None` at a clean end of
    /// stream (between blocks).
    pub fn read_block(&mut self) -> Result<Option<Block>, BgzfError> {
        let mut fixed = [0u8; BlockHeader::FIXED_LEN];
        if !read_exact_or_eof(&mut self.inner, &mut fixed)? {
            return Ok(None);
        }

        let extra_len = u16::from_le_bytes([fixed[10], fixed[11]]) as usize;
        let mut extra = vec![0u8; extra_len];
        read_exact_or_truncated(&mut self.inner, &mut extra)?;
        let header = BlockHeader::parse(&fixed, &extra)?;

        let mut rest = vec![0u8; header.remaining()];
        read_exact_or_truncated(&mut self.inner, &mut rest)?;

        let (payload, footer) = rest.split_at(rest.len() - BLOCK_FOOTER_SIZE);
        let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let expected_len =
            u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;
        if expected_len > MAX_BLOCK_SIZE {
            return Err(BgzfError::InvalidHeader(format!(
                "ISIZE {} exceeds the block limit",
                expected_len
            )));
        }

        let data = self.inflate(payload, expected_len)?;
        let actual_crc = crc32fast::hash(&data);
        if actual_crc != expected_crc {
            return Err(BgzfError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        Ok(Some(Block {
            compressed_len: header.block_size,
            data,
        }))
    }

    /// Walk every remaining block, validating each one
    pub fn scan(mut self) -> Result<ContainerScan, BgzfError> {
        let mut scan = ContainerScan::default();
        let mut last_was_marker = false;

        while let Some(block) = self.read_block()? {
            scan.blocks += 1;
            scan.compressed_bytes += block.compressed_len as u64;
            scan.uncompressed_bytes += block.data.len() as u64;
            if block.is_empty() {
                scan.empty_blocks += 1;
            } else {
                scan.data_blocks += 1;
            }
            last_was_marker = block.is_empty() && block.compressed_len == EOF_MARKER.len();
        }

        scan.ends_with_eof_marker = last_was_marker;
        Ok(scan)
    }

    fn inflate(&mut self, payload: &[u8], expected_len: usize) -> Result<Vec<u8>, BgzfError> {
        self.inflater.reset(false);
        // At least one byte of room so an empty stream can still report its end
        let mut data = Vec::with_capacity(expected_len.max(1));
        let status = self
            .inflater
            .decompress_vec(payload, &mut data, FlushDecompress::Finish)
            .map_err(|e| BgzfError::Inflate(e.to_string()))?;

        if status != Status::StreamEnd {
            return Err(BgzfError::Inflate(format!(
                "stream did not end ({:?}) after {} of {} bytes",
                status,
                data.len(),
                expected_len
            )));
        }
        if data.len() != expected_len {
            return Err(BgzfError::LengthMismatch {
                expected: expected_len,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.current.len() {
            match self.read_block() {
                Ok(Some(block)) => {
                    self.current = block.data;
                    self.position = 0;
                }
                Ok(None) => return Ok(0),
                Err(BgzfError::Io(e)) => return Err(e),
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }
        }

        let available = &self.current[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Fill `buf` completely. Returns `false` if the stream was already at EOF
/// before the first byte; EOF after a partial read is `Truncated`.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, BgzfError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(BgzfError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(BgzfError::Io(e)),
        }
    }
    Ok(true)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), BgzfError> {
    if buf.is_empty() || read_exact_or_eof(reader, buf)? {
        Ok(())
    } else {
        Err(BgzfError::Truncated)
    }
}
