//! BGZF Container Writer
//!
//! Buffers up to [`BLOCK_DATA_LIMIT`] bytes, compresses each full buffer as
//! one block, and terminates the container with [`EOF_MARKER`] on close.
//! Memory use is bounded by one uncompressed buffer plus one encoded block,
//! no matter how much is written.

use crate::bgzf::block::{BgzfError, BlockEncoder, BLOCK_DATA_LIMIT, EOF_MARKER};
use std::io::{self, Write};
use tracing::{debug, warn};

/// Counters reported when a container is closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Blocks written, including the EOF marker
    pub blocks: u64,
    /// Bytes accepted through `write`
    pub uncompressed_bytes: u64,
    /// Bytes written to the sink
    pub compressed_bytes: u64,
}

/// Writer producing a BGZF container on an arbitrary byte sink
pub struct BgzfWriter<W: Write> {
    sink: Option<W>,
    encoder: BlockEncoder,
    buffer: Vec<u8>,
    stats: ContainerStats,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer compressing at `level` (0-9)
    pub fn new(sink: W, level: u32) -> Self {
        BgzfWriter {
            sink: Some(sink),
            encoder: BlockEncoder::new(level),
            buffer: Vec::with_capacity(BLOCK_DATA_LIMIT),
            stats: ContainerStats::default(),
        }
    }

    /// Append bytes to the container, emitting a block each time the
    /// buffer fills.
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<(), BgzfError> {
        self.stats.uncompressed_bytes += bytes.len() as u64;

        while !bytes.is_empty() {
            let room = BLOCK_DATA_LIMIT - self.buffer.len();
            let take = room.min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];

            if self.buffer.len() == BLOCK_DATA_LIMIT {
                self.flush_block()?;
            }
        }

        debug_assert!(
            self.buffer.len() < BLOCK_DATA_LIMIT,
            "Postcondition: a full buffer is always flushed"
        );
        Ok(())
    }

    /// Counters so far (the EOF marker is counted once closed)
    pub fn stats(&self) -> ContainerStats {
        self.stats
    }

    /// Flush any buffered bytes as a final data block, append the EOF
    /// marker, and hand back the sink.
    pub fn close(mut self) -> Result<(W, ContainerStats), BgzfError> {
        if !self.buffer.is_empty() {
            self.flush_block()?;
        }

        let mut sink = self.sink.take().ok_or_else(sink_released)?;
        sink.write_all(&EOF_MARKER)?;
        sink.flush()?;

        self.stats.blocks += 1;
        self.stats.compressed_bytes += EOF_MARKER.len() as u64;

        debug!(
            blocks = self.stats.blocks,
            uncompressed_bytes = self.stats.uncompressed_bytes,
            compressed_bytes = self.stats.compressed_bytes,
            "container closed"
        );

        Ok((sink, self.stats))
    }

    /// Compress the current buffer into one block and write it out
    fn flush_block(&mut self) -> Result<(), BgzfError> {
        let sink = self.sink.as_mut().ok_or_else(sink_released)?;

        let block = self.encoder.encode(&self.buffer)?;
        sink.write_all(block)?;

        self.stats.blocks += 1;
        self.stats.compressed_bytes += block.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

fn sink_released() -> BgzfError {
    BgzfError::Io(io::Error::new(io::ErrorKind::Other, "sink already released"))
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_some() && self.stats.uncompressed_bytes > 0 {
            warn!(
                buffered = self.buffer.len(),
                blocks = self.stats.blocks,
                "BGZF writer dropped without close; container has no EOF marker"
            );
        }
    }
}
