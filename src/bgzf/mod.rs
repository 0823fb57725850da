//! Block-Compressed Container (BGZF)
//!
//! Produces gzip-compatible containers made of independently compressed
//! blocks, each no larger than 64 KiB. Any multi-member gzip decoder can
//! read the output; block-aware tools can additionally seek by block.
//!
//! ## Architecture
//!
//! ```text
//! bytes → BgzfWriter (0xff00 buffer) → BlockEncoder → sink
//!                                        (raw DEFLATE + header/footer)
//! ```

pub mod block;
pub mod reader;
pub mod writer;

pub use block::{
    BgzfError, BlockEncoder, BlockHeader, BLOCK_DATA_LIMIT, BLOCK_FOOTER_SIZE,
    BLOCK_HEADER_SIZE, DEFAULT_COMPRESSION_LEVEL, EOF_MARKER, MAX_BLOCK_SIZE,
    worst_case_block_size,
};
pub use reader::{BgzfReader, Block, ContainerScan};
pub use writer::{BgzfWriter, ContainerStats};
