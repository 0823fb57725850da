//! Matrix Merge
//!
//! Joins one canonical variant stream with N association streams into a
//! single wide table, keyed on (chrom, pos, ref, alt).
//!
//! ## Architecture
//!
//! ```text
//! path ─► open_path ─► LineSource ─► SourceInput ─┐
//!                                                  ├─► MergeEngine ─► BgzfWriter ─► sink
//! canonical ───────────────────────────────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod line_source;
pub mod schema;
pub mod source;

pub use engine::{MergeEngine, MergeOutcome, MergeStats};
pub use error::MatrixError;
pub use line_source::{open_path, FileLineSource, LineSource, TextLineSource};
pub use schema::{Schema, CPRA_FIELDS, FIELD_DELIMITER};
pub use source::{
    source_id_from_path, validate_source_ids, AssociationSource, CanonicalSource, SourceInput,
};
