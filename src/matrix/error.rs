//! Merge error taxonomy
//!
//! Every variant is fatal for the run. Messages always name the source
//! that caused the failure and, where there is one, the offending line.

use crate::bgzf::BgzfError;

/// Error type for building a matrix
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// A header is missing or does not start with the canonical fields
    #[error("schema error in source `{source_id}`: {reason}")]
    Schema { source_id: String, reason: String },

    /// A source disagrees with the canonical stream
    #[error(
        "alignment error in source `{source_id}`: {reason} \
         [source line = {source_line}] [canonical line = {canonical_line}]"
    )]
    Alignment {
        source_id: String,
        reason: String,
        source_line: String,
        canonical_line: String,
    },

    /// A data line has the wrong number of fields for its header
    #[error("format error in source `{source_id}` at line {line_number}: {reason} [line = {line}]")]
    Format {
        source_id: String,
        line_number: u64,
        reason: String,
        line: String,
    },

    /// File handles could not be provided or a source could not be opened
    #[error("resource error: {0}")]
    Resource(String),

    /// Reading a source failed part-way
    #[error("I/O error reading source `{source_id}`: {error}")]
    SourceIo {
        source_id: String,
        #[source]
        error: std::io::Error,
    },

    /// The block codec failed
    #[error("codec error: {0}")]
    Codec(#[from] BgzfError),

    /// Configuration could not be loaded or is invalid
    #[error("config error: {0}")]
    Config(String),

    /// Output-side I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatrixError {
    pub(crate) fn schema(source_id: &str, reason: impl Into<String>) -> Self {
        MatrixError::Schema {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn source_io(source_id: &str, error: std::io::Error) -> Self {
        MatrixError::SourceIo {
            source_id: source_id.to_string(),
            error,
        }
    }

    /// Identifier of the source this error is about, if any
    pub fn source_id(&self) -> Option<&str> {
        match self {
            MatrixError::Schema { source_id, .. }
            | MatrixError::Alignment { source_id, .. }
            | MatrixError::Format { source_id, .. }
            | MatrixError::SourceIo { source_id, .. } => Some(source_id),
            _ => None,
        }
    }
}

/// Render a raw line for an error message
pub(crate) fn display_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
