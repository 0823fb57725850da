pub mod bgzf;
pub mod build;
pub mod config;
pub mod discovery;
pub mod fd;
pub mod freshness;
pub mod logging;
pub mod matrix;

pub use bgzf::{BgzfError, BgzfReader, BgzfWriter, ContainerStats};
pub use build::{build_matrix, BuildOutcome, BuildRequest};
pub use config::{MatrixConfig, TrailingLinesPolicy};
pub use matrix::{MatrixError, MergeEngine, MergeStats};
