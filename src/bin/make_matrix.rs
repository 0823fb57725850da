//! Matrix Builder
//!
//! Merges every association source with the canonical variant list into
//! one BGZF-compressed matrix. Exits 0 when the matrix was written or is
//! already up to date.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | RUST_LOG | info | Log filter (overrides `[logging] filter`) |
//! | PHENO_MATRIX_COMPRESSION_LEVEL | 6 | DEFLATE level, 0-9 |
//! | PHENO_MATRIX_COMMENT_HEADER | true | Prefix the header with `#` |
//! | PHENO_MATRIX_MISSING_VALUE | (empty) | Placeholder for absent values |
//! | PHENO_MATRIX_TRAILING_LINES | fail | fail or ignore |
//! | PHENO_MATRIX_PROGRESS_INTERVAL | 1000000 | Rows between progress logs |
//! | PHENO_MATRIX_FD_HEADROOM | 100 | Extra file descriptors to reserve |
//! | PHENO_MATRIX_LOG_FORMAT | text | text or json |
//!
//! Command-line flags win over the environment, which wins over `--config`.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::Parser;
use pheno_matrix::config::{MatrixConfig, TrailingLinesPolicy, COMPRESSION_LEVEL_MAX};
use pheno_matrix::logging::init_logging;
use pheno_matrix::{build_matrix, BuildOutcome, BuildRequest, MatrixError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "make-matrix",
    version,
    about = "Merge per-phenotype association files into one BGZF matrix"
)]
struct Args {
    /// Canonical variant file (must start with chrom, pos, ref, alt)
    #[arg(long)]
    canonical: PathBuf,

    /// Directory of association files, or a glob pattern
    #[arg(long)]
    sources: String,

    /// Output container path
    #[arg(long)]
    output: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rebuild even if the output is up to date
    #[arg(long)]
    force: bool,

    /// Warn instead of failing when a source has unmatched lines at the end
    #[arg(long)]
    allow_trailing: bool,

    /// Do not prefix the header line with `#`
    #[arg(long)]
    no_comment_header: bool,

    /// DEFLATE compression level
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=COMPRESSION_LEVEL_MAX as i64))]
    level: Option<u32>,
}

fn load_config(args: &Args) -> Result<MatrixConfig, MatrixError> {
    let mut config = match &args.config {
        Some(path) => MatrixConfig::from_file(path)?,
        None => MatrixConfig::default(),
    };
    config.apply_env()?;

    if args.allow_trailing {
        config.merge.trailing_lines = TrailingLinesPolicy::Ignore;
    }
    if args.no_comment_header {
        config.output.comment_header = false;
    }
    if let Some(level) = args.level {
        config.output.compression_level = level;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&Default::default());
            error!(error = %e, "invalid configuration");
            eprintln!("make-matrix: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    let request = BuildRequest {
        canonical: args.canonical,
        sources: args.sources,
        output: args.output,
        force: args.force,
    };

    match build_matrix(&request, &config) {
        Ok(BuildOutcome::UpToDate) => {
            info!("nothing to do");
            ExitCode::SUCCESS
        }
        Ok(BuildOutcome::Built(stats)) => {
            info!(rows = stats.rows, sources = stats.matched.len(), "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, source_id = e.source_id().unwrap_or("-"), "matrix build failed");
            eprintln!("make-matrix: {}", e);
            ExitCode::FAILURE
        }
    }
}
