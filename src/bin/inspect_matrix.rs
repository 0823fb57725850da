//! Matrix Inspector
//!
//! Validates every block of a matrix container and prints a summary:
//! block and byte counts, whether the EOF marker is present, and the
//! source ids named in the header.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::Parser;
use pheno_matrix::bgzf::BgzfReader;
use pheno_matrix::config::LoggingConfig;
use pheno_matrix::freshness::header_source_ids;
use pheno_matrix::logging::init_logging;
use pheno_matrix::MatrixError;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, warn};

#[derive(Parser, Debug)]
#[command(name = "inspect-matrix", version, about = "Validate and summarise a matrix container")]
struct Args {
    /// Container to inspect
    path: PathBuf,
}

fn inspect(path: &Path) -> Result<bool, MatrixError> {
    let scan = BgzfReader::new(BufReader::new(File::open(path)?)).scan()?;
    let ids = header_source_ids(path)?;

    println!("Matrix: {}", path.display());
    println!("  Blocks:             {}", scan.blocks);
    println!("  Data blocks:        {}", scan.data_blocks);
    println!("  Empty blocks:       {}", scan.empty_blocks);
    println!("  Uncompressed bytes: {}", scan.uncompressed_bytes);
    println!("  Compressed bytes:   {}", scan.compressed_bytes);
    println!("  EOF marker:         {}", if scan.ends_with_eof_marker { "yes" } else { "MISSING" });
    println!("  Sources ({}):", ids.len());
    for id in &ids {
        println!("    {}", id);
    }

    if !scan.ends_with_eof_marker {
        warn!(path = %path.display(), "container does not end with the EOF marker");
    }
    Ok(scan.ends_with_eof_marker)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&LoggingConfig::default());

    match inspect(&args.path) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, path = %args.path.display(), "inspection failed");
            eprintln!("inspect-matrix: {}", e);
            ExitCode::FAILURE
        }
    }
}
