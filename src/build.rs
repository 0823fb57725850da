//! Matrix Build
//!
//! One full run: discover sources, decide whether the existing output is
//! current, open every input, merge into `<output>.tmp`, and rename it
//! into place once the container is closed. The output settings are
//! recorded next to the container after the rename.

use crate::config::MatrixConfig;
use crate::discovery::{discover_sources, DiscoveredSource};
use crate::fd::ensure_open_file_limit;
use crate::freshness::{check_freshness, clear_settings, write_settings, Freshness};
use crate::matrix::{
    open_path, validate_source_ids, FileLineSource, MatrixError, MergeEngine, MergeStats,
    SourceInput,
};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output buffer in front of the container file
const OUTPUT_BUFFER_SIZE: usize = 256 * 1024;

/// Inputs and output of one build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Canonical variant stream
    pub canonical: PathBuf,
    /// Directory or glob pattern naming the association sources
    pub sources: String,
    /// Final container path
    pub output: PathBuf,
    /// Rebuild even if the output looks current
    pub force: bool,
}

/// What a build did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The existing output was kept
    UpToDate,
    Built(MergeStats),
}

/// Path the container is written to before the final rename
pub fn temp_output_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Run one build to completion
pub fn build_matrix(
    request: &BuildRequest,
    config: &MatrixConfig,
) -> Result<BuildOutcome, MatrixError> {
    config.validate()?;
    let started = Instant::now();

    let sources = discover_sources(&request.sources)?;
    validate_source_ids(sources.iter().map(|s| s.id.as_str()))?;
    info!(
        canonical = %request.canonical.display(),
        sources = sources.len(),
        output = %request.output.display(),
        "starting matrix build"
    );

    if request.force {
        debug!("rebuild forced");
    } else {
        let freshness = check_freshness(
            &request.output,
            &request.canonical,
            &sources,
            &config.output,
        )?;
        if freshness.is_up_to_date() {
            info!(output = %request.output.display(), "matrix is up to date");
            return Ok(BuildOutcome::UpToDate);
        }
        match freshness {
            Freshness::Missing => debug!("no existing output"),
            stale => info!(reason = ?stale, "existing output is stale, rebuilding"),
        }
    }

    if config.resources.raise_fd_limit {
        ensure_open_file_limit(sources.len() as u64 + config.resources.fd_headroom)?;
    }

    let canonical = open_input("canonical", &request.canonical)?;
    let inputs = sources
        .iter()
        .map(|DiscoveredSource { id, path }| {
            open_input(id, path).map(|reader| SourceInput::new(id.as_str(), reader))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let engine = MergeEngine::open(SourceInput::new("canonical", canonical), inputs, config)?;

    let tmp = temp_output_path(&request.output);
    let stats = match write_output(engine, &tmp) {
        Ok(stats) => stats,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove temporary output");
                }
            }
            return Err(e);
        }
    };
    // A crash between the rename and the new record leaves no record, never a stale one
    clear_settings(&request.output)?;
    std::fs::rename(&tmp, &request.output)?;
    write_settings(&request.output, &config.output)?;

    info!(
        rows = stats.rows,
        compressed_bytes = stats.container.compressed_bytes,
        elapsed_secs = started.elapsed().as_secs_f64(),
        output = %request.output.display(),
        "matrix written"
    );
    Ok(BuildOutcome::Built(stats))
}

fn open_input(id: &str, path: &Path) -> Result<FileLineSource, MatrixError> {
    open_path(path).map_err(|e| {
        MatrixError::Resource(format!("cannot open `{}` ({}): {}", id, path.display(), e))
    })
}

fn write_output(engine: MergeEngine<FileLineSource>, tmp: &Path) -> Result<MergeStats, MatrixError> {
    let file = File::create(tmp)?;
    let outcome = engine.merge_into(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file))?;

    let mut sink = outcome.sink;
    sink.flush()?;
    let file = sink.into_inner().map_err(|e| MatrixError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(outcome.stats)
}
