//! Output Freshness
//!
//! Decides whether an existing matrix can be kept. It is current when its
//! header names exactly the present source ids, it was written with the
//! same output settings, and no input was modified after it.
//!
//! The output settings are recorded in a TOML sidecar next to the matrix:
//!
//! ```text
//! matrix.tsv.gz            container
//! matrix.tsv.gz.settings   [output] table it was written with
//! ```

use crate::bgzf::BgzfReader;
use crate::config::OutputConfig;
use crate::discovery::DiscoveredSource;
use crate::matrix::source::{HEADER_COMMENT, SOURCE_ID_SEPARATOR};
use crate::matrix::MatrixError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Verdict on an existing output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// No output yet
    Missing,
    /// The output exists but its header cannot be read
    Unreadable(String),
    /// Sources were added or removed since the output was built
    SourcesChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// The output was written with other output settings, or they were
    /// not recorded
    ConfigChanged,
    /// An input was modified after the output
    InputsNewer { newest: PathBuf },
    UpToDate,
}

impl Freshness {
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Freshness::UpToDate)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsRecord {
    output: OutputConfig,
}

/// Path of the sidecar recording the output settings of `output`
pub fn settings_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".settings");
    PathBuf::from(name)
}

/// Record the settings `output` was written with. The sidecar is written
/// to a temporary file and renamed into place.
pub fn write_settings(output: &Path, settings: &OutputConfig) -> Result<(), MatrixError> {
    let record = SettingsRecord {
        output: settings.clone(),
    };
    let text = toml::to_string(&record).map_err(|e| MatrixError::Config(e.to_string()))?;

    let path = settings_path(output);
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Remove the settings sidecar of `output`, if any
pub fn clear_settings(output: &Path) -> Result<(), MatrixError> {
    match std::fs::remove_file(settings_path(output)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Settings recorded for `output`, or `None` when the sidecar is missing
/// or cannot be parsed
pub fn read_settings(output: &Path) -> Option<OutputConfig> {
    let path = settings_path(output);
    let text = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<SettingsRecord>(&text) {
        Ok(record) => Some(record.output),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring malformed settings record");
            None
        }
    }
}

/// Compare an existing output against its inputs and the output settings
/// it would be written with now
pub fn check_freshness(
    output: &Path,
    canonical: &Path,
    sources: &[DiscoveredSource],
    settings: &OutputConfig,
) -> Result<Freshness, MatrixError> {
    let output_mtime = match std::fs::metadata(output) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Freshness::Missing),
        Err(e) => return Err(e.into()),
    };

    let built_from = match header_source_ids(output) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(output = %output.display(), error = %e, "existing output is unreadable");
            return Ok(Freshness::Unreadable(e.to_string()));
        }
    };

    let current: BTreeSet<String> = sources.iter().map(|s| s.id.clone()).collect();
    if built_from != current {
        let added = current.difference(&built_from).cloned().collect();
        let removed = built_from.difference(&current).cloned().collect();
        return Ok(Freshness::SourcesChanged { added, removed });
    }

    if read_settings(output).as_ref() != Some(settings) {
        return Ok(Freshness::ConfigChanged);
    }

    let inputs = std::iter::once(canonical).chain(sources.iter().map(|s| s.path.as_path()));
    let mut newest: Option<(SystemTime, &Path)> = None;
    for path in inputs {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| MatrixError::Resource(format!("cannot stat {}: {}", path.display(), e)))?;
        if newest.map_or(true, |(t, _)| modified > t) {
            newest = Some((modified, path));
        }
    }

    match newest {
        Some((modified, path)) if modified > output_mtime => Ok(Freshness::InputsNewer {
            newest: path.to_path_buf(),
        }),
        _ => {
            debug!(output = %output.display(), "output is up to date");
            Ok(Freshness::UpToDate)
        }
    }
}

/// Source ids named by the `<field>@<id>` columns of a matrix header
pub fn header_source_ids(path: &Path) -> Result<BTreeSet<String>, MatrixError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(BgzfReader::new(BufReader::new(file)));

    let mut header = String::new();
    reader.read_line(&mut header)?;
    let header = header.trim_end_matches(['\n', '\r']);
    let header = header
        .strip_prefix(HEADER_COMMENT as char)
        .unwrap_or(header);

    Ok(header
        .split('\t')
        .filter_map(|column| column.rsplit_once(SOURCE_ID_SEPARATOR))
        .map(|(_, id)| id.to_string())
        .collect())
}
