//! Streaming Merge-Join Engine
//!
//! Aligns N association sources against one canonical variant stream and
//! writes the combined rows through a [`BgzfWriter`].
//!
//! ## Row Loop
//!
//! ```text
//! canonical line ──┬── key prefix (through 4th tab)
//!                  │
//!   for each source in order:
//!     head key == key ──► check prefix + field count, copy suffix, advance
//!     otherwise       ──► copy precomputed blank run, stay put
//!                  │
//!               "\n", advance canonical
//! ```
//!
//! Every source must be a subsequence of the canonical stream. Nothing is
//! sorted or buffered; a source that falls out of order is left with
//! unconsumed lines and reported once the canonical stream ends.

use crate::bgzf::{BgzfWriter, ContainerStats};
use crate::config::{MatrixConfig, TrailingLinesPolicy};
use crate::matrix::error::{display_line, MatrixError};
use crate::matrix::line_source::LineSource;
use crate::matrix::schema::{count_fields, split_fields, FIELD_DELIMITER};
use crate::matrix::source::{
    validate_source_ids, AssociationSource, CanonicalSource, SourceInput, HEADER_COMMENT,
};
use std::io::Write;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of leading fields forming the variant key
const KEY_FIELDS: usize = 4;

/// Counters for one completed merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Data rows written (header excluded)
    pub rows: u64,
    /// Rows each source contributed values to, in source order
    pub matched: Vec<(String, u64)>,
    pub container: ContainerStats,
}

/// Result of [`MergeEngine::merge_into`]
#[derive(Debug)]
pub struct MergeOutcome<W> {
    /// The sink, with the closed container written to it
    pub sink: W,
    pub stats: MergeStats,
}

/// Merge engine over one canonical source and N association sources
pub struct MergeEngine<S: LineSource> {
    canonical: CanonicalSource<S>,
    sources: Vec<AssociationSource<S>>,
    comment_header: bool,
    compression_level: u32,
    trailing_lines: TrailingLinesPolicy,
    progress_interval: u64,
}

impl<S: LineSource> MergeEngine<S> {
    /// Read and validate every header. On return each source is positioned
    /// on its first data line.
    pub fn open(
        canonical: SourceInput<S>,
        sources: Vec<SourceInput<S>>,
        config: &MatrixConfig,
    ) -> Result<Self, MatrixError> {
        config.validate()?;
        validate_source_ids(sources.iter().map(|s| s.id.as_str()))?;

        let canonical = CanonicalSource::open(canonical)?;
        let sources = sources
            .into_iter()
            .map(|input| {
                AssociationSource::open(input, &canonical.schema, &config.output.missing_value)
            })
            .collect::<Result<Vec<_>, _>>()?;

        for source in &sources {
            debug!(
                source = %source.id,
                fields = source.field_count(),
                "association source opened"
            );
        }
        info!(
            canonical = %canonical.id,
            canonical_fields = canonical.schema.len(),
            sources = sources.len(),
            "merge engine ready"
        );

        Ok(MergeEngine {
            canonical,
            sources,
            comment_header: config.output.comment_header,
            compression_level: config.output.compression_level,
            trailing_lines: config.merge.trailing_lines,
            progress_interval: config.merge.progress_interval,
        })
    }

    /// Association source ids, in output column order
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }

    /// The combined header line, terminator included
    pub fn header_line(&self) -> Vec<u8> {
        let mut header = String::new();
        if self.comment_header {
            header.push(HEADER_COMMENT as char);
        }
        header.push_str(&self.canonical.schema.fields().join("\t"));
        for source in &self.sources {
            for column in source.header_columns() {
                header.push(FIELD_DELIMITER as char);
                header.push_str(&column);
            }
        }
        header.push('\n');
        header.into_bytes()
    }

    /// Run the merge to completion, writing one BGZF container to `sink`
    pub fn merge_into<W: Write>(mut self, sink: W) -> Result<MergeOutcome<W>, MatrixError> {
        let started = Instant::now();
        let mut writer = BgzfWriter::new(sink, self.compression_level);
        writer.write(&self.header_line())?;

        let canonical_fields = self.canonical.schema.len();
        let mut rows: u64 = 0;

        while let Some(line) = self.canonical.reader.current() {
            let found = count_fields(line);
            if found != canonical_fields {
                return Err(MatrixError::Format {
                    source_id: self.canonical.id.clone(),
                    line_number: self.canonical.reader.line_number(),
                    reason: format!("expected {} fields, found {}", canonical_fields, found),
                    line: display_line(line),
                });
            }

            let key_end = key_len(line);
            writer.write(line)?;

            for source in self.sources.iter_mut() {
                let candidate = match source.reader.current() {
                    Some(candidate) if same_variant(candidate, line, key_end) => candidate,
                    _ => {
                        writer.write(&source.blanks)?;
                        continue;
                    }
                };

                if !has_prefix(candidate, line) {
                    return Err(alignment_error(
                        &source.id,
                        candidate,
                        line,
                        self.canonical.schema.fields(),
                    ));
                }

                let expected = canonical_fields + source.field_count();
                let found = count_fields(candidate);
                if found != expected {
                    return Err(MatrixError::Format {
                        source_id: source.id.clone(),
                        line_number: source.reader.line_number(),
                        reason: format!("expected {} fields, found {}", expected, found),
                        line: display_line(candidate),
                    });
                }

                writer.write(&candidate[line.len()..])?;
                source.matched += 1;
                source
                    .reader
                    .advance()
                    .map_err(|e| MatrixError::source_io(&source.id, e))?;
            }

            writer.write(b"\n")?;
            rows += 1;
            if self.progress_interval > 0 && rows % self.progress_interval == 0 {
                info!(
                    rows,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "merge progress"
                );
            }

            self.canonical
                .reader
                .advance()
                .map_err(|e| MatrixError::source_io(&self.canonical.id, e))?;
        }

        self.check_trailing_lines()?;

        let (sink, container) = writer.close()?;
        let stats = MergeStats {
            rows,
            matched: self
                .sources
                .iter()
                .map(|s| (s.id.clone(), s.matched))
                .collect(),
            container,
        };

        info!(
            rows,
            sources = self.sources.len(),
            blocks = container.blocks,
            compressed_bytes = container.compressed_bytes,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "merge complete"
        );

        Ok(MergeOutcome { sink, stats })
    }

    /// Every source must be exhausted once the canonical stream is
    fn check_trailing_lines(&self) -> Result<(), MatrixError> {
        for source in &self.sources {
            let Some(line) = source.reader.current() else {
                continue;
            };

            match self.trailing_lines {
                TrailingLinesPolicy::Fail => {
                    return Err(MatrixError::Alignment {
                        source_id: source.id.clone(),
                        reason: format!(
                            "line {} was never matched; the variant is missing from the \
                             canonical stream or out of canonical order",
                            source.reader.line_number()
                        ),
                        source_line: display_line(line),
                        canonical_line: "<end of canonical stream>".to_string(),
                    });
                }
                TrailingLinesPolicy::Ignore => {
                    warn!(
                        source = %source.id,
                        line_number = source.reader.line_number(),
                        line = %display_line(line),
                        "source has unmatched lines after the canonical stream ended"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Byte length of the variant key: up to the 4th tab, or the whole line
/// when it has exactly four fields.
fn key_len(line: &[u8]) -> usize {
    memchr::memchr_iter(FIELD_DELIMITER, line)
        .nth(KEY_FIELDS - 1)
        .unwrap_or(line.len())
}

/// Whether `candidate` has the same variant key as `canonical`
fn same_variant(candidate: &[u8], canonical: &[u8], key_end: usize) -> bool {
    candidate.len() >= key_end
        && candidate[..key_end] == canonical[..key_end]
        && (candidate.len() == key_end || candidate[key_end] == FIELD_DELIMITER)
}

/// Whether `candidate` starts with all of `canonical`'s fields
fn has_prefix(candidate: &[u8], canonical: &[u8]) -> bool {
    candidate.starts_with(canonical)
        && (candidate.len() == canonical.len() || candidate[canonical.len()] == FIELD_DELIMITER)
}

fn alignment_error(
    source_id: &str,
    candidate: &[u8],
    canonical: &[u8],
    names: &[String],
) -> MatrixError {
    let ours = split_fields(candidate);
    let theirs = split_fields(canonical);

    let reason = match theirs
        .iter()
        .enumerate()
        .find(|(i, field)| ours.get(*i) != Some(*field))
    {
        Some((i, field)) => format!(
            "field `{}` is `{}` but the canonical stream has `{}`",
            names.get(i).map(String::as_str).unwrap_or("?"),
            ours.get(i).map(|f| display_line(f)).unwrap_or_default(),
            display_line(field)
        ),
        None => "per-variant fields differ from the canonical stream".to_string(),
    };

    MatrixError::Alignment {
        source_id: source_id.to_string(),
        reason,
        source_line: display_line(candidate),
        canonical_line: display_line(canonical),
    }
}
