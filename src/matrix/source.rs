//! Merge inputs
//!
//! Wraps a [`LineSource`] with the identity and schema the merge needs.
//! Constructing a source consumes its header line, so the cursor is left
//! on the first data line (or exhausted).

use crate::matrix::error::MatrixError;
use crate::matrix::line_source::LineSource;
use crate::matrix::schema::{Schema, FIELD_DELIMITER};
use std::collections::HashSet;
use std::path::Path;

/// Prefix some tools put in front of a header line
pub const HEADER_COMMENT: u8 = b'#';

/// Separator between a field name and its source id in the combined header
pub const SOURCE_ID_SEPARATOR: char = '@';

/// Suffix stripped from file names when deriving source ids
const GZIP_SUFFIX: &str = ".gz";

/// An unopened input: an identifier plus its line reader
pub struct SourceInput<S> {
    pub id: String,
    pub reader: S,
}

impl<S> SourceInput<S> {
    pub fn new(id: impl Into<String>, reader: S) -> Self {
        SourceInput {
            id: id.into(),
            reader,
        }
    }
}

/// Source id for a file: its name with one trailing `.gz` removed
pub fn source_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(GZIP_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Check that association source ids are non-empty, unique, and usable as
/// header column suffixes.
pub fn validate_source_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<(), MatrixError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(MatrixError::schema(id, "source id is empty"));
        }
        if let Some(bad) = id
            .chars()
            .find(|&c| c == SOURCE_ID_SEPARATOR || c == '\t' || c == '\n' || c == '\r')
        {
            return Err(MatrixError::schema(
                id,
                format!("source id contains forbidden character {:?}", bad),
            ));
        }
        if !seen.insert(id) {
            return Err(MatrixError::schema(id, "source id is used by more than one input"));
        }
    }
    Ok(())
}

/// Take the header line off a source, leaving the cursor on the first data line
fn take_header<S: LineSource>(id: &str, reader: &mut S) -> Result<Vec<u8>, MatrixError> {
    let header = match reader.current() {
        Some(line) => line.strip_prefix(&[HEADER_COMMENT]).unwrap_or(line).to_vec(),
        None => return Err(MatrixError::schema(id, "input is empty, expected a header line")),
    };
    reader.advance().map_err(|e| MatrixError::source_io(id, e))?;
    Ok(header)
}

/// The reference-ordered variant stream
pub struct CanonicalSource<S> {
    pub id: String,
    pub schema: Schema,
    pub reader: S,
}

impl<S: LineSource> CanonicalSource<S> {
    pub fn open(input: SourceInput<S>) -> Result<Self, MatrixError> {
        let SourceInput { id, mut reader } = input;
        let header = take_header(&id, &mut reader)?;
        let schema = Schema::parse_canonical(&id, &header)?;

        Ok(CanonicalSource { id, schema, reader })
    }
}

/// One association input being merged into the matrix
pub struct AssociationSource<S> {
    pub id: String,
    pub schema: Schema,
    /// Field names after the canonical prefix, in header order
    pub assoc_fields: Vec<String>,
    pub reader: S,
    /// Precomputed placeholder run written for rows this source lacks
    pub blanks: Vec<u8>,
    /// Rows this source contributed values to
    pub matched: u64,
}

impl<S: LineSource> AssociationSource<S> {
    /// Read and validate the header against the canonical schema
    pub fn open(
        input: SourceInput<S>,
        canonical: &Schema,
        missing_value: &str,
    ) -> Result<Self, MatrixError> {
        let SourceInput { id, mut reader } = input;
        let header = take_header(&id, &mut reader)?;
        let schema = Schema::parse(&id, &header)?;

        if !schema.starts_with(canonical) {
            return Err(MatrixError::schema(
                &id,
                format!(
                    "header must begin with the canonical fields `{}`, got `{}`",
                    canonical.fields().join("\t"),
                    schema.fields().join("\t")
                ),
            ));
        }

        let assoc_fields = schema.suffix_after(canonical).to_vec();
        let mut blanks = Vec::with_capacity(assoc_fields.len() * (1 + missing_value.len()));
        for _ in &assoc_fields {
            blanks.push(FIELD_DELIMITER);
            blanks.extend_from_slice(missing_value.as_bytes());
        }

        Ok(AssociationSource {
            id,
            schema,
            assoc_fields,
            reader,
            blanks,
            matched: 0,
        })
    }

    /// Number of per-association fields this source contributes
    pub fn field_count(&self) -> usize {
        self.assoc_fields.len()
    }

    /// Combined-header column names for this source
    pub fn header_columns(&self) -> impl Iterator<Item = String> + '_ {
        self.assoc_fields
            .iter()
            .map(move |name| format!("{}{}{}", name, SOURCE_ID_SEPARATOR, self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::line_source::TextLineSource;
    use std::path::PathBuf;

    fn text(data: &'static str) -> TextLineSource<&'static [u8]> {
        TextLineSource::new(data.as_bytes()).unwrap()
    }

    fn canonical_schema() -> Schema {
        Schema::parse("sites", b"chrom\tpos\tref\talt\tgene").unwrap()
    }

    #[test]
    fn test_source_id_from_path() {
        assert_eq!(source_id_from_path(&PathBuf::from("/data/pheno/250.2.gz")), "250.2");
        assert_eq!(source_id_from_path(&PathBuf::from("a/b/008.5")), "008.5");
        assert_eq!(source_id_from_path(&PathBuf::from("x.tsv.gz.gz")), "x.tsv.gz");
        assert_eq!(source_id_from_path(&PathBuf::from(".gz")), ".gz");
    }

    #[test]
    fn test_validate_source_ids() {
        assert!(validate_source_ids(["a", "b", "c"]).is_ok());

        let err = validate_source_ids(["a", "b", "a"]).unwrap_err();
        assert_eq!(err.source_id(), Some("a"));

        assert!(validate_source_ids(["pheno@1"]).is_err());
        assert!(validate_source_ids(["pheno\t1"]).is_err());
        assert!(validate_source_ids([""]).is_err());
    }

    #[test]
    fn test_canonical_open_consumes_header() {
        let source =
            CanonicalSource::open(SourceInput::new("sites", text("chrom\tpos\tref\talt\n1\t1\tA\tG\n")))
                .unwrap();
        assert_eq!(source.schema.len(), 4);
        assert_eq!(source.reader.current(), Some(&b"1\t1\tA\tG"[..]));
    }

    #[test]
    fn test_comment_prefixed_header_accepted() {
        let source =
            CanonicalSource::open(SourceInput::new("sites", text("#chrom\tpos\tref\talt\n"))).unwrap();
        assert_eq!(source.schema.position("chrom"), Some(0));
        assert!(source.reader.at_end());
    }

    #[test]
    fn test_empty_input_is_schema_error() {
        let result = CanonicalSource::open(SourceInput::new("sites", text("")));
        assert!(matches!(result, Err(MatrixError::Schema { .. })));
    }

    #[test]
    fn test_association_open_records_fields_and_blanks() {
        let source = AssociationSource::open(
            SourceInput::new("p2", text("chrom\tpos\tref\talt\tgene\tpval\tbeta\n")),
            &canonical_schema(),
            "NA",
        )
        .unwrap();

        assert_eq!(source.field_count(), 2);
        assert_eq!(source.blanks, b"\tNA\tNA");
        assert_eq!(
            source.header_columns().collect::<Vec<_>>(),
            vec!["pval@p2".to_string(), "beta@p2".to_string()]
        );
    }

    #[test]
    fn test_association_header_must_extend_canonical() {
        let result = AssociationSource::open(
            SourceInput::new("p3", text("chrom\tpos\tref\talt\tpval\n")),
            &canonical_schema(),
            "",
        );
        match result {
            Err(MatrixError::Schema { source_id, reason }) => {
                assert_eq!(source_id, "p3");
                assert!(reason.contains("canonical fields"));
            }
            _ => panic!("expected a schema error"),
        }
    }

    #[test]
    fn test_association_without_extra_fields() {
        let source = AssociationSource::open(
            SourceInput::new("p4", text("chrom\tpos\tref\talt\tgene\n")),
            &canonical_schema(),
            "",
        )
        .unwrap();
        assert_eq!(source.field_count(), 0);
        assert!(source.blanks.is_empty());
    }
}
