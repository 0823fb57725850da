//! Header schemas
//!
//! A schema is built once per source from its header line: the ordered
//! field names plus a name → position map for named lookup.

use crate::matrix::error::MatrixError;
use crate::matrix::source::SOURCE_ID_SEPARATOR;
use std::collections::HashMap;

/// Field delimiter for every input and for the output
pub const FIELD_DELIMITER: u8 = b'\t';

/// The variant key fields every canonical header must start with
pub const CPRA_FIELDS: [&str; 4] = ["chrom", "pos", "ref", "alt"];

/// Ordered header fields of one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Schema {
    /// Parse a header line. Duplicate or non-UTF-8 names are rejected.
    pub fn parse(source_id: &str, header: &[u8]) -> Result<Self, MatrixError> {
        let header = std::str::from_utf8(header)
            .map_err(|e| MatrixError::schema(source_id, format!("header is not UTF-8: {}", e)))?;

        let fields: Vec<String> = header
            .split(FIELD_DELIMITER as char)
            .map(str::to_string)
            .collect();

        let mut positions = HashMap::with_capacity(fields.len());
        for (index, name) in fields.iter().enumerate() {
            if name.is_empty() {
                return Err(MatrixError::schema(
                    source_id,
                    format!("header field {} is empty", index + 1),
                ));
            }
            if positions.insert(name.clone(), index).is_some() {
                return Err(MatrixError::schema(
                    source_id,
                    format!("header field `{}` appears more than once", name),
                ));
            }
        }

        Ok(Schema { fields, positions })
    }

    /// Parse the canonical header, which must begin with the CPRA fields.
    /// Canonical names may not contain `@`, which marks source columns in
    /// the combined header.
    pub fn parse_canonical(source_id: &str, header: &[u8]) -> Result<Self, MatrixError> {
        let schema = Self::parse(source_id, header)?;
        if let Some(name) = schema
            .fields
            .iter()
            .find(|name| name.contains(SOURCE_ID_SEPARATOR))
        {
            return Err(MatrixError::schema(
                source_id,
                format!(
                    "canonical field `{}` contains `{}`, which is reserved for source columns",
                    name, SOURCE_ID_SEPARATOR
                ),
            ));
        }
        if !schema.starts_with_names(&CPRA_FIELDS) {
            return Err(MatrixError::schema(
                source_id,
                format!(
                    "canonical header must begin with `{}`, got `{}`",
                    CPRA_FIELDS.join("\t"),
                    schema.fields.join("\t")
                ),
            ));
        }
        Ok(schema)
    }

    /// Position of a named field
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// All field names, in header order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether this schema begins with all of `prefix`'s fields, in order
    pub fn starts_with(&self, prefix: &Schema) -> bool {
        self.fields.starts_with(&prefix.fields)
    }

    fn starts_with_names(&self, names: &[&str]) -> bool {
        names
            .iter()
            .enumerate()
            .all(|(index, name)| self.position(name) == Some(index))
    }

    /// Fields after `prefix`. Callers check `starts_with` first.
    pub fn suffix_after(&self, prefix: &Schema) -> &[String] {
        debug_assert!(self.starts_with(prefix), "Precondition: prefix must match");
        &self.fields[prefix.len()..]
    }
}

/// Number of delimited fields on a line (an empty line is one empty field)
pub fn count_fields(line: &[u8]) -> usize {
    1 + memchr::memchr_iter(FIELD_DELIMITER, line).count()
}

/// Split a line into its fields. Used only off the hot path.
pub fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    line.split(|&b| b == FIELD_DELIMITER).collect()
}
