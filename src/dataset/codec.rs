//! Label field codecs.
//!
//! A manifest line is `<image_path> <label_field>`. For classification the
//! label field is the comma-joined class id list itself. For detection and
//! relationship datasets it is a (possibly compound) path to a payload file
//! with one fixed-width integer line per label.

use std::collections::HashSet;

use super::ids::ClassId;
use super::label::{BoxLabel, Label, PayloadLabel, RelationLabel};
use super::resolver::PathResolver;
use crate::error::DatasetError;

/// Decodes one manifest label field into the labels of a record.
pub trait LabelCodec: Label {
    fn decode_field(field: &str, resolver: &PathResolver) -> Result<Vec<Self>, DatasetError>;
}

impl LabelCodec for ClassId {
    fn decode_field(field: &str, _resolver: &PathResolver) -> Result<Vec<Self>, DatasetError> {
        decode_class_ids(field)
    }
}

impl LabelCodec for BoxLabel {
    fn decode_field(field: &str, resolver: &PathResolver) -> Result<Vec<Self>, DatasetError> {
        decode_payload(&resolver.read_text(field)?)
    }
}

impl LabelCodec for RelationLabel {
    fn decode_field(field: &str, resolver: &PathResolver) -> Result<Vec<Self>, DatasetError> {
        decode_payload(&resolver.read_text(field)?)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Parses a comma-joined class id list. An empty field yields no labels.
///
/// # Errors
/// `Format` on a non-integer or negative id, `DuplicateClassIds` if an id
/// repeats within the field.
pub fn decode_class_ids(field: &str) -> Result<Vec<ClassId>, DatasetError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for part in field.split(',') {
        let id: ClassId = part
            .parse()
            .map_err(|_| DatasetError::format("invalid class id list", field))?;
        if !seen.insert(id) {
            return Err(DatasetError::DuplicateClassIds {
                content: field.to_string(),
            });
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Joins class ids with commas.
pub fn encode_class_ids(ids: &[ClassId]) -> String {
    ids.iter()
        .map(ClassId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// Payload files (detection, relationship)
// ============================================================================

/// Parses a payload file: one label per non-blank line.
///
/// # Errors
/// `Format` naming the offending line if it does not hold exactly
/// `L::FIELD_COUNT` integers, or if a class id slot is negative.
pub fn decode_payload<L: PayloadLabel>(text: &str) -> Result<Vec<L>, DatasetError> {
    let mut labels = Vec::new();
    let mut fields = Vec::with_capacity(L::FIELD_COUNT);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        fields.clear();
        for token in line.split_whitespace() {
            let value: i64 = token.parse().map_err(|_| {
                DatasetError::format(format!("invalid {} label line", L::KIND), line)
            })?;
            fields.push(value);
        }
        if fields.len() != L::FIELD_COUNT {
            return Err(DatasetError::format(
                format!(
                    "expected {} fields per {} label line, found {}",
                    L::FIELD_COUNT,
                    L::KIND,
                    fields.len()
                ),
                line,
            ));
        }
        labels.push(L::from_fields(&fields)?);
    }
    Ok(labels)
}

/// Serializes labels one per line, each line newline-terminated.
pub fn encode_payload<L: PayloadLabel>(labels: &[L]) -> String {
    let mut out = String::new();
    for label in labels {
        label.write_fields(&mut out);
        out.push('\n');
    }
    out
}

/// Splits one manifest line and decodes its field as a class id list.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_manifest_line(line: &str) -> Result<(), DatasetError> {
    if let Some((_, field)) = super::detect::split_manifest_line(line) {
        let _ = decode_class_ids(field)?;
    }
    Ok(())
}
