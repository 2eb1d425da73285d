//! Dataset kind detection from manifest content.

use super::codec::decode_class_ids;
use super::kind::DatasetKind;
use super::resolver::PathResolver;
use crate::error::DatasetError;

const DETECTION_FIELDS: usize = 5;
const RELATIONSHIP_FIELDS: usize = 11;

/// Splits a manifest line into its image path and label field.
///
/// The split happens on the first whitespace run. Returns `None` for blank
/// lines. The label field is empty when the line only names an image.
pub fn split_manifest_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((image, labels)) => Some((image, labels.trim_start())),
        None => Some((line, "")),
    }
}

/// Whether `field` reads as an inline class id list. Repeated ids still count,
/// so the load reports them as duplicates instead of a detection failure.
fn is_class_id_list(field: &str) -> bool {
    matches!(
        decode_class_ids(field),
        Ok(_) | Err(DatasetError::DuplicateClassIds { .. })
    )
}

/// Infers the dataset kind of a manifest.
///
/// Lines without a label field are skipped. A label field made of digits and
/// commas means classification. Otherwise the field names a payload file and
/// the field count of its first non-blank line decides: 5 for detection, 11
/// for relationship. Records whose payload is empty carry no signal, so the
/// next record is tried. A manifest with no labelled lines is
/// classification.
///
/// # Errors
/// `Format("failed to detect dataset kind")` if a payload cannot be resolved
/// or its first line has any other field count.
pub fn detect_kind(manifest: &str, resolver: &PathResolver) -> Result<DatasetKind, DatasetError> {
    let mut saw_empty_payload = false;

    for (_, label_field) in manifest.lines().filter_map(split_manifest_line) {
        if label_field.is_empty() {
            continue;
        }
        if is_class_id_list(label_field) {
            return Ok(DatasetKind::Classification);
        }

        let payload = resolver.read_text(label_field).map_err(|e| {
            log::debug!("Failed to resolve {label_field}: {e}");
            DatasetError::format("failed to detect dataset kind", label_field)
        })?;

        let Some(first_line) = payload.lines().map(str::trim).find(|l| !l.is_empty()) else {
            saw_empty_payload = true;
            continue;
        };

        return match first_line.split_whitespace().count() {
            DETECTION_FIELDS => Ok(DatasetKind::Detection),
            RELATIONSHIP_FIELDS => Ok(DatasetKind::Relationship),
            _ => Err(DatasetError::format(
                "failed to detect dataset kind",
                first_line,
            )),
        };
    }

    if saw_empty_payload {
        // Payload files exist but are all empty. Only box kinds use payload files.
        log::warn!("All label payloads are empty; assuming a detection dataset");
        return Ok(DatasetKind::Detection);
    }
    Ok(DatasetKind::Classification)
}
