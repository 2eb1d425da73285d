//! Dataset validation.
//!
//! Checks a loaded dataset for:
//! - a usable label table without empty names
//! - records with an image path, listed once, carrying at least one label
//! - class ids inside the label table and well-ordered boxes

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::HashMap;

use crate::dataset::{match_records, Dataset, Label, LabelTable, Record};

/// Validates a dataset and returns a report of all issues found.
///
/// Loading the label table may fail (for example a `labels.txt` shorter than
/// the largest class id); that is reported as an error and the class id range
/// check is skipped.
pub fn validate_dataset(dataset: &Dataset) -> ValidationReport {
    let mut report = ValidationReport::new();

    let table = match dataset.labels() {
        Ok(table) => {
            validate_label_table(table, &mut report);
            Some(table)
        }
        Err(e) => {
            report.add(ValidationIssue::error(
                IssueCode::InvalidLabelTable,
                e.to_string(),
                IssueContext::Dataset,
            ));
            None
        }
    };

    match_records!(dataset.records(), r => validate_records(r, table, &mut report));

    report
}

fn validate_label_table(table: &LabelTable, report: &mut ValidationReport) {
    for (id, name) in table.iter() {
        if name.trim().is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyClassName,
                "Empty class name",
                IssueContext::Class { id: id.as_u32() },
            ));
        }
    }
}

fn validate_records<L: Label>(
    records: &[Record<L>],
    table: Option<&LabelTable>,
    report: &mut ValidationReport,
) {
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let context = || IssueContext::Record {
            index,
            image: record.image.clone(),
        };

        if record.image.is_empty() {
            report.add(ValidationIssue::error(
                IssueCode::EmptyImagePath,
                "Empty image path",
                context(),
            ));
        } else if let Some(first) = seen.get(record.image.as_str()) {
            report.add(ValidationIssue::warning(
                IssueCode::DuplicateImagePath,
                format!("Image already listed by record {first}"),
                context(),
            ));
        } else {
            seen.insert(&record.image, index);
        }

        if record.labels.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyRecord,
                "Record has no labels",
                context(),
            ));
        }

        for label in &record.labels {
            if !label.is_valid() {
                report.add(ValidationIssue::error(
                    IssueCode::InvalidBBox,
                    format!("Invalid box in {label:?}"),
                    context(),
                ));
            }
            let Some(table) = table else { continue };
            for id in label.class_ids().filter(|id| !table.contains(*id)) {
                report.add(ValidationIssue::error(
                    IssueCode::ClassIdOutOfRange,
                    format!(
                        "Class id {id} is outside the label table ({} entries)",
                        table.len()
                    ),
                    context(),
                ));
            }
        }
    }
}
