//! Dataset summaries: record and label counts plus the class distribution.

mod report;

pub use report::{ClassCount, SummaryReport};

use std::collections::BTreeMap;

use crate::dataset::{ClassId, Dataset};
use crate::error::DatasetError;

/// Width of the class histogram bars, in characters.
const BAR_WIDTH: usize = 20;

/// Summarizes `dataset`. Fails only if its label table cannot be loaded.
pub fn summarize(dataset: &Dataset) -> Result<SummaryReport, DatasetError> {
    let table = dataset.labels()?;

    let mut counts: BTreeMap<ClassId, usize> = BTreeMap::new();
    for id in dataset.records().class_ids() {
        *counts.entry(id).or_insert(0) += 1;
    }

    let per_record = dataset.records().label_counts();
    let labels = per_record.iter().sum();
    let labelled_records = per_record.iter().filter(|&&n| n > 0).count();

    let classes = counts
        .iter()
        .map(|(&id, &count)| ClassCount {
            class_id: id.as_u32(),
            name: table.name_or_id(id),
            count,
        })
        .collect();

    Ok(SummaryReport {
        kind: dataset.kind(),
        records: dataset.len(),
        labels,
        labelled_records,
        distinct_classes: counts.len(),
        max_class_id: dataset.get_max_class_id().as_u32(),
        label_table_len: table.len(),
        classes,
        bar_width: BAR_WIDTH,
    })
}
