//! Dataset transforms.
//!
//! Every transform takes a dataset by reference and returns a new one; the
//! input is never modified. Results share the input's directories and open
//! archives unless stated otherwise.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::dataset::{
    match_records, ClassId, Dataset, DatasetKind, Label, LabelTable, Record, Records,
};
use crate::error::DatasetError;

// ============================================================================
// Filter
// ============================================================================

/// Which class ids [`filter_classes`] keeps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassFilter {
    /// Keep only these ids.
    Include(BTreeSet<ClassId>),
    /// Keep every id except these.
    Exclude(BTreeSet<ClassId>),
}

impl ClassFilter {
    fn keeps(&self, id: ClassId) -> bool {
        match self {
            ClassFilter::Include(ids) => ids.contains(&id),
            ClassFilter::Exclude(ids) => !ids.contains(&id),
        }
    }
}

/// Drops labels whose class is not selected, then drops records left
/// without labels. The label table is unchanged.
///
/// # Errors
/// `UnsupportedOperation` for relationship datasets.
pub fn filter_classes(dataset: &Dataset, filter: &ClassFilter) -> Result<Dataset, DatasetError> {
    if let ClassFilter::Include(ids) = filter {
        let max = dataset.get_max_class_id();
        for id in ids.iter().filter(|id| **id > max) {
            log::warn!("The class {id} is not in the dataset.");
        }
    }

    fn keep<L: Label>(records: &[Record<L>], filter: &ClassFilter) -> Vec<Record<L>> {
        records
            .iter()
            .filter_map(|r| {
                let labels: Vec<L> = r
                    .labels
                    .iter()
                    .filter(|label| label.class_ids().all(|id| filter.keeps(id)))
                    .cloned()
                    .collect();
                (!labels.is_empty()).then(|| Record::new(r.image.clone(), labels))
            })
            .collect()
    }

    let records = match dataset.records() {
        Records::Classification(r) => Records::Classification(keep(r, filter)),
        Records::Detection(r) => Records::Detection(keep(r, filter)),
        Records::Relationship(_) => {
            return Err(DatasetError::UnsupportedOperation {
                operation: "filter",
                kind: DatasetKind::Relationship,
            })
        }
    };
    log::info!(
        "Kept {} of {} records after filtering",
        records.len(),
        dataset.len()
    );
    Ok(dataset.with_records(records).with_labels(dataset.labels()?.clone()))
}

// ============================================================================
// Map
// ============================================================================

/// Passes every class id slot through `mapping`; unmapped ids stay.
///
/// Classification records drop ids that become duplicates. The label table
/// is unchanged.
///
/// # Errors
/// `ClassIdOutOfRange` if a mapped id falls outside the label table.
pub fn map_classes(
    dataset: &Dataset,
    mapping: &HashMap<ClassId, ClassId>,
) -> Result<Dataset, DatasetError> {
    let labels = dataset.labels()?;
    if let Some(bad) = mapping.values().find(|id| !labels.contains(**id)) {
        return Err(DatasetError::ClassIdOutOfRange {
            class_id: bad.as_u32(),
            table_len: labels.len(),
        });
    }

    let mut remap = |id: ClassId| mapping.get(&id).copied().unwrap_or(id);
    let records = match_records!(dataset.records(), r => relabel(r, &mut remap));
    Ok(dataset.with_records(records).with_labels(labels.clone()))
}

fn relabel<L: Label, F: FnMut(ClassId) -> ClassId>(records: &[Record<L>], f: &mut F) -> Records {
    L::wrap(
        records
            .iter()
            .map(|r| {
                let mut labels: Vec<L> = r.labels.iter().map(|l| l.map_class_ids(f)).collect();
                dedup_class_labels(&mut labels);
                Record::new(r.image.clone(), labels)
            })
            .collect(),
    )
}

/// Classification records are sets; remove repeats keeping first occurrences.
fn dedup_class_labels<L: Label>(labels: &mut Vec<L>) {
    if L::KIND != DatasetKind::Classification {
        return;
    }
    let mut unique: Vec<L> = Vec::with_capacity(labels.len());
    for label in labels.drain(..) {
        if !unique.contains(&label) {
            unique.push(label);
        }
    }
    *labels = unique;
}

// ============================================================================
// Defrag
// ============================================================================

/// One line of a defrag plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefragEntry {
    pub old: ClassId,
    pub new: ClassId,
    pub name: String,
}

impl fmt::Display for DefragEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {} ({})", self.old, self.new, self.name)
    }
}

/// Renumbers the used class ids densely in ascending order and shrinks the
/// label table to match. Returns the dataset and the renumbering plan.
pub fn defrag(dataset: &Dataset) -> Result<(Dataset, Vec<DefragEntry>), DatasetError> {
    let labels = dataset.labels()?;
    let used: BTreeSet<ClassId> = dataset.records().class_ids().into_iter().collect();

    let plan: Vec<DefragEntry> = used
        .iter()
        .enumerate()
        .map(|(new, &old)| DefragEntry {
            old,
            new: ClassId(new as u32),
            name: labels.name_or_id(old),
        })
        .collect();

    let mapping: HashMap<ClassId, ClassId> = plan.iter().map(|e| (e.old, e.new)).collect();
    let table = LabelTable::new(plan.iter().map(|e| e.name.clone()).collect())?;

    let mut remap = |id: ClassId| mapping.get(&id).copied().unwrap_or(id);
    let records = match_records!(dataset.records(), r => relabel(r, &mut remap));
    Ok((dataset.with_records(records).with_labels(table), plan))
}

// ============================================================================
// Drop empty
// ============================================================================

/// Removes records without labels.
pub fn drop_empty(dataset: &Dataset) -> Result<Dataset, DatasetError> {
    fn non_empty<L: Label>(records: &[Record<L>]) -> Records {
        L::wrap(
            records
                .iter()
                .filter(|r| !r.labels.is_empty())
                .cloned()
                .collect(),
        )
    }
    let records = match_records!(dataset.records(), r => non_empty(r));
    Ok(dataset.with_records(records).with_labels(dataset.labels()?.clone()))
}

// ============================================================================
// Concat
// ============================================================================

/// Options for [`concat`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ConcatOptions {
    /// Merge records whose image bytes are identical (SHA-256).
    pub dedup_images: bool,
}

/// Concatenates datasets of one kind into a dataset rooted at `output_directory`.
///
/// Label tables are appended with id offsets; a name already taken gets `.`
/// appended until unique. Image paths are rewritten relative to
/// `output_directory`, which must contain every input's images directory.
/// Records naming the same image are merged.
///
/// # Errors
/// `MixedKinds` if the inputs differ in kind, `OutsideOutputDirectory` if an
/// input lives outside `output_directory`.
pub fn concat(
    datasets: &[Dataset],
    output_directory: &Path,
    options: &ConcatOptions,
) -> Result<Dataset, DatasetError> {
    let kind = datasets
        .first()
        .map_or(DatasetKind::Classification, Dataset::kind);
    let output_canonical = output_directory.canonicalize()?;

    let mut names: Vec<String> = Vec::new();
    let mut records = Records::empty(kind);
    for dataset in datasets {
        let table = dataset.labels()?;
        log::info!(
            "Concatenating {} images and {} classes.",
            dataset.len(),
            table.len()
        );
        let offset = names.len() as u32;
        for name in table.names() {
            let mut name = name.clone();
            if names.contains(&name) {
                log::warn!("Class name conflict: {name}");
            }
            while names.contains(&name) {
                name.push('.');
            }
            names.push(name);
        }
        let prefix = relative_directory(dataset.base_images_directory(), &output_canonical)?;
        match (&mut records, dataset.records()) {
            (Records::Classification(out), Records::Classification(r)) => {
                append_shifted(out, r, &prefix, offset)
            }
            (Records::Detection(out), Records::Detection(r)) => append_shifted(out, r, &prefix, offset),
            (Records::Relationship(out), Records::Relationship(r)) => {
                append_shifted(out, r, &prefix, offset)
            }
            _ => return Err(mixed_kinds(datasets)),
        }
    }
    let labels = LabelTable::new(names)?;

    let mut result = Dataset::new(records, output_directory);
    let records = match_records!(result.records(), r => merge_same_images(r));
    result = result.with_records(records);

    if options.dedup_images {
        let records = match_records!(result.records(), r => dedup_by_content(&result, r)?);
        result = result.with_records(records);
    }

    Ok(result.with_labels(labels))
}

fn mixed_kinds(datasets: &[Dataset]) -> DatasetError {
    let kinds: BTreeSet<&'static str> = datasets.iter().map(|d| d.kind().as_str()).collect();
    DatasetError::MixedKinds {
        kinds: kinds.into_iter().collect::<Vec<_>>().join(", "),
    }
}

fn append_shifted<L: Label>(
    out: &mut Vec<Record<L>>,
    records: &[Record<L>],
    prefix: &str,
    offset: u32,
) {
    let mut shift = |id: ClassId| ClassId(id.0 + offset);
    out.extend(records.iter().map(|r| {
        Record::new(
            join_prefix(prefix, &r.image),
            r.labels.iter().map(|l| l.map_class_ids(&mut shift)).collect(),
        )
    }));
}

/// Merges records naming the same image into the first one.
fn merge_same_images<L: Label>(records: &[Record<L>]) -> Records {
    let merged = merge_by_key(records, |r| Ok::<_, DatasetError>(r.image.clone()));
    L::wrap(merged.unwrap_or_default())
}

/// Merges records whose image bytes hash identically into the first one.
fn dedup_by_content<L: Label>(dataset: &Dataset, records: &[Record<L>]) -> Result<Records, DatasetError> {
    let merged = merge_by_key(records, |r| {
        let bytes = dataset.read_image_binary(&r.image)?;
        Ok::<_, DatasetError>(format!("{:x}", Sha256::digest(&bytes)))
    })?;
    if merged.len() < records.len() {
        log::info!(
            "Merged {} records with duplicate image content",
            records.len() - merged.len()
        );
    }
    Ok(L::wrap(merged))
}

fn merge_by_key<L: Label, E>(
    records: &[Record<L>],
    mut key: impl FnMut(&Record<L>) -> Result<String, E>,
) -> Result<Vec<Record<L>>, E> {
    let mut merged: Vec<Record<L>> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for record in records {
        let key = key(record)?;
        match index.get(&key) {
            Some(&i) => merged[i].labels.extend(record.labels.iter().cloned()),
            None => {
                index.insert(key, merged.len());
                merged.push(record.clone());
            }
        }
    }
    for record in &mut merged {
        dedup_class_labels(&mut record.labels);
    }
    Ok(merged)
}

/// `dir` relative to `root` with `/` separators; empty when they are equal.
fn relative_directory(dir: &Path, root: &Path) -> Result<String, DatasetError> {
    let canonical = dir.canonicalize()?;
    let relative = canonical
        .strip_prefix(root)
        .map_err(|_| DatasetError::OutsideOutputDirectory {
            path: dir.to_path_buf(),
            directory: root.to_path_buf(),
        })?;
    Ok(relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/"))
}

fn join_prefix(prefix: &str, image: &str) -> String {
    if prefix.is_empty() || PathBuf::from(image).is_absolute() {
        image.to_string()
    } else {
        format!("{prefix}/{image}")
    }
}
