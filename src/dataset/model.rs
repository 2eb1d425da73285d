//! The in-memory dataset entity.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use image::DynamicImage;

use super::codec::LabelCodec;
use super::detect::{detect_kind, split_manifest_line};
use super::ids::ClassId;
use super::kind::DatasetKind;
use super::label::{BoxLabel, Label, RelationLabel};
use super::label_table::{LabelTable, LABEL_TABLE_FILE};
use super::resolver::PathResolver;
use crate::error::DatasetError;

/// One manifest line: an image path and the labels attached to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record<L> {
    /// Plain path or `archive@entry`, relative to the images directory.
    pub image: String,
    pub labels: Vec<L>,
}

impl<L> Record<L> {
    pub fn new(image: impl Into<String>, labels: Vec<L>) -> Self {
        Self {
            image: image.into(),
            labels,
        }
    }
}

/// Records tagged by dataset kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Records {
    Classification(Vec<Record<ClassId>>),
    Detection(Vec<Record<BoxLabel>>),
    Relationship(Vec<Record<RelationLabel>>),
}

/// Runs the same expression over whichever record vector `records` holds.
macro_rules! match_records {
    ($records:expr, $r:ident => $body:expr) => {
        match $records {
            $crate::dataset::Records::Classification($r) => $body,
            $crate::dataset::Records::Detection($r) => $body,
            $crate::dataset::Records::Relationship($r) => $body,
        }
    };
}
pub(crate) use match_records;

impl Records {
    pub fn empty(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Classification => Records::Classification(Vec::new()),
            DatasetKind::Detection => Records::Detection(Vec::new()),
            DatasetKind::Relationship => Records::Relationship(Vec::new()),
        }
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            Records::Classification(_) => DatasetKind::Classification,
            Records::Detection(_) => DatasetKind::Detection,
            Records::Relationship(_) => DatasetKind::Relationship,
        }
    }

    pub fn len(&self) -> usize {
        match_records!(self, r => r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image paths in record order.
    pub fn image_paths(&self) -> Vec<&str> {
        match_records!(self, r => r.iter().map(|rec| rec.image.as_str()).collect())
    }

    /// Label count per record, in record order.
    pub fn label_counts(&self) -> Vec<usize> {
        match_records!(self, r => r.iter().map(|rec| rec.labels.len()).collect())
    }

    /// Every class id slot used by any record, in record order.
    pub fn class_ids(&self) -> Vec<ClassId> {
        fn collect<L: Label>(records: &[Record<L>]) -> Vec<ClassId> {
            records
                .iter()
                .flat_map(|r| r.labels.iter().flat_map(Label::class_ids))
                .collect()
        }
        match_records!(self, r => collect(r))
    }

    /// Replaces each record's image path with `f(index, path)`.
    pub fn map_image_paths(&self, mut f: impl FnMut(usize, &str) -> String) -> Records {
        fn remap<L: Label>(
            records: &[Record<L>],
            f: &mut impl FnMut(usize, &str) -> String,
        ) -> Vec<Record<L>> {
            records
                .iter()
                .enumerate()
                .map(|(i, r)| Record::new(f(i, &r.image), r.labels.clone()))
                .collect()
        }
        match self {
            Records::Classification(r) => Records::Classification(remap(r, &mut f)),
            Records::Detection(r) => Records::Detection(remap(r, &mut f)),
            Records::Relationship(r) => Records::Relationship(remap(r, &mut f)),
        }
    }
}

/// An ordered collection of records plus a label table.
///
/// The label table is materialized once on first access and never
/// recomputed. Archive handles opened while reading label payloads or images
/// are cached in the dataset's resolvers and released when the dataset (and
/// every dataset derived from it) is dropped.
#[derive(Clone, Debug)]
pub struct Dataset {
    records: Records,
    labels: OnceLock<LabelTable>,
    base_dir: PathBuf,
    images_dir: PathBuf,
    reader: Arc<PathResolver>,
    image_reader: Arc<PathResolver>,
}

impl Dataset {
    /// Creates a dataset in memory. Images resolve against `base_dir`.
    pub fn new(records: Records, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let reader = Arc::new(PathResolver::new(&base_dir));
        Self {
            records,
            labels: OnceLock::new(),
            images_dir: base_dir.clone(),
            base_dir,
            image_reader: Arc::clone(&reader),
            reader,
        }
    }

    /// Sets an explicit label table instead of reading `labels.txt`.
    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = OnceLock::from(labels);
        self
    }

    /// Resolves image paths against `images_dir` instead of the base directory.
    pub fn with_images_directory(mut self, images_dir: impl Into<PathBuf>) -> Self {
        let images_dir = images_dir.into();
        self.image_reader = if images_dir == self.base_dir {
            Arc::clone(&self.reader)
        } else {
            Arc::new(PathResolver::new(&images_dir))
        };
        self.images_dir = images_dir;
        self
    }

    /// A dataset over new records sharing this one's directories and open
    /// archives. The label table is not carried over.
    pub fn with_records(&self, records: Records) -> Self {
        Self {
            records,
            labels: OnceLock::new(),
            base_dir: self.base_dir.clone(),
            images_dir: self.images_dir.clone(),
            reader: Arc::clone(&self.reader),
            image_reader: Arc::clone(&self.image_reader),
        }
    }

    /// Parses manifest text.
    ///
    /// The kind is detected from content, then every non-blank line is
    /// decoded in order. Label payload paths resolve against `base_dir`;
    /// image paths against `images_dir` (default: `base_dir`).
    ///
    /// # Errors
    /// Any decode failure aborts the load with `ManifestLine`, naming the
    /// offending line. No partial dataset is returned.
    pub fn load(
        manifest: &str,
        base_dir: impl Into<PathBuf>,
        images_dir: Option<&Path>,
    ) -> Result<Self, DatasetError> {
        let dataset = Self::new(Records::Classification(Vec::new()), base_dir);
        let kind = detect_kind(manifest, &dataset.reader)?;

        let records = match kind {
            DatasetKind::Classification => {
                Records::Classification(decode_records(manifest, &dataset.reader)?)
            }
            DatasetKind::Detection => Records::Detection(decode_records(manifest, &dataset.reader)?),
            DatasetKind::Relationship => {
                Records::Relationship(decode_records(manifest, &dataset.reader)?)
            }
        };

        let mut dataset = Self { records, ..dataset };
        if let Some(dir) = images_dir {
            dataset = dataset.with_images_directory(dir);
        }
        log::debug!("Loaded {} {} records", dataset.len(), dataset.kind());
        Ok(dataset)
    }

    /// Reads and parses a manifest file. Its directory becomes the base directory.
    pub fn load_file(manifest_path: &Path, images_dir: Option<&Path>) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(manifest_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DatasetError::NotFound {
                path: manifest_path.display().to_string(),
            },
            _ => DatasetError::Io(e),
        })?;
        let base_dir = match manifest_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::load(&text, base_dir, images_dir)
    }

    pub fn kind(&self) -> DatasetKind {
        self.records.kind()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    /// The label table.
    ///
    /// On first access this reads `labels.txt` from the base directory. If
    /// the file is absent, names default to the stringified ids up to the
    /// max class id. The result is cached.
    ///
    /// # Errors
    /// `Format` if the table has duplicate names or is too short for the
    /// class ids in use.
    pub fn labels(&self) -> Result<&LabelTable, DatasetError> {
        if let Some(table) = self.labels.get() {
            return Ok(table);
        }
        let table = self.materialize_labels()?;
        Ok(self.labels.get_or_init(|| table))
    }

    fn materialize_labels(&self) -> Result<LabelTable, DatasetError> {
        let path = self.base_dir.join(LABEL_TABLE_FILE);
        let max = self.max_class_id();

        let table = if path.is_file() {
            LabelTable::parse(&std::fs::read_to_string(&path)?)?
        } else if let Some(max) = max {
            log::warn!(
                "{} is not found. Generating class names...",
                path.display()
            );
            LabelTable::implicit(max)
        } else {
            LabelTable::default()
        };

        if let Some(max) = max {
            if !table.contains(max) {
                return Err(DatasetError::format(
                    format!(
                        "label table has {} entries but class id {} is used",
                        table.len(),
                        max
                    ),
                    path.display().to_string(),
                ));
            }
        }
        Ok(table)
    }

    fn max_class_id(&self) -> Option<ClassId> {
        self.records.class_ids().into_iter().max()
    }

    /// Largest class id used in any slot; 0 for a dataset without labels.
    pub fn get_max_class_id(&self) -> ClassId {
        self.max_class_id().unwrap_or_default()
    }

    /// Number of distinct class ids in use (not the label table size).
    pub fn get_num_classes(&self) -> usize {
        self.records
            .class_ids()
            .into_iter()
            .collect::<HashSet<_>>()
            .len()
    }

    /// Decodes the image at `path` (relative to the images directory).
    pub fn load_image(&self, path: &str) -> Result<DynamicImage, DatasetError> {
        let bytes = self.read_image_binary(path)?;
        image::load_from_memory(&bytes).map_err(|source| DatasetError::ImageDecode {
            path: path.to_string(),
            source,
        })
    }

    /// Raw bytes of the image at `path`, without decoding.
    pub fn read_image_binary(&self, path: &str) -> Result<Vec<u8>, DatasetError> {
        self.image_reader.read_bytes(path)
    }

    /// `(width, height)` read from the image header.
    pub fn image_size(&self, path: &str) -> Result<(u32, u32), DatasetError> {
        let bytes = self.read_image_binary(path)?;
        image_size_from_bytes(&bytes, path)
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    pub fn base_images_directory(&self) -> &Path {
        &self.images_dir
    }
}

pub(crate) fn image_size_from_bytes(bytes: &[u8], path: &str) -> Result<(u32, u32), DatasetError> {
    let size = imagesize::blob_size(bytes).map_err(|source| DatasetError::ImageDimensionRead {
        path: path.to_string(),
        source,
    })?;
    Ok((size.width as u32, size.height as u32))
}

fn decode_records<L: LabelCodec>(
    manifest: &str,
    resolver: &PathResolver,
) -> Result<Vec<Record<L>>, DatasetError> {
    let mut records = Vec::new();
    for line in manifest.lines() {
        let Some((image, field)) = split_manifest_line(line) else {
            continue;
        };
        let labels = if field.is_empty() && L::KIND != DatasetKind::Classification {
            Err(DatasetError::format("missing label field", line.trim()))
        } else {
            L::decode_field(field, resolver)
        };
        let labels = labels.map_err(|source| DatasetError::ManifestLine {
            line: line.trim().to_string(),
            source: Box::new(source),
        })?;
        records.push(Record::new(image, labels));
    }
    Ok(records)
}
