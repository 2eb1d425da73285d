//! COCO JSON reader and writer.
//!
//! COCO boxes are `[x, y, width, height]` with the top-left corner in
//! absolute pixels and category ids starting at 1. Detection datasets store
//! `(x_min, y_min, x_max, y_max)` and 0-indexed class ids, so the reader
//! subtracts one from every category id and the writer adds it back. The
//! shift only ever happens here.
//!
//! # Data quality
//!
//! COCO exports from labelling tools are noisy. The reader drops, with a
//! warning, boxes that are degenerate or inverted after truncation and exact
//! duplicates within one image (the first occurrence is kept).

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{Dataset, Record, Records};
use super::resolver::CompoundPath;
use super::{BBox, BoxLabel, ClassId, DatasetKind, LabelTable};
use crate::error::DatasetError;

// ============================================================================
// COCO Schema Types (internal to this module)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct CocoDataset {
    #[serde(default)]
    info: serde_json::Map<String, serde_json::Value>,

    images: Vec<CocoImage>,

    #[serde(default)]
    annotations: Vec<CocoAnnotation>,

    categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    supercategory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    category_id: u64,

    /// [x, y, width, height], top-left corner
    bbox: [f64; 4],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    area: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    iscrowd: Option<u8>,
}

// ============================================================================
// Public API
// ============================================================================

/// Reads a COCO JSON file into a detection dataset whose images resolve
/// against `images_dir`.
///
/// # Errors
/// `CocoJsonParse` on malformed JSON, `CocoJsonInvalid` on a category id of
/// 0 or an annotation pointing at an unknown category.
pub fn read_coco_json(path: &Path, images_dir: &Path) -> Result<Dataset, DatasetError> {
    let file = File::open(path).map_err(DatasetError::Io)?;
    let reader = BufReader::new(file);

    let coco: CocoDataset =
        serde_json::from_reader(reader).map_err(|source| DatasetError::CocoJsonParse {
            path: path.to_path_buf(),
            source,
        })?;

    coco_to_dataset(coco, path, images_dir)
}

/// Reads a COCO JSON string. Useful for testing without file I/O.
pub fn from_coco_str(json: &str, images_dir: &Path) -> Result<Dataset, DatasetError> {
    let coco: CocoDataset =
        serde_json::from_str(json).map_err(|source| DatasetError::CocoJsonParse {
            path: "<string>".into(),
            source,
        })?;
    coco_to_dataset(coco, Path::new("<string>"), images_dir)
}

/// Reads COCO JSON bytes. Used by the fuzz targets.
pub fn from_coco_slice(bytes: &[u8], images_dir: &Path) -> Result<Dataset, DatasetError> {
    let coco: CocoDataset =
        serde_json::from_slice(bytes).map_err(|source| DatasetError::CocoJsonParse {
            path: "<bytes>".into(),
            source,
        })?;
    coco_to_dataset(coco, Path::new("<bytes>"), images_dir)
}

/// Writes a detection dataset as COCO JSON.
///
/// Every image is decoded to find its true dimensions and its original
/// bytes are written to `images_dir` as `{index}.{ext}`. Annotation areas
/// are computed from the boxes. Invalid boxes are skipped with a warning.
///
/// # Errors
/// `KindMismatch` for non-detection datasets. Image decode and write errors
/// abort the conversion; existing image files are not overwritten.
pub fn write_coco_json(path: &Path, dataset: &Dataset, images_dir: &Path) -> Result<(), DatasetError> {
    let Records::Detection(records) = dataset.records() else {
        return Err(DatasetError::KindMismatch {
            expected: DatasetKind::Detection,
            found: dataset.kind(),
        });
    };
    std::fs::create_dir_all(images_dir)?;

    let mut images = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let bytes = dataset.read_image_binary(&record.image)?;
        let decoded = image::load_from_memory(&bytes).map_err(|source| DatasetError::ImageDecode {
            path: record.image.clone(),
            source,
        })?;

        let file_name = sequential_file_name(index, &record.image);
        write_image_file(&images_dir.join(&file_name), &bytes)?;
        images.push(CocoImage {
            id: index as u64,
            width: decoded.width(),
            height: decoded.height(),
            file_name,
        });
    }

    let coco = CocoDataset {
        info: serde_json::Map::new(),
        images,
        annotations: annotations_from_records(records),
        categories: categories_from_labels(dataset.labels()?),
    };

    let file = File::create(path).map_err(DatasetError::Io)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &coco).map_err(|source| DatasetError::CocoJsonWrite {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!(
        "Wrote {} images and {} annotations to {}",
        coco.images.len(),
        coco.annotations.len(),
        path.display()
    );
    Ok(())
}

// ============================================================================
// Conversion: COCO -> Dataset
// ============================================================================

fn coco_to_dataset(
    coco: CocoDataset,
    source_path: &Path,
    images_dir: &Path,
) -> Result<Dataset, DatasetError> {
    let invalid = |message: String| DatasetError::CocoJsonInvalid {
        path: source_path.to_path_buf(),
        message,
    };

    // Category ids are 1-indexed; gaps get the stringified internal id.
    let mut name_map: HashMap<u64, String> = HashMap::with_capacity(coco.categories.len());
    for category in coco.categories {
        if category.id == 0 {
            return Err(invalid(format!(
                "category '{}' has id 0; COCO category ids start at 1",
                category.name
            )));
        }
        if category.id > u64::from(u32::MAX) {
            return Err(invalid(format!(
                "category '{}' has id {} which does not fit a class id",
                category.name, category.id
            )));
        }
        name_map.insert(category.id - 1, category.name);
    }
    let table_len = name_map.keys().max().map_or(0, |max| max + 1);
    let names = (0..table_len)
        .map(|i| name_map.remove(&i).unwrap_or_else(|| i.to_string()))
        .collect();
    let labels = LabelTable::new(names)?;

    let known_images: HashSet<u64> = coco.images.iter().map(|img| img.id).collect();
    let mut per_image: HashMap<u64, Vec<BoxLabel>> = HashMap::new();
    for ann in coco.annotations {
        if ann.category_id == 0 || ann.category_id > table_len {
            return Err(invalid(format!(
                "annotation {} references unknown category {}",
                ann.id, ann.category_id
            )));
        }
        if !known_images.contains(&ann.image_id) {
            log::warn!(
                "Annotation {} references unknown image {}. Skipping...",
                ann.id,
                ann.image_id
            );
            continue;
        }

        let [x, y, w, h] = ann.bbox;
        let label = BoxLabel {
            class_id: ClassId((ann.category_id - 1) as u32),
            bbox: BBox::from_xywh(x, y, w, h),
        };
        if !label.bbox.is_valid() {
            log::warn!(
                "Image {} has an invalid bounding box: {:?}. Skipping...",
                ann.image_id,
                label.bbox
            );
            continue;
        }

        let labels = per_image.entry(ann.image_id).or_default();
        if labels.contains(&label) {
            log::warn!(
                "Image {} has duplicated bounding boxes: {:?}. Skipping...",
                ann.image_id,
                label
            );
            continue;
        }
        labels.push(label);
    }

    let records = coco
        .images
        .into_iter()
        .map(|img| Record::new(img.file_name, per_image.remove(&img.id).unwrap_or_default()))
        .collect();

    Ok(Dataset::new(Records::Detection(records), images_dir).with_labels(labels))
}

// ============================================================================
// Conversion: Dataset -> COCO
// ============================================================================

fn sequential_file_name(index: usize, image: &str) -> String {
    match CompoundPath::parse(image).file_name().rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{index}.{ext}"),
        _ => index.to_string(),
    }
}

fn annotations_from_records(records: &[Record<BoxLabel>]) -> Vec<CocoAnnotation> {
    let mut annotations = Vec::new();
    for (index, record) in records.iter().enumerate() {
        for label in &record.labels {
            if !label.bbox.is_valid() {
                log::warn!(
                    "Skipping invalid box in {}: {:?}",
                    record.image,
                    label.bbox
                );
                continue;
            }
            let (x, y, w, h) = label.bbox.to_xywh();
            annotations.push(CocoAnnotation {
                id: annotations.len() as u64 + 1,
                image_id: index as u64,
                category_id: u64::from(label.class_id.as_u32()) + 1,
                bbox: [x as f64, y as f64, w as f64, h as f64],
                area: Some(label.bbox.area() as f64),
                iscrowd: Some(0),
            });
        }
    }
    annotations
}

fn categories_from_labels(labels: &LabelTable) -> Vec<CocoCategory> {
    labels
        .iter()
        .map(|(id, name)| CocoCategory {
            id: u64::from(id.as_u32()) + 1,
            name: name.to_string(),
            supercategory: Some("none".to_string()),
        })
        .collect()
}

fn write_image_file(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => DatasetError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => DatasetError::Io(e),
        })?;
    file.write_all(bytes)?;
    Ok(())
}
