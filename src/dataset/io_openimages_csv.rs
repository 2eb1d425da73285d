//! OpenImages CSV readers.
//!
//! OpenImages ships box annotations as CSV with normalized coordinates and
//! no image dimensions, so every referenced image is looked up on disk and
//! sized from its header. Two files are supported:
//!
//! - `*-annotations-bbox.csv`: object detection boxes.
//! - `*-annotations-vrd.csv`: visual relationships. Only the attribute
//!   relationship `is` is kept; it becomes a detection box on the first
//!   object labelled with the attribute (`LabelName2`).
//!
//! Label names are the sorted set of `LabelName` values. Neither format can
//! be written.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use super::model::{Dataset, Record, Records};
use super::{BBox, BoxLabel, ClassId, LabelTable};
use crate::error::DatasetError;

/// Filters applied while reading the detection CSV.
#[derive(Clone, Copy, Debug)]
pub struct OpenImagesOdOptions {
    pub include_occluded: bool,
    pub include_depiction: bool,
    pub include_inside: bool,
}

impl Default for OpenImagesOdOptions {
    fn default() -> Self {
        Self {
            include_occluded: true,
            include_depiction: false,
            include_inside: false,
        }
    }
}

// ============================================================================
// CSV Schema Types (internal to this module)
// ============================================================================

#[derive(Debug, Deserialize)]
struct BoxRow {
    #[serde(rename = "ImageID")]
    image_id: String,
    #[serde(rename = "LabelName")]
    label_name: String,
    #[serde(rename = "XMin")]
    x_min: f64,
    #[serde(rename = "XMax")]
    x_max: f64,
    #[serde(rename = "YMin")]
    y_min: f64,
    #[serde(rename = "YMax")]
    y_max: f64,
    #[serde(rename = "IsOccluded", default)]
    is_occluded: Option<i8>,
    #[serde(rename = "IsDepiction", default)]
    is_depiction: Option<i8>,
    #[serde(rename = "IsInside", default)]
    is_inside: Option<i8>,
}

#[derive(Debug, Deserialize)]
struct RelationshipRow {
    #[serde(rename = "ImageID")]
    image_id: String,
    #[serde(rename = "LabelName2")]
    label_name2: String,
    #[serde(rename = "RelationshipLabel")]
    relationship: String,
    #[serde(rename = "XMin1")]
    x_min1: f64,
    #[serde(rename = "XMax1")]
    x_max1: f64,
    #[serde(rename = "YMin1")]
    y_min1: f64,
    #[serde(rename = "YMax1")]
    y_max1: f64,
}

/// A box still carrying its label name and normalized coordinates.
struct PendingBox {
    image_id: String,
    label_name: String,
    coords: [f64; 4],
}

// ============================================================================
// Public API
// ============================================================================

/// Reads an OpenImages box CSV into a detection dataset.
pub fn read_openimages_od(
    csv_path: &Path,
    images_dir: &Path,
    options: &OpenImagesOdOptions,
) -> Result<Dataset, DatasetError> {
    let mut label_names = BTreeSet::new();
    let mut pending = Vec::new();
    let mut total = 0usize;

    for row in read_rows::<BoxRow>(csv_path)? {
        total += 1;
        label_names.insert(row.label_name.clone());

        let flagged = |flag: Option<i8>| flag == Some(1);
        if (!options.include_occluded && flagged(row.is_occluded))
            || (!options.include_depiction && flagged(row.is_depiction))
            || (!options.include_inside && flagged(row.is_inside))
        {
            continue;
        }
        pending.push(PendingBox {
            image_id: row.image_id,
            label_name: row.label_name,
            coords: [row.x_min, row.y_min, row.x_max, row.y_max],
        });
    }

    log::info!(
        "Total number of boxes is {total}. Skipped {}.",
        total - pending.len()
    );
    build_dataset(pending, label_names, images_dir)
}

/// Reads an OpenImages relationship CSV, keeping only `is` rows, into a
/// detection dataset.
pub fn read_openimages_vr(csv_path: &Path, images_dir: &Path) -> Result<Dataset, DatasetError> {
    log::warn!("Only 'is' relationships are extracted from {}", csv_path.display());

    let mut label_names = BTreeSet::new();
    let mut pending = Vec::new();
    let mut total = 0usize;

    for row in read_rows::<RelationshipRow>(csv_path)? {
        total += 1;
        if row.relationship != "is" {
            continue;
        }
        label_names.insert(row.label_name2.clone());
        pending.push(PendingBox {
            image_id: row.image_id,
            label_name: row.label_name2,
            coords: [row.x_min1, row.y_min1, row.x_max1, row.y_max1],
        });
    }

    log::info!(
        "Total number of rows is {total}. Skipped {}.",
        total - pending.len()
    );
    build_dataset(pending, label_names, images_dir)
}

/// Finds an image as `{id}.jpg` or, for extracted train shards,
/// `train_{first char}/{id}.jpg`.
pub fn resolve_image_file_name(images_dir: &Path, image_id: &str) -> Option<String> {
    let file_name = format!("{image_id}.jpg");
    if images_dir.join(&file_name).is_file() {
        return Some(file_name);
    }
    let shard = image_id.chars().next()?;
    let sharded = format!("train_{shard}/{file_name}");
    images_dir.join(&sharded).is_file().then_some(sharded)
}

// ============================================================================
// Conversion
// ============================================================================

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, DatasetError> {
    let file = File::open(path).map_err(DatasetError::Io)?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    reader
        .deserialize()
        .map(|result| {
            result.map_err(|source| DatasetError::CsvParse {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

struct ImageEntry {
    file_name: String,
    size: (u32, u32),
    labels: Vec<BoxLabel>,
}

fn build_dataset(
    pending: Vec<PendingBox>,
    label_names: BTreeSet<String>,
    images_dir: &Path,
) -> Result<Dataset, DatasetError> {
    let labels = LabelTable::new(label_names.into_iter().collect())?;
    let ids: HashMap<String, ClassId> = labels
        .iter()
        .map(|(id, name)| (name.to_string(), id))
        .collect();

    // Images keep the order in which they first appear in the CSV.
    let mut order: Vec<String> = Vec::new();
    let mut images: HashMap<String, ImageEntry> = HashMap::new();

    for entry in pending {
        if !images.contains_key(&entry.image_id) {
            let file_name = resolve_image_file_name(images_dir, &entry.image_id).ok_or_else(|| {
                DatasetError::NotFound {
                    path: images_dir.join(format!("{}.jpg", entry.image_id)).display().to_string(),
                }
            })?;
            let size = image_size_on_disk(&images_dir.join(&file_name))?;
            order.push(entry.image_id.clone());
            images.insert(
                entry.image_id.clone(),
                ImageEntry {
                    file_name,
                    size,
                    labels: Vec::new(),
                },
            );
        }

        let Some(image) = images.get_mut(&entry.image_id) else {
            continue;
        };
        let Some(&class_id) = ids.get(&entry.label_name) else {
            continue;
        };
        let [x_min, y_min, x_max, y_max] = entry.coords;
        let bbox = BBox::from_normalized(x_min, y_min, x_max, y_max, image.size.0, image.size.1);
        if !bbox.is_valid() {
            log::warn!(
                "Image {} has an invalid bounding box: {:?}. Skipping...",
                entry.image_id,
                bbox
            );
            continue;
        }
        image.labels.push(BoxLabel { class_id, bbox });
    }

    let records = order
        .into_iter()
        .filter_map(|id| images.remove(&id))
        .map(|image| Record::new(image.file_name, image.labels))
        .collect();

    Ok(Dataset::new(Records::Detection(records), images_dir).with_labels(labels))
}

fn image_size_on_disk(path: &Path) -> Result<(u32, u32), DatasetError> {
    let size = imagesize::size(path).map_err(|source| DatasetError::ImageDimensionRead {
        path: path.display().to_string(),
        source,
    })?;
    Ok((size.width as u32, size.height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_image(dir: &Path, relative: &str, width: u32, height: u32) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create image dir");
        }
        image::RgbImage::new(width, height)
            .save_with_format(&path, image::ImageFormat::Png)
            .expect("write image");
    }

    #[test]
    fn test_resolve_image_file_name() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_image(temp.path(), "abc.jpg", 4, 4);
        write_image(temp.path(), "train_d/def.jpg", 4, 4);
        assert_eq!(
            resolve_image_file_name(temp.path(), "abc").as_deref(),
            Some("abc.jpg")
        );
        assert_eq!(
            resolve_image_file_name(temp.path(), "def").as_deref(),
            Some("train_d/def.jpg")
        );
        assert_eq!(resolve_image_file_name(temp.path(), "zzz"), None);
    }

    #[test]
    fn test_read_od_filters_and_scales() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_image(temp.path(), "img1.jpg", 100, 200);
        let csv_path = temp.path().join("boxes.csv");
        std::fs::write(
            &csv_path,
            "ImageID,Source,LabelName,Confidence,XMin,XMax,YMin,YMax,IsOccluded,IsTruncated,IsGroupOf,IsDepiction,IsInside\n\
             img1,xclick,/m/dog,1,0.1,0.5,0.25,0.75,1,0,0,0,0\n\
             img1,xclick,/m/cat,1,0.0,1.0,0.0,1.0,0,0,0,1,0\n\
             img1,xclick,/m/ant,1,0.2,0.3,0.2,0.3,0,0,0,0,0\n",
        )
        .expect("write csv");

        let dataset =
            read_openimages_od(&csv_path, temp.path(), &OpenImagesOdOptions::default()).unwrap();
        assert_eq!(dataset.labels().unwrap().names(), &["/m/ant", "/m/cat", "/m/dog"]);
        let Records::Detection(records) = dataset.records() else {
            panic!("expected detection records");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image, "img1.jpg");
        assert_eq!(
            records[0].labels,
            vec![
                BoxLabel::new(2, BBox::new(10, 50, 50, 150)),
                BoxLabel::new(0, BBox::new(20, 40, 30, 60)),
            ]
        );

        let strict = OpenImagesOdOptions {
            include_occluded: false,
            ..Default::default()
        };
        let dataset = read_openimages_od(&csv_path, temp.path(), &strict).unwrap();
        let Records::Detection(records) = dataset.records() else {
            panic!("expected detection records");
        };
        assert_eq!(records[0].labels.len(), 1);
    }

    #[test]
    fn test_read_vr_keeps_is_relationships() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_image(temp.path(), "img1.jpg", 10, 10);
        let csv_path = temp.path().join("vrd.csv");
        std::fs::write(
            &csv_path,
            "ImageID,LabelName1,LabelName2,XMin1,XMax1,YMin1,YMax1,XMin2,XMax2,YMin2,YMax2,RelationshipLabel\n\
             img1,/m/table,/m/wooden,0.0,0.5,0.0,0.5,0.0,0.5,0.0,0.5,is\n\
             img1,/m/man,/m/table,0.0,1.0,0.0,1.0,0.0,0.5,0.0,0.5,at\n",
        )
        .expect("write csv");

        let dataset = read_openimages_vr(&csv_path, temp.path()).unwrap();
        assert_eq!(dataset.labels().unwrap().names(), &["/m/wooden"]);
        let Records::Detection(records) = dataset.records() else {
            panic!("expected detection records");
        };
        assert_eq!(records[0].labels, vec![BoxLabel::new(0, BBox::new(0, 0, 5, 5))]);
    }

    #[test]
    fn test_missing_image_is_not_found() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let csv_path = temp.path().join("boxes.csv");
        std::fs::write(
            &csv_path,
            "ImageID,LabelName,XMin,XMax,YMin,YMax\nnope,/m/dog,0.1,0.5,0.1,0.5\n",
        )
        .expect("write csv");
        assert!(matches!(
            read_openimages_od(&csv_path, temp.path(), &OpenImagesOdOptions::default()),
            Err(DatasetError::NotFound { .. })
        ));
    }
}
