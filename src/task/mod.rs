//! Task conversion: re-deriving a dataset of one kind from another.
//!
//! Conversions are single steps chained along a fixed routing table:
//!
//! | From           | To             | Steps                                   |
//! |----------------|----------------|-----------------------------------------|
//! | relationship   | detection      | union boxes                             |
//! | relationship   | classification | union boxes, crop                       |
//! | detection      | classification | crop                                    |
//! | classification | detection      | full-frame boxes                        |
//!
//! Every step keeps the source label table.

use std::io::{Cursor, Write};
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::dataset::resolver::compound;
use crate::dataset::writer::{create_new_file, IMAGES_ARCHIVE};
use crate::dataset::{
    next_available_name, BBox, BoxLabel, ClassId, Dataset, DatasetKind, Record, Records,
};
use crate::error::DatasetError;

/// One single-kind conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Each relationship becomes its subject/object union box, labelled by predicate.
    UnionBoxes,
    /// Each box is cropped into its own classification record.
    CropBoxes,
    /// Each class id becomes a box covering the whole image.
    FullFrameBoxes,
}

/// The routing table. Adding a kind pair is one line here.
const ROUTES: &[(DatasetKind, DatasetKind, &[Step])] = &[
    (
        DatasetKind::Relationship,
        DatasetKind::Detection,
        &[Step::UnionBoxes],
    ),
    (
        DatasetKind::Relationship,
        DatasetKind::Classification,
        &[Step::UnionBoxes, Step::CropBoxes],
    ),
    (
        DatasetKind::Detection,
        DatasetKind::Classification,
        &[Step::CropBoxes],
    ),
    (
        DatasetKind::Classification,
        DatasetKind::Detection,
        &[Step::FullFrameBoxes],
    ),
];

/// The steps converting `from` into `to`, if the pair is routed.
pub fn route(from: DatasetKind, to: DatasetKind) -> Option<&'static [Step]> {
    ROUTES
        .iter()
        .find(|(src, dst, _)| *src == from && *dst == to)
        .map(|(_, _, steps)| *steps)
}

/// Converts `dataset` into a `to` dataset rooted at `output_directory`.
///
/// Cropping writes a fresh image archive into `output_directory`; the other
/// steps keep pointing at the source images.
///
/// # Errors
/// `UnsupportedConversion` for a kind pair missing from the routing table.
pub fn convert_task(
    dataset: Dataset,
    to: DatasetKind,
    output_directory: &Path,
) -> Result<Dataset, DatasetError> {
    let from = dataset.kind();
    let steps = route(from, to).ok_or_else(|| {
        DatasetError::UnsupportedConversion(format!("cannot convert {from} into {to}"))
    })?;
    std::fs::create_dir_all(output_directory)?;

    let mut dataset = dataset;
    for step in steps {
        dataset = match step {
            Step::UnionBoxes => union_boxes(&dataset, output_directory)?,
            Step::CropBoxes => crop_boxes(&dataset, output_directory)?,
            Step::FullFrameBoxes => full_frame_boxes(&dataset, output_directory)?,
        };
        log::info!("{step:?}: {} {} records", dataset.len(), dataset.kind());
    }
    Ok(dataset)
}

fn union_boxes(dataset: &Dataset, output_directory: &Path) -> Result<Dataset, DatasetError> {
    let Records::Relationship(records) = dataset.records() else {
        return Err(kind_mismatch(DatasetKind::Relationship, dataset));
    };
    let converted = records
        .iter()
        .map(|r| {
            let labels = r
                .labels
                .iter()
                .map(|rel| BoxLabel {
                    class_id: rel.predicate,
                    bbox: rel.union_box(),
                })
                .collect();
            Record::new(r.image.clone(), labels)
        })
        .collect();

    Ok(Dataset::new(Records::Detection(converted), output_directory)
        .with_images_directory(dataset.base_images_directory())
        .with_labels(dataset.labels()?.clone()))
}

fn full_frame_boxes(dataset: &Dataset, output_directory: &Path) -> Result<Dataset, DatasetError> {
    let Records::Classification(records) = dataset.records() else {
        return Err(kind_mismatch(DatasetKind::Classification, dataset));
    };
    let mut converted = Vec::with_capacity(records.len());
    for record in records {
        let (width, height) = dataset.image_size(&record.image)?;
        let frame = BBox::new(0, 0, i64::from(width), i64::from(height));
        let labels = record
            .labels
            .iter()
            .map(|&class_id| BoxLabel { class_id, bbox: frame })
            .collect();
        converted.push(Record::new(record.image.clone(), labels));
    }

    Ok(Dataset::new(Records::Detection(converted), output_directory)
        .with_images_directory(dataset.base_images_directory())
        .with_labels(dataset.labels()?.clone()))
}

fn crop_boxes(dataset: &Dataset, output_directory: &Path) -> Result<Dataset, DatasetError> {
    let Records::Detection(records) = dataset.records() else {
        return Err(kind_mismatch(DatasetKind::Detection, dataset));
    };

    let archive_name = next_available_name(output_directory, IMAGES_ARCHIVE)?;
    let file = create_new_file(&output_directory.join(&archive_name))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut converted: Vec<Record<ClassId>> = Vec::new();
    for record in records {
        if record.labels.is_empty() {
            continue;
        }
        let image = dataset.load_image(&record.image)?;
        let (width, height) = (image.width(), image.height());

        for label in &record.labels {
            let Some(region) = crop_region(&label.bbox, width, height) else {
                log::warn!(
                    "Invalid box detected: {:?} for image {} (w {width} x h {height})",
                    label.bbox,
                    record.image
                );
                continue;
            };

            let entry = format!("{}.jpg", converted.len());
            let bytes = encode_crop(&image, &region, &record.image)?;
            zip.start_file(entry.as_str(), options)?;
            zip.write_all(&bytes)?;
            converted.push(Record::new(
                compound(&archive_name, &entry),
                vec![label.class_id],
            ));
        }
    }
    zip.finish()?;

    Ok(Dataset::new(Records::Classification(converted), output_directory)
        .with_labels(dataset.labels()?.clone()))
}

/// The region of a `width x height` image to crop for `bbox`.
///
/// `None` if the box is inverted or has no overlap with the image. Boxes
/// reaching past the border are clamped.
pub fn crop_region(bbox: &BBox, width: u32, height: u32) -> Option<BBox> {
    if !bbox.overlaps_frame(width, height) {
        return None;
    }
    if bbox.is_inside_frame(width, height) {
        return Some(*bbox);
    }
    let clamped = bbox.clamp_to_frame(width, height);
    log::debug!("Clamping box {bbox:?} to {clamped:?} (w {width} x h {height})");
    Some(clamped)
}

fn encode_crop(image: &DynamicImage, region: &BBox, source: &str) -> Result<Vec<u8>, DatasetError> {
    // The region lies inside the image, so every coordinate fits in u32.
    let cropped = image.crop_imm(
        region.x_min as u32,
        region.y_min as u32,
        region.width() as u32,
        region.height() as u32,
    );
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(cropped.to_rgb8())
        .write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|source_err| DatasetError::ImageEncode {
            path: source.to_string(),
            source: source_err,
        })?;
    Ok(buf.into_inner())
}

fn kind_mismatch(expected: DatasetKind, dataset: &Dataset) -> DatasetError {
    DatasetError::KindMismatch {
        expected,
        found: dataset.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LabelTable, RelationLabel};

    fn labels(n: usize) -> LabelTable {
        LabelTable::new((0..n).map(|i| format!("c{i}")).collect()).unwrap()
    }

    #[test]
    fn test_routes() {
        assert_eq!(
            route(DatasetKind::Relationship, DatasetKind::Classification),
            Some(&[Step::UnionBoxes, Step::CropBoxes][..])
        );
        assert_eq!(route(DatasetKind::Classification, DatasetKind::Relationship), None);
        assert_eq!(route(DatasetKind::Detection, DatasetKind::Detection), None);
    }

    #[test]
    fn test_relationship_to_detection_unions_by_predicate() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let records = Records::Relationship(vec![Record::new(
            "a.jpg",
            vec![RelationLabel::new(
                BoxLabel::new(1, BBox::new(0, 0, 10, 10)),
                BoxLabel::new(2, BBox::new(5, 5, 20, 20)),
                9,
            )],
        )]);
        let dataset = Dataset::new(records, temp.path()).with_labels(labels(10));

        let converted = convert_task(dataset, DatasetKind::Detection, temp.path()).unwrap();
        let Records::Detection(records) = converted.records() else {
            panic!("expected detection records");
        };
        assert_eq!(records[0].labels, vec![BoxLabel::new(9, BBox::new(0, 0, 20, 20))]);
        assert_eq!(converted.labels().unwrap().len(), 10);
    }

    #[test]
    fn test_unrouted_pair_is_unsupported() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dataset = Dataset::new(Records::Detection(Vec::new()), temp.path());
        assert!(matches!(
            convert_task(dataset, DatasetKind::Relationship, temp.path()),
            Err(DatasetError::UnsupportedConversion(_))
        ));
    }

    #[test]
    fn test_crop_region() {
        assert_eq!(
            crop_region(&BBox::new(-10, -10, 50, 50), 100, 100),
            Some(BBox::new(0, 0, 50, 50))
        );
        assert_eq!(
            crop_region(&BBox::new(10, 10, 50, 50), 100, 100),
            Some(BBox::new(10, 10, 50, 50))
        );
        assert_eq!(crop_region(&BBox::new(100, 0, 150, 50), 100, 100), None);
        assert_eq!(crop_region(&BBox::new(-50, -50, 0, 10), 100, 100), None);
        assert_eq!(crop_region(&BBox::new(50, 50, 40, 60), 100, 100), None);
    }

    #[test]
    fn test_crop_leaves_existing_archive_untouched() {
        let temp = tempfile::tempdir().expect("create temp dir");
        std::fs::write(temp.path().join(IMAGES_ARCHIVE), b"keep").expect("write archive");
        let dataset = Dataset::new(Records::Detection(Vec::new()), temp.path())
            .with_labels(LabelTable::implicit(ClassId(0)));

        let cropped = convert_task(dataset, DatasetKind::Classification, temp.path()).unwrap();
        assert!(cropped.is_empty());
        assert!(temp.path().join("images0.zip").is_file());
        assert_eq!(
            std::fs::read(temp.path().join(IMAGES_ARCHIVE)).expect("read archive"),
            b"keep"
        );
    }
}
