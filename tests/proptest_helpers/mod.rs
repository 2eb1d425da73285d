#![allow(dead_code)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use simpledataset::dataset::{BBox, BoxLabel, ClassId, Dataset, Record, Records, RelationLabel};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Boxes with `x_min < x_max` and `y_min < y_max`, possibly reaching past 0.
pub fn arb_bbox() -> impl Strategy<Value = BBox> {
    (-50i64..500, -50i64..500, 1i64..300, 1i64..300)
        .prop_map(|(x, y, w, h)| BBox::new(x, y, x + w, y + h))
}

pub fn arb_box_label(num_classes: u32) -> impl Strategy<Value = BoxLabel> {
    (0..num_classes, arb_bbox()).prop_map(|(id, bbox)| BoxLabel::new(id, bbox))
}

pub fn arb_relation_label(num_classes: u32) -> impl Strategy<Value = RelationLabel> {
    (
        arb_box_label(num_classes),
        arb_box_label(num_classes),
        0..num_classes,
    )
        .prop_map(|(subject, object, predicate)| RelationLabel::new(subject, object, predicate))
}

/// Distinct class ids in random order.
pub fn arb_class_ids(num_classes: u32, max_len: usize) -> impl Strategy<Value = Vec<ClassId>> {
    proptest::collection::vec(0..num_classes, 0..=max_len).prop_map(|ids| {
        let mut seen = BTreeSet::new();
        ids.into_iter()
            .filter(|id| seen.insert(*id))
            .map(ClassId)
            .collect()
    })
}

/// Distinct, non-empty label names without line breaks.
pub fn arb_label_names(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("[a-z][a-z0-9_ ]{0,11}", 1..=max_len)
        .prop_map(|names| names.into_iter().collect())
}

fn image_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("img_{i:03}.png")).collect()
}

pub fn arb_detection_records(
    num_classes: u32,
    max_records: usize,
    max_labels: usize,
) -> impl Strategy<Value = Records> {
    proptest::collection::vec(
        proptest::collection::vec(arb_box_label(num_classes), 0..=max_labels),
        1..=max_records,
    )
    .prop_map(|labels| {
        Records::Detection(
            image_names(labels.len())
                .into_iter()
                .zip(labels)
                .map(|(image, labels)| Record::new(image, labels))
                .collect(),
        )
    })
}

pub fn arb_classification_records(
    num_classes: u32,
    max_records: usize,
    max_labels: usize,
) -> impl Strategy<Value = Records> {
    proptest::collection::vec(arb_class_ids(num_classes, max_labels), 1..=max_records).prop_map(
        |labels| {
            Records::Classification(
                image_names(labels.len())
                    .into_iter()
                    .zip(labels)
                    .map(|(image, labels)| Record::new(image, labels))
                    .collect(),
            )
        },
    )
}

pub fn arb_relationship_records(
    num_classes: u32,
    max_records: usize,
    max_labels: usize,
) -> impl Strategy<Value = Records> {
    proptest::collection::vec(
        proptest::collection::vec(arb_relation_label(num_classes), 0..=max_labels),
        1..=max_records,
    )
    .prop_map(|labels| {
        Records::Relationship(
            image_names(labels.len())
                .into_iter()
                .zip(labels)
                .map(|(image, labels)| Record::new(image, labels))
                .collect(),
        )
    })
}

/// Writes a tiny image for every record so the dataset can be packed.
pub fn materialize_images(dataset: &Dataset) {
    for image in dataset.records().image_paths() {
        super::common::write_png(&dataset.base_images_directory().join(image), 4, 4);
    }
}
