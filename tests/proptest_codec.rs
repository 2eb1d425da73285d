use proptest::prelude::*;
use simpledataset::dataset::codec::{
    decode_class_ids, decode_payload, encode_class_ids, encode_payload,
};
use simpledataset::dataset::{write_dataset, BoxLabel, Dataset, LabelTable, RelationLabel, WriteOptions};
use simpledataset::task::crop_region;

mod common;
mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn box_payload_survives_encoding(
        labels in proptest::collection::vec(proptest_helpers::arb_box_label(50), 0..20)
    ) {
        let text = encode_payload(&labels);
        prop_assert_eq!(text.lines().count(), labels.len());
        let decoded: Vec<BoxLabel> = decode_payload(&text).expect("decode");
        prop_assert_eq!(decoded, labels);
    }

    #[test]
    fn relation_payload_survives_encoding(
        labels in proptest::collection::vec(proptest_helpers::arb_relation_label(50), 0..20)
    ) {
        let decoded: Vec<RelationLabel> = decode_payload(&encode_payload(&labels)).expect("decode");
        prop_assert_eq!(decoded, labels);
    }

    #[test]
    fn class_id_field_survives_encoding(ids in proptest_helpers::arb_class_ids(1000, 10)) {
        let field = encode_class_ids(&ids);
        prop_assert!(!field.contains(' '));
        prop_assert_eq!(decode_class_ids(&field).expect("decode"), ids);
    }

    #[test]
    fn label_table_text_survives_parsing(names in proptest_helpers::arb_label_names(20)) {
        let table = LabelTable::new(names).expect("unique names");
        let parsed = LabelTable::parse(&table.to_text()).expect("parse");
        prop_assert_eq!(parsed, table);
    }

    #[test]
    fn payload_decoder_rejects_short_lines(
        fields in proptest::collection::vec(-100i64..100, 1..5)
    ) {
        let line: Vec<String> = fields.iter().map(i64::to_string).collect();
        prop_assert!(decode_payload::<BoxLabel>(&line.join(" ")).is_err());
    }

    #[test]
    fn crop_regions_lie_inside_the_frame(
        bbox in proptest_helpers::arb_bbox(),
        width in 1u32..400,
        height in 1u32..400,
    ) {
        if let Some(region) = crop_region(&bbox, width, height) {
            prop_assert!(region.is_valid());
            prop_assert!(region.x_min >= 0 && region.y_min >= 0);
            prop_assert!(region.x_max <= i64::from(width));
            prop_assert!(region.y_max <= i64::from(height));
        }
    }

    #[test]
    fn written_detection_datasets_reload_identically(
        records in proptest_helpers::arb_detection_records(5, 5, 4)
    ) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dataset = Dataset::new(records, temp.path());
        let output = temp.path().join("out.txt");
        write_dataset(&output, &dataset, &WriteOptions::default()).expect("write");

        let reloaded = Dataset::load_file(&output, None).expect("reload");
        prop_assert_eq!(reloaded.records(), dataset.records());
    }

    #[test]
    fn packed_relationship_datasets_reload_identically(
        records in proptest_helpers::arb_relationship_records(5, 3, 3)
    ) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let source = Dataset::new(records, temp.path().join("src"));
        proptest_helpers::materialize_images(&source);

        let output = temp.path().join("packed/out.txt");
        let options = WriteOptions { copy_images: true, ..WriteOptions::default() };
        write_dataset(&output, &source, &options).expect("write");

        let reloaded = Dataset::load_file(&output, None).expect("reload");
        prop_assert_eq!(reloaded.len(), source.len());
        for (a, b) in reloaded.records().image_paths().iter().zip(source.records().image_paths()) {
            prop_assert_eq!(*a, format!("images.zip@{b}"));
        }
        prop_assert_eq!(reloaded.records().class_ids(), source.records().class_ids());
    }
}
