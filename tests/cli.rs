use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

mod common;
use common::{write_labels, write_manifest, write_png, write_zip, zip_entries};

fn simpledataset() -> Command {
    Command::cargo_bin("simpledataset").unwrap()
}

fn create_classification(dir: &Path) {
    write_png(&dir.join("a.png"), 8, 8);
    write_png(&dir.join("b.png"), 8, 8);
    write_png(&dir.join("c.png"), 8, 8);
    write_manifest(&dir.join("train.txt"), &["a.png 0,2", "b.png 2", "c.png"]);
    write_labels(dir, &["cat", "dog", "bird"]);
}

fn create_detection(dir: &Path) {
    write_png(&dir.join("a.png"), 100, 100);
    write_zip(
        &dir.join("labels.zip"),
        &[("0.txt", b"3 -10 -10 50 50\n0 10 10 20 20\n".as_slice())],
    );
    write_manifest(&dir.join("train.txt"), &["a.png labels.zip@0.txt"]);
    write_labels(dir, &["a", "b", "c", "d"]);
}

#[test]
fn outputs_tool_name() {
    let mut cmd = simpledataset();
    cmd.arg("-V");
    cmd.assert().success().stdout("simpledataset 0.3.0\n");
}

#[test]
fn requires_a_subcommand() {
    simpledataset().assert().failure();
}

// Inspection

#[test]
fn summary_prints_distribution() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("summary").arg(temp.path().join("train.txt"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("classification"))
        .stdout(predicate::str::contains("bird"));
}

#[test]
fn summary_json_output_format() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("summary")
        .arg(temp.path().join("train.txt"))
        .args(["--output", "json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"records\": 3"))
        .stdout(predicate::str::contains("\"max_class_id\": 2"));
}

#[test]
fn validate_warns_on_empty_records() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("validate").arg(temp.path().join("train.txt"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("EmptyRecord"));

    let mut strict = simpledataset();
    strict
        .arg("validate")
        .arg(temp.path().join("train.txt"))
        .arg("--strict");
    strict.assert().failure();
}

#[test]
fn validate_reports_short_label_table() {
    let temp = tempfile::tempdir().expect("create temp dir");
    write_manifest(&temp.path().join("train.txt"), &["a.png 5"]);
    write_labels(temp.path(), &["only"]);

    let mut cmd = simpledataset();
    cmd.arg("validate").arg(temp.path().join("train.txt"));
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("InvalidLabelTable"))
        .stderr(predicate::str::contains("error(s)"));
}

#[test]
fn missing_manifest_fails() {
    let mut cmd = simpledataset();
    cmd.args(["summary", "nonexistent_manifest.txt"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

// Transforms

#[test]
fn filter_keeps_selected_classes() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("filter")
        .arg(temp.path().join("train.txt"))
        .arg(temp.path().join("dogs.txt"))
        .args(["--include", "2"]);
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("dogs.txt")).unwrap(),
        "a.png 2\nb.png 2\n"
    );
}

#[test]
fn filter_refuses_existing_output() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("filter")
        .arg(temp.path().join("train.txt"))
        .arg(temp.path().join("train.txt"))
        .args(["--exclude", "0"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn map_and_defrag() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut map = simpledataset();
    map.arg("map")
        .arg(temp.path().join("train.txt"))
        .arg(temp.path().join("mapped.txt"))
        .args(["--map", "0:2"]);
    map.assert().success();
    assert_eq!(
        fs::read_to_string(temp.path().join("mapped.txt")).unwrap(),
        "a.png 2\nb.png 2\nc.png\n"
    );

    let mut defrag = simpledataset();
    defrag
        .arg("defrag")
        .arg(temp.path().join("train.txt"))
        .arg(temp.path().join("defrag.txt"));
    defrag
        .assert()
        .success()
        .stdout(predicate::str::contains("2 => 1 (bird)"));
    assert_eq!(
        fs::read_to_string(temp.path().join("defrag.txt")).unwrap(),
        "a.png 0,1\nb.png 1\nc.png\n"
    );
}

#[test]
fn sample_with_seed_is_reproducible() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    for name in ["s1.txt", "s2.txt"] {
        let mut cmd = simpledataset();
        cmd.arg("sample")
            .arg(temp.path().join("train.txt"))
            .arg(temp.path().join(name))
            .args(["-n", "2", "--seed", "7"]);
        cmd.assert().success();
    }
    let first = fs::read_to_string(temp.path().join("s1.txt")).unwrap();
    assert_eq!(first.lines().count(), 2);
    assert_eq!(first, fs::read_to_string(temp.path().join("s2.txt")).unwrap());
}

#[test]
fn sample_rejects_bad_fraction() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("sample")
        .arg(temp.path().join("train.txt"))
        .arg(temp.path().join("s.txt"))
        .args(["--fraction", "1.5"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid sample parameters"));
}

#[test]
fn concat_merges_label_tables() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(&temp.path().join("one"));
    create_classification(&temp.path().join("two"));

    let mut cmd = simpledataset();
    cmd.arg("concat")
        .arg(temp.path().join("one/train.txt"))
        .arg(temp.path().join("two/train.txt"))
        .arg("-o")
        .arg(temp.path().join("all.txt"))
        .arg("--dedup-images");
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("labels.txt")).unwrap(),
        "cat\ndog\nbird\ncat.\ndog.\nbird.\n"
    );
    // Identical image bytes are merged into the first record.
    assert_eq!(
        fs::read_to_string(temp.path().join("all.txt")).unwrap(),
        "one/a.png 0,2,3,5\n"
    );
}

#[test]
fn pack_drops_empty_records() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("pack")
        .arg(temp.path().join("train.txt"))
        .arg(temp.path().join("packed/train.txt"));
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("packed/train.txt")).unwrap(),
        "images.zip@a.png 0,2\nimages.zip@b.png 2\n"
    );
    assert_eq!(
        zip_entries(&temp.path().join("packed/images.zip")),
        vec!["a.png", "b.png"]
    );
}

#[test]
fn create_packs_unlabelled_images() {
    let temp = tempfile::tempdir().expect("create temp dir");
    write_png(&temp.path().join("x.png"), 4, 4);

    let mut cmd = simpledataset();
    cmd.current_dir(temp.path())
        .args(["create", "x.png", "-o", "new/train.txt"]);
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("new/train.txt")).unwrap(),
        "images.zip@x.png\n"
    );
    assert!(!temp.path().join("new/labels.txt").exists());
}

// Conversions

#[test]
fn convert_task_crops_boxes() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_detection(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("convert-task")
        .arg(temp.path().join("train.txt"))
        .arg("classification")
        .arg(temp.path().join("crops/train.txt"));
    cmd.assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("crops/train.txt")).unwrap(),
        "images.zip@0.jpg 3\nimages.zip@1.jpg 0\n"
    );
}

#[test]
fn convert_task_rejects_unrouted_pair() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_classification(temp.path());

    let mut cmd = simpledataset();
    cmd.arg("convert-task")
        .arg(temp.path().join("train.txt"))
        .arg("relationship")
        .arg(temp.path().join("vr.txt"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported conversion"));
}

#[test]
fn convert_to_coco_and_back() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_detection(&temp.path().join("src"));

    let mut to = simpledataset();
    to.arg("convert-to")
        .arg(temp.path().join("src/train.txt"))
        .arg("coco")
        .arg(temp.path().join("coco/instances.json"));
    to.assert().success();
    assert!(temp.path().join("coco/0.png").exists());

    let mut from = simpledataset();
    from.arg("convert-from")
        .arg(temp.path().join("coco/instances.json"))
        .arg("coco")
        .arg(temp.path().join("coco/train.txt"));
    from.assert().success();
    assert_eq!(
        fs::read_to_string(temp.path().join("coco/train.txt")).unwrap(),
        "0.png labels.zip@0.txt\n"
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("coco/labels.txt")).unwrap(),
        "a\nb\nc\nd\n"
    );
}

#[test]
fn convert_from_unknown_format_fails() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let mut cmd = simpledataset();
    cmd.arg("convert-from")
        .arg(temp.path().join("input.xml"))
        .arg("pascalvoc")
        .arg(temp.path().join("train.txt"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported format"));
}

#[test]
fn convert_from_hicodet_rejects_hdf5_mat_files() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let input = temp.path().join("anno_bbox.mat");
    fs::write(&input, b"MATLAB 7.3 MAT-file, Platform: GLNXA64").expect("write mat file");

    let mut cmd = simpledataset();
    cmd.arg("convert-from")
        .arg(&input)
        .arg("hicodet")
        .arg(temp.path().join("train.txt"))
        .arg("--split")
        .arg("test");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("v7.3 MAT files"));
    assert!(!temp.path().join("train.txt").exists());
}
