//! HICO-DET `anno_bbox.mat` reader.
//!
//! `list_action` enumerates the human-object interactions as (object, verb)
//! pairs. Each image in `bbox_train` or `bbox_test` lists its interactions
//! with the human and object boxes involved and a `connection` matrix pairing
//! them. Every pair becomes a relationship whose subject is a `person`.
//!
//! The label table lists the sorted object names (including `person`), then
//! the sorted verbs prefixed with `verb_`. Interactions flagged invisible are
//! skipped.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::io_visualgenome_json::PREDICATE_PREFIX;
use super::mat5::{MatArray, MatFile};
use super::model::{Dataset, Record, Records};
use super::{BBox, BoxLabel, ClassId, LabelTable, RelationLabel};
use crate::error::DatasetError;

const PERSON: &str = "person";

/// Which annotation split to read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HicoDetSplit {
    #[default]
    Train,
    Test,
}

impl HicoDetSplit {
    /// The MAT variable holding the split.
    pub fn key(&self) -> &'static str {
        match self {
            HicoDetSplit::Train => "bbox_train",
            HicoDetSplit::Test => "bbox_test",
        }
    }
}

impl fmt::Display for HicoDetSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HicoDetSplit::Train => "train",
            HicoDetSplit::Test => "test",
        })
    }
}

impl FromStr for HicoDetSplit {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" | "bbox_train" => Ok(HicoDetSplit::Train),
            "test" | "bbox_test" => Ok(HicoDetSplit::Test),
            _ => Err(DatasetError::format(
                "unknown HICO-DET split (expected train or test)",
                s,
            )),
        }
    }
}

/// Reads a HICO-DET annotation file into a relationship dataset.
pub fn read_hicodet_mat(
    path: &Path,
    images_dir: &Path,
    split: HicoDetSplit,
) -> Result<Dataset, DatasetError> {
    let bytes = std::fs::read(path)?;
    let mat = MatFile::parse(&bytes)?;
    log::info!(
        "Loaded {} from {}",
        mat.names().collect::<Vec<_>>().join(", "),
        path.display()
    );
    hicodet_to_dataset(&mat, images_dir, split, path)
}

/// Reads HICO-DET annotations from MAT file bytes.
pub fn from_hicodet_slice(
    bytes: &[u8],
    images_dir: &Path,
    split: HicoDetSplit,
) -> Result<Dataset, DatasetError> {
    let mat = MatFile::parse(bytes)?;
    hicodet_to_dataset(&mat, images_dir, split, Path::new("<bytes>"))
}

fn invalid(path: &Path, message: impl Into<String>) -> DatasetError {
    DatasetError::HicoDetInvalid {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn field<'a>(
    array: &'a MatArray,
    index: usize,
    name: &str,
    path: &Path,
) -> Result<&'a MatArray, DatasetError> {
    array
        .field(index, name)
        .ok_or_else(|| invalid(path, format!("element {index} has no field '{name}'")))
}

fn text_field(array: &MatArray, index: usize, name: &str, path: &Path) -> Result<String, DatasetError> {
    field(array, index, name, path)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| invalid(path, format!("field '{name}' of element {index} is not text")))
}

fn scalar_field(array: &MatArray, index: usize, name: &str, path: &Path) -> Result<f64, DatasetError> {
    field(array, index, name, path)?
        .scalar()
        .ok_or_else(|| invalid(path, format!("field '{name}' of element {index} is not a number")))
}

/// Boxes of a `bboxhuman`/`bboxobject` struct array, in index order.
fn read_boxes(array: &MatArray, path: &Path) -> Result<Vec<BBox>, DatasetError> {
    (0..array.len())
        .map(|i| {
            let coord = |name: &str| scalar_field(array, i, name, path).map(|v| v as i64);
            Ok::<_, DatasetError>(BBox::new(coord("x1")?, coord("y1")?, coord("x2")?, coord("y2")?))
        })
        .collect()
}

/// 1-based (human, object) index pairs from an `M x 2` connection matrix.
fn read_connections(array: &MatArray, path: &Path) -> Result<Vec<(usize, usize)>, DatasetError> {
    if array.is_empty() {
        return Ok(Vec::new());
    }
    let data = array
        .numeric()
        .ok_or_else(|| invalid(path, "connection is not numeric"))?;
    let [rows, 2] = array.dims() else {
        return Err(invalid(
            path,
            format!("connection has dimensions {:?}, expected M x 2", array.dims()),
        ));
    };
    let (humans, objects) = data
        .split_at_checked(*rows)
        .ok_or_else(|| invalid(path, "connection data is shorter than its dimensions"))?;
    Ok(humans
        .iter()
        .zip(objects)
        .map(|(&h, &o)| (h as usize, o as usize))
        .collect())
}

fn hicodet_to_dataset(
    mat: &MatFile,
    images_dir: &Path,
    split: HicoDetSplit,
    path: &Path,
) -> Result<Dataset, DatasetError> {
    let action_list = mat
        .get("list_action")
        .ok_or_else(|| invalid(path, "missing variable 'list_action'"))?;
    let mut actions = Vec::new();
    for i in 0..action_list.len() {
        let object = text_field(action_list, i, "nname", path)?;
        let verb = text_field(action_list, i, "vname", path)?;
        actions.push((object, format!("{PREDICATE_PREFIX}{verb}")));
    }

    let mut object_names: BTreeSet<&str> = actions.iter().map(|(o, _)| o.as_str()).collect();
    object_names.insert(PERSON);
    let verb_names: BTreeSet<&str> = actions.iter().map(|(_, v)| v.as_str()).collect();
    let labels = LabelTable::new(
        object_names
            .into_iter()
            .chain(verb_names)
            .map(str::to_string)
            .collect(),
    )?;
    let ids: HashMap<&str, ClassId> = labels.iter().map(|(id, name)| (name, id)).collect();
    let lookup = |name: &str| {
        ids.get(name)
            .copied()
            .ok_or_else(|| DatasetError::format("label name missing from table", name))
    };
    let person = lookup(PERSON)?;
    let action_ids = actions
        .iter()
        .map(|(object, verb)| Ok((lookup(object)?, lookup(verb)?)))
        .collect::<Result<Vec<_>, DatasetError>>()?;

    let images = mat
        .get(split.key())
        .ok_or_else(|| invalid(path, format!("missing variable '{}'", split.key())))?;
    let mut records = Vec::new();
    for i in 0..images.len() {
        let file_name = text_field(images, i, "filename", path)?;
        let interactions = field(images, i, "hoi", path)?;
        let mut relations = Vec::new();
        for j in 0..interactions.len() {
            if scalar_field(interactions, j, "invis", path)? != 0.0 {
                continue;
            }
            let action = scalar_field(interactions, j, "id", path)? as usize;
            let &(object_id, predicate) = action
                .checked_sub(1)
                .and_then(|k| action_ids.get(k))
                .ok_or_else(|| invalid(path, format!("{file_name}: unknown action id {action}")))?;

            let humans = read_boxes(field(interactions, j, "bboxhuman", path)?, path)?;
            let objects = read_boxes(field(interactions, j, "bboxobject", path)?, path)?;
            for (h, o) in read_connections(field(interactions, j, "connection", path)?, path)? {
                let pick = |boxes: &[BBox], index: usize| {
                    index
                        .checked_sub(1)
                        .and_then(|k| boxes.get(k))
                        .copied()
                        .ok_or_else(|| {
                            invalid(path, format!("{file_name}: connection index {index} out of range"))
                        })
                };
                let (human, object) = (pick(&humans, h)?, pick(&objects, o)?);
                if !human.is_valid() || !object.is_valid() {
                    log::warn!(
                        "Image {file_name} has an invalid bounding box in action {action}. Skipping..."
                    );
                    continue;
                }
                relations.push(RelationLabel {
                    subject: BoxLabel {
                        class_id: person,
                        bbox: human,
                    },
                    object: BoxLabel {
                        class_id: object_id,
                        bbox: object,
                    },
                    predicate,
                });
            }
        }
        records.push(Record::new(file_name, relations));
    }

    Ok(Dataset::new(Records::Relationship(records), images_dir).with_labels(labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::mat5::encode::{file, matrix, scalar, structs, text};

    fn boxes(coords: &[[f64; 4]]) -> MatArray {
        structs(
            &["x1", "x2", "y1", "y2"],
            coords
                .iter()
                .map(|c| c.iter().map(|&v| scalar(v)).collect())
                .collect(),
        )
    }

    fn interaction(
        id: f64,
        humans: &[[f64; 4]],
        objects: &[[f64; 4]],
        connection: MatArray,
        invis: f64,
    ) -> Vec<MatArray> {
        vec![
            scalar(id),
            boxes(humans),
            boxes(objects),
            connection,
            scalar(invis),
        ]
    }

    const HOI_FIELDS: [&str; 5] = ["id", "bboxhuman", "bboxobject", "connection", "invis"];

    fn image(name: &str, hoi: Vec<Vec<MatArray>>) -> Vec<MatArray> {
        vec![
            text(name),
            structs(&["width", "height"], vec![vec![scalar(640.0), scalar(480.0)]]),
            structs(&HOI_FIELDS, hoi),
        ]
    }

    fn annotations(compress: bool) -> Vec<u8> {
        let list_action = structs(
            &["nname", "vname", "vname_ing"],
            vec![
                vec![text("bicycle"), text("ride"), text("riding")],
                vec![text("bicycle"), text("hold"), text("holding")],
                vec![text("apple"), text("eat"), text("eating")],
            ],
        );
        // Boxes are x1, x2, y1, y2.
        let train = structs(
            &["filename", "size", "hoi"],
            vec![
                image(
                    "HICO_train_1.jpg",
                    vec![
                        interaction(
                            1.0,
                            &[[10.0, 50.0, 20.0, 80.0], [60.0, 90.0, 20.0, 80.0]],
                            &[[5.0, 95.0, 40.0, 100.0]],
                            matrix(2, 2, vec![1.0, 2.0, 1.0, 1.0]),
                            0.0,
                        ),
                        interaction(
                            2.0,
                            &[[10.0, 50.0, 20.0, 80.0]],
                            &[[5.0, 95.0, 40.0, 100.0]],
                            matrix(0, 0, Vec::new()),
                            1.0,
                        ),
                    ],
                ),
                image(
                    "HICO_train_2.jpg",
                    vec![interaction(
                        3.0,
                        &[[30.0, 10.0, 0.0, 10.0]],
                        &[[0.0, 5.0, 0.0, 5.0]],
                        matrix(1, 2, vec![1.0, 1.0]),
                        0.0,
                    )],
                ),
            ],
        );
        let test = structs(&["filename", "size", "hoi"], vec![image("HICO_test_1.jpg", Vec::new())]);
        file(
            &[("list_action", list_action), ("bbox_train", train), ("bbox_test", test)],
            compress,
        )
    }

    #[test]
    fn test_reads_train_split() {
        for compress in [false, true] {
            let dataset =
                from_hicodet_slice(&annotations(compress), Path::new("images"), HicoDetSplit::Train)
                    .unwrap();
            assert_eq!(
                dataset.labels().unwrap().names(),
                &["apple", "bicycle", "person", "verb_eat", "verb_hold", "verb_ride"]
            );

            let Records::Relationship(records) = dataset.records() else {
                panic!("expected relationship records");
            };
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].image, "HICO_train_1.jpg");
            let object = BoxLabel::new(1, BBox::new(5, 40, 95, 100));
            assert_eq!(
                records[0].labels,
                vec![
                    RelationLabel::new(BoxLabel::new(2, BBox::new(10, 20, 50, 80)), object, 5),
                    RelationLabel::new(BoxLabel::new(2, BBox::new(60, 20, 90, 80)), object, 5),
                ]
            );
            // The inverted human box is skipped.
            assert!(records[1].labels.is_empty());
        }
    }

    #[test]
    fn test_reads_test_split() {
        let dataset =
            from_hicodet_slice(&annotations(false), Path::new("images"), HicoDetSplit::Test).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records().image_paths(), vec!["HICO_test_1.jpg"]);
        assert_eq!(dataset.labels().unwrap().len(), 6);
    }

    #[test]
    fn test_bad_indices_are_errors() {
        let list_action = structs(&["nname", "vname"], vec![vec![text("apple"), text("eat")]]);
        let with = |id: f64, connection: MatArray| {
            let train = structs(
                &["filename", "size", "hoi"],
                vec![image(
                    "a.jpg",
                    vec![interaction(
                        id,
                        &[[0.0, 10.0, 0.0, 10.0]],
                        &[[0.0, 10.0, 0.0, 10.0]],
                        connection,
                        0.0,
                    )],
                )],
            );
            let bytes = file(&[("list_action", list_action.clone()), ("bbox_train", train)], false);
            from_hicodet_slice(&bytes, Path::new("."), HicoDetSplit::Train)
        };

        assert!(with(1.0, matrix(1, 2, vec![1.0, 1.0])).is_ok());
        for result in [
            with(2.0, matrix(1, 2, vec![1.0, 1.0])),
            with(0.0, matrix(1, 2, vec![1.0, 1.0])),
            with(1.0, matrix(1, 2, vec![2.0, 1.0])),
            with(1.0, matrix(1, 3, vec![1.0, 1.0, 1.0])),
        ] {
            assert!(matches!(result, Err(DatasetError::HicoDetInvalid { .. })));
        }
    }

    #[test]
    fn test_missing_variables_are_errors() {
        let bytes = file(&[("list_action", structs(&["nname", "vname"], Vec::new()))], false);
        assert!(matches!(
            from_hicodet_slice(&bytes, Path::new("."), HicoDetSplit::Train),
            Err(DatasetError::HicoDetInvalid { message, .. }) if message.contains("bbox_train")
        ));
        assert!(matches!(
            from_hicodet_slice(&file(&[], false), Path::new("."), HicoDetSplit::Train),
            Err(DatasetError::HicoDetInvalid { .. })
        ));
    }

    #[test]
    fn test_split_names() {
        assert_eq!("train".parse::<HicoDetSplit>().unwrap(), HicoDetSplit::Train);
        assert_eq!("bbox_test".parse::<HicoDetSplit>().unwrap(), HicoDetSplit::Test);
        assert!("val".parse::<HicoDetSplit>().is_err());
        assert_eq!(HicoDetSplit::Test.to_string(), "test");
        assert_eq!(HicoDetSplit::default().key(), "bbox_train");
    }
}
