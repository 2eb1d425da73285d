//! VisualGenome `relationships.json` reader.
//!
//! The file is a list of images, each with a list of relationships whose
//! subject and object carry a box and a name. Object names are lowercased;
//! predicates are lowercased and prefixed with `verb_` so they can never
//! clash with an object name in the shared label table. The table lists the
//! sorted object names first, then the sorted predicates.
//!
//! Images are expected as `{image_id}.jpg` under the images directory.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use super::model::{Dataset, Record, Records};
use super::{BBox, BoxLabel, ClassId, LabelTable, RelationLabel};
use crate::error::DatasetError;

/// Prefix applied to predicate names.
pub const PREDICATE_PREFIX: &str = "verb_";

#[derive(Debug, Deserialize)]
struct VgImage {
    image_id: u64,
    #[serde(default)]
    relationships: Vec<VgRelationship>,
}

#[derive(Debug, Deserialize)]
struct VgRelationship {
    predicate: String,
    subject: VgObject,
    object: VgObject,
}

#[derive(Debug, Deserialize)]
struct VgObject {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    names: Vec<String>,
}

impl VgObject {
    fn label_name(&self) -> Result<String, DatasetError> {
        self.names
            .first()
            .or(self.name.as_ref())
            .map(|name| name.to_lowercase())
            .ok_or_else(|| DatasetError::format("VisualGenome object has no name", format!("{self:?}")))
    }

    fn bbox(&self) -> BBox {
        BBox::from_xywh(self.x, self.y, self.w, self.h)
    }
}

/// A relationship with names still unresolved.
struct NamedRelation {
    subject: (String, BBox),
    object: (String, BBox),
    predicate: String,
}

/// Reads a VisualGenome relationships file into a relationship dataset.
pub fn read_visualgenome_json(path: &Path, images_dir: &Path) -> Result<Dataset, DatasetError> {
    let file = File::open(path).map_err(DatasetError::Io)?;
    let images: Vec<VgImage> = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        DatasetError::VisualGenomeJsonParse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    log::info!("Loaded {} entries from {}", images.len(), path.display());
    visualgenome_to_dataset(images, images_dir)
}

/// Reads VisualGenome JSON from a string. Useful for testing without file I/O.
pub fn from_visualgenome_str(json: &str, images_dir: &Path) -> Result<Dataset, DatasetError> {
    let images: Vec<VgImage> =
        serde_json::from_str(json).map_err(|source| DatasetError::VisualGenomeJsonParse {
            path: "<string>".into(),
            source,
        })?;
    visualgenome_to_dataset(images, images_dir)
}

fn visualgenome_to_dataset(images: Vec<VgImage>, images_dir: &Path) -> Result<Dataset, DatasetError> {
    let mut object_names = BTreeSet::new();
    let mut predicate_names = BTreeSet::new();
    let mut named: Vec<(String, Vec<NamedRelation>)> = Vec::with_capacity(images.len());

    for image in images {
        let file_name = format!("{}.jpg", image.image_id);
        let mut relations = Vec::with_capacity(image.relationships.len());
        for rel in image.relationships {
            let subject = (rel.subject.label_name()?, rel.subject.bbox());
            let object = (rel.object.label_name()?, rel.object.bbox());
            if !subject.1.is_valid() || !object.1.is_valid() {
                log::warn!(
                    "Image {} has an invalid bounding box in relationship '{}'. Skipping...",
                    image.image_id,
                    rel.predicate
                );
                continue;
            }
            let predicate = format!("{PREDICATE_PREFIX}{}", rel.predicate.to_lowercase());

            object_names.insert(subject.0.clone());
            object_names.insert(object.0.clone());
            predicate_names.insert(predicate.clone());
            relations.push(NamedRelation {
                subject,
                object,
                predicate,
            });
        }
        named.push((file_name, relations));
    }

    let labels = LabelTable::new(object_names.into_iter().chain(predicate_names).collect())?;
    let ids: HashMap<&str, ClassId> = labels.iter().map(|(id, name)| (name, id)).collect();
    let lookup = |name: &str| {
        ids.get(name)
            .copied()
            .ok_or_else(|| DatasetError::format("label name missing from table", name))
    };

    let mut records = Vec::with_capacity(named.len());
    for (file_name, relations) in named {
        let mut converted = Vec::with_capacity(relations.len());
        for rel in relations {
            converted.push(RelationLabel {
                subject: BoxLabel {
                    class_id: lookup(&rel.subject.0)?,
                    bbox: rel.subject.1,
                },
                object: BoxLabel {
                    class_id: lookup(&rel.object.0)?,
                    bbox: rel.object.1,
                },
                predicate: lookup(&rel.predicate)?,
            });
        }
        records.push(Record::new(file_name, converted));
    }

    Ok(Dataset::new(Records::Relationship(records), images_dir).with_labels(labels))
}
