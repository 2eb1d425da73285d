//! Label shapes for the three dataset kinds.
//!
//! Each kind stores a different per-record label type:
//!
//! | Kind           | Label type        | Stored as                          |
//! |----------------|-------------------|------------------------------------|
//! | classification | [`ClassId`]       | inline comma list in the manifest  |
//! | detection      | [`BoxLabel`]      | 5 integers per payload line        |
//! | relationship   | [`RelationLabel`] | 11 integers per payload line       |
//!
//! The [`Label`] trait gives kind-agnostic access to the class ids a label
//! references so transforms can be written once.

use std::fmt;

use super::bbox::BBox;
use super::ids::ClassId;
use super::kind::DatasetKind;
use super::model::{Record, Records};
use crate::error::DatasetError;

/// Common behaviour of every per-record label type.
pub trait Label: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// The dataset kind this label belongs to.
    const KIND: DatasetKind;

    /// Every class id slot referenced by this label.
    fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_;

    /// Returns a copy with every class id slot passed through `f`.
    fn map_class_ids<F: FnMut(ClassId) -> ClassId>(&self, f: &mut F) -> Self;

    /// Whether the label's geometry is storable. Always true without boxes.
    fn is_valid(&self) -> bool {
        true
    }

    /// Wraps typed records into the kind-tagged container.
    fn wrap(records: Vec<Record<Self>>) -> Records;
}

impl Label for ClassId {
    const KIND: DatasetKind = DatasetKind::Classification;

    fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::once(*self)
    }

    fn map_class_ids<F: FnMut(ClassId) -> ClassId>(&self, f: &mut F) -> Self {
        f(*self)
    }

    fn wrap(records: Vec<Record<Self>>) -> Records {
        Records::Classification(records)
    }
}

/// A labelled bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoxLabel {
    pub class_id: ClassId,
    pub bbox: BBox,
}

impl BoxLabel {
    pub fn new(class_id: impl Into<ClassId>, bbox: BBox) -> Self {
        Self {
            class_id: class_id.into(),
            bbox,
        }
    }
}

impl Label for BoxLabel {
    const KIND: DatasetKind = DatasetKind::Detection;

    fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::once(self.class_id)
    }

    fn map_class_ids<F: FnMut(ClassId) -> ClassId>(&self, f: &mut F) -> Self {
        BoxLabel {
            class_id: f(self.class_id),
            bbox: self.bbox,
        }
    }

    fn is_valid(&self) -> bool {
        self.bbox.is_valid()
    }

    fn wrap(records: Vec<Record<Self>>) -> Records {
        Records::Detection(records)
    }
}

/// A (subject, object, predicate) triple. Subject and object each carry a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RelationLabel {
    pub subject: BoxLabel,
    pub object: BoxLabel,
    pub predicate: ClassId,
}

impl RelationLabel {
    pub fn new(subject: BoxLabel, object: BoxLabel, predicate: impl Into<ClassId>) -> Self {
        Self {
            subject,
            object,
            predicate: predicate.into(),
        }
    }

    /// The box enclosing both the subject and the object.
    pub fn union_box(&self) -> BBox {
        self.subject.bbox.union(&self.object.bbox)
    }
}

impl Label for RelationLabel {
    const KIND: DatasetKind = DatasetKind::Relationship;

    fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        [self.subject.class_id, self.object.class_id, self.predicate].into_iter()
    }

    fn map_class_ids<F: FnMut(ClassId) -> ClassId>(&self, f: &mut F) -> Self {
        RelationLabel {
            subject: self.subject.map_class_ids(f),
            object: self.object.map_class_ids(f),
            predicate: f(self.predicate),
        }
    }

    fn is_valid(&self) -> bool {
        self.subject.is_valid() && self.object.is_valid()
    }

    fn wrap(records: Vec<Record<Self>>) -> Records {
        Records::Relationship(records)
    }
}

/// Labels stored as fixed-width integer lines in a side payload file.
pub trait PayloadLabel: Label + Copy {
    /// Number of whitespace-separated integers per payload line.
    const FIELD_COUNT: usize;

    /// Builds a label from exactly `FIELD_COUNT` parsed integers.
    fn from_fields(fields: &[i64]) -> Result<Self, DatasetError>;

    /// Appends the label's fields, space separated, without a newline.
    fn write_fields(&self, out: &mut String);
}

fn class_id_field(value: i64) -> Result<ClassId, DatasetError> {
    u32::try_from(value)
        .map(ClassId)
        .map_err(|_| DatasetError::format("invalid class id", value.to_string()))
}

fn box_from_fields(fields: &[i64]) -> Result<BoxLabel, DatasetError> {
    Ok(BoxLabel {
        class_id: class_id_field(fields[0])?,
        bbox: BBox::new(fields[1], fields[2], fields[3], fields[4]),
    })
}

fn write_box(label: &BoxLabel, out: &mut String) {
    use std::fmt::Write;
    let b = &label.bbox;
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "{} {} {} {} {}",
        label.class_id, b.x_min, b.y_min, b.x_max, b.y_max
    );
}

impl PayloadLabel for BoxLabel {
    const FIELD_COUNT: usize = 5;

    fn from_fields(fields: &[i64]) -> Result<Self, DatasetError> {
        box_from_fields(fields)
    }

    fn write_fields(&self, out: &mut String) {
        write_box(self, out);
    }
}

impl PayloadLabel for RelationLabel {
    const FIELD_COUNT: usize = 11;

    fn from_fields(fields: &[i64]) -> Result<Self, DatasetError> {
        Ok(RelationLabel {
            subject: box_from_fields(&fields[0..5])?,
            object: box_from_fields(&fields[5..10])?,
            predicate: class_id_field(fields[10])?,
        })
    }

    fn write_fields(&self, out: &mut String) {
        write_box(&self.subject, out);
        out.push(' ');
        write_box(&self.object, out);
        out.push(' ');
        out.push_str(&self.predicate.to_string());
    }
}
