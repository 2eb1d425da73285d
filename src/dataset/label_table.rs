//! The ordered class name table (`labels.txt`).

use std::collections::HashSet;
use std::fmt;

use super::ids::ClassId;
use crate::error::DatasetError;

/// File name of the label table next to a manifest.
pub const LABEL_TABLE_FILE: &str = "labels.txt";

/// Ordered, unique class names. The index of a name is its class id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    /// Builds a table, rejecting duplicate names.
    pub fn new(names: Vec<String>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(DatasetError::format("duplicate name in label table", name));
            }
        }
        Ok(Self { names })
    }

    /// The stringified ids `"0"` through `"{max_class_id}"`.
    pub fn implicit(max_class_id: ClassId) -> Self {
        Self {
            names: (0..=max_class_id.as_u32()).map(|i| i.to_string()).collect(),
        }
    }

    /// Parses a label table file: one name per line. Trailing blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, DatasetError> {
        let mut names: Vec<String> = text
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        while names.last().is_some_and(|name| name.trim().is_empty()) {
            names.pop();
        }
        Self::new(names)
    }

    /// Renders the file form, one name per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, id: ClassId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Name for `id`, or the stringified id when it is outside the table.
    pub fn name_or_id(&self, id: ClassId) -> String {
        self.get(id).map_or_else(|| id.to_string(), str::to_string)
    }

    pub fn position(&self, name: &str) -> Option<ClassId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ClassId(i as u32))
    }

    pub fn contains(&self, id: ClassId) -> bool {
        id.index() < self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (ClassId(i as u32), name.as_str()))
    }
}

impl fmt::Display for LabelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
