//! Dataset kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DatasetError;

/// The annotation shape carried by a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// A set of class ids per image.
    Classification,
    /// A list of labelled boxes per image.
    Detection,
    /// A list of (subject box, object box, predicate) triples per image.
    Relationship,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::Classification,
        DatasetKind::Detection,
        DatasetKind::Relationship,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Classification => "classification",
            DatasetKind::Detection => "detection",
            DatasetKind::Relationship => "relationship",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" | "image_classification" | "ic" => Ok(DatasetKind::Classification),
            "detection" | "object_detection" | "od" => Ok(DatasetKind::Detection),
            "relationship" | "visual_relationship" | "vr" => Ok(DatasetKind::Relationship),
            other => Err(DatasetError::format("unknown dataset kind", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!(
            "classification".parse::<DatasetKind>().unwrap(),
            DatasetKind::Classification
        );
        assert_eq!(
            "object_detection".parse::<DatasetKind>().unwrap(),
            DatasetKind::Detection
        );
        assert_eq!(
            "Visual_Relationship".parse::<DatasetKind>().unwrap(),
            DatasetKind::Relationship
        );
        assert!("segmentation".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.to_string().parse::<DatasetKind>().unwrap(), kind);
        }
    }
}
