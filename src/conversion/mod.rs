//! External format registry.
//!
//! Each interchange format maps to a reader producing a [`Dataset`] and,
//! where the external ecosystem has a stable export target, a writer. Formats
//! without one report [`DatasetError::UnsupportedConversion`] on write.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::dataset::io_coco_json::{read_coco_json, write_coco_json};
use crate::dataset::io_hicodet_mat::{read_hicodet_mat, HicoDetSplit};
use crate::dataset::io_openimages_csv::{read_openimages_od, read_openimages_vr, OpenImagesOdOptions};
use crate::dataset::io_visualgenome_json::read_visualgenome_json;
use crate::dataset::{Dataset, DatasetKind};
use crate::error::DatasetError;

/// An external annotation format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Coco,
    OpenImagesOd,
    OpenImagesVr,
    VisualGenome,
    HicoDet,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Coco,
        Format::OpenImagesOd,
        Format::OpenImagesVr,
        Format::VisualGenome,
        Format::HicoDet,
    ];

    /// Human-readable name for the format.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Coco => "coco",
            Format::OpenImagesOd => "openimages_od",
            Format::OpenImagesVr => "openimages_vr",
            Format::VisualGenome => "visualgenome",
            Format::HicoDet => "hicodet",
        }
    }

    /// The dataset kind the reader produces.
    pub fn dataset_kind(&self) -> DatasetKind {
        match self {
            Format::Coco | Format::OpenImagesOd | Format::OpenImagesVr => DatasetKind::Detection,
            Format::VisualGenome | Format::HicoDet => DatasetKind::Relationship,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Format::Coco)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "coco" | "coco_json" => Ok(Format::Coco),
            "openimages_od" => Ok(Format::OpenImagesOd),
            "openimages_vr" => Ok(Format::OpenImagesVr),
            "visualgenome" | "visualgenome_vr" => Ok(Format::VisualGenome),
            "hicodet" | "hico_det" => Ok(Format::HicoDet),
            other => Err(DatasetError::UnsupportedFormat(format!(
                "'{other}' (supported: coco, openimages_od, openimages_vr, visualgenome, hicodet)"
            ))),
        }
    }
}

/// Reader options that only some formats use.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    pub openimages: OpenImagesOdOptions,
    pub hicodet_split: HicoDetSplit,
}

/// Reads `input` in `format`; images resolve against `images_dir`.
pub fn read_format(
    format: Format,
    input: &Path,
    images_dir: &Path,
    options: &ReadOptions,
) -> Result<Dataset, DatasetError> {
    let dataset = match format {
        Format::Coco => read_coco_json(input, images_dir)?,
        Format::OpenImagesOd => read_openimages_od(input, images_dir, &options.openimages)?,
        Format::OpenImagesVr => read_openimages_vr(input, images_dir)?,
        Format::VisualGenome => read_visualgenome_json(input, images_dir)?,
        Format::HicoDet => read_hicodet_mat(input, images_dir, options.hicodet_split)?,
    };
    log::info!(
        "Read {} {} records from {}",
        dataset.len(),
        format,
        input.display()
    );
    Ok(dataset)
}

/// Writes `dataset` as `format` to `output`, copying images into `images_dir`.
///
/// # Errors
/// `UnsupportedConversion` for formats without a writer.
pub fn write_format(
    format: Format,
    dataset: &Dataset,
    output: &Path,
    images_dir: &Path,
) -> Result<(), DatasetError> {
    match format {
        Format::Coco => write_coco_json(output, dataset, images_dir),
        Format::OpenImagesOd | Format::OpenImagesVr | Format::VisualGenome | Format::HicoDet => {
            Err(DatasetError::UnsupportedConversion(format!(
                "export to {format} is not supported"
            )))
        }
    }
}
