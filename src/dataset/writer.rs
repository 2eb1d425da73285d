//! Serializing a dataset back to a manifest.
//!
//! Writing happens in four steps, each of which can fail on its own:
//!
//! 1. the label table (`labels.txt`, or a numbered variant if one exists),
//! 2. optionally an uncompressed `images.zip` with every image's bytes,
//! 3. for box kinds, a compressed `labels.zip` with one payload per record,
//! 4. the manifest itself.
//!
//! Existing files are never overwritten. Side files get the first free
//! numbered variant of their name (see [`next_available_name`]); the manifest
//! is opened with `create_new` and fails with `AlreadyExists`.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::codec::{encode_class_ids, encode_payload};
use super::label::PayloadLabel;
use super::label_table::LABEL_TABLE_FILE;
use super::model::{Dataset, Record, Records};
use super::resolver::{compound, CompoundPath};
use crate::error::DatasetError;

/// Default name of the image archive.
pub const IMAGES_ARCHIVE: &str = "images.zip";
/// Default name of the label payload archive.
pub const LABELS_ARCHIVE: &str = "labels.zip";

/// Candidate suffixes tried by [`next_available_name`].
const MAX_NAME_ATTEMPTS: usize = 100;

/// Options for [`write_dataset`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    /// Do not write a label table.
    pub skip_label_table: bool,
    /// Pack every image into a fresh image archive and point records at it.
    pub copy_images: bool,
}

/// What [`write_dataset`] produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub manifest: PathBuf,
    /// The label table file actually written. May be a numbered variant.
    pub label_table: Option<PathBuf>,
    pub images_archive: Option<PathBuf>,
    pub labels_archive: Option<PathBuf>,
    pub records: usize,
    /// Labels dropped because their boxes were invalid.
    pub skipped_labels: usize,
}

/// Returns `desired` if no such file exists in `directory`, else the first
/// free name with `0`..`99` inserted before the extension.
///
/// The extension is everything after the first `.`, so `labels.txt` becomes
/// `labels0.txt` and `data.tar.gz` becomes `data0.tar.gz`.
///
/// # Errors
/// `ResourceExhausted` if all 100 numbered variants are taken.
pub fn next_available_name(directory: &Path, desired: &str) -> Result<String, DatasetError> {
    if !directory.join(desired).exists() {
        return Ok(desired.to_string());
    }

    let (stem, ext) = match desired.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (desired, None),
    };

    (0..MAX_NAME_ATTEMPTS)
        .map(|i| match ext {
            Some(ext) => format!("{stem}{i}.{ext}"),
            None => format!("{stem}{i}"),
        })
        .find(|candidate| !directory.join(candidate).exists())
        .ok_or_else(|| DatasetError::ResourceExhausted {
            directory: directory.to_path_buf(),
            name: desired.to_string(),
        })
}

/// Writes `dataset` as a manifest at `output_path`.
///
/// Side files land in the manifest's directory, which is created if needed.
/// Image paths are written unchanged unless `copy_images` is set. Boxes with
/// `x_min >= x_max` or `y_min >= y_max` are skipped with a warning.
///
/// # Errors
/// `AlreadyExists` if `output_path` exists. Any read, encode or write
/// failure aborts before the manifest is written.
pub fn write_dataset(
    output_path: &Path,
    dataset: &Dataset,
    options: &WriteOptions,
) -> Result<WriteSummary, DatasetError> {
    if output_path.exists() {
        return Err(DatasetError::AlreadyExists {
            path: output_path.to_path_buf(),
        });
    }
    let directory = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory)?;

    let mut summary = WriteSummary {
        manifest: output_path.to_path_buf(),
        records: dataset.len(),
        ..Default::default()
    };

    // 1. Label table
    if !options.skip_label_table {
        let table = dataset.labels()?;
        let name = next_available_name(&directory, LABEL_TABLE_FILE)?;
        let path = directory.join(&name);
        if name != LABEL_TABLE_FILE {
            log::warn!(
                "{LABEL_TABLE_FILE} already exists. Saving to {}",
                path.display()
            );
        }
        write_new_file(&path, table.to_text().as_bytes())?;
        summary.label_table = Some(path);
    }

    // 2. Images
    let image_paths: Vec<String> = if options.copy_images {
        let name = next_available_name(&directory, IMAGES_ARCHIVE)?;
        let path = directory.join(&name);
        let entries = pack_images(dataset, &path)?;
        summary.images_archive = Some(path);
        entries.iter().map(|entry| compound(&name, entry)).collect()
    } else {
        dataset
            .records()
            .image_paths()
            .into_iter()
            .map(str::to_string)
            .collect()
    };

    // 3. Label fields
    let label_fields: Vec<String> = match dataset.records() {
        Records::Classification(records) => records
            .iter()
            .map(|r| encode_class_ids(&r.labels))
            .collect(),
        Records::Detection(records) => {
            write_payload_archive(records, &directory, &mut summary)?
        }
        Records::Relationship(records) => {
            write_payload_archive(records, &directory, &mut summary)?
        }
    };

    // 4. Manifest
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output_path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => DatasetError::AlreadyExists {
                path: output_path.to_path_buf(),
            },
            _ => DatasetError::Io(e),
        })?;
    let mut writer = BufWriter::new(file);
    for (image, field) in image_paths.iter().zip(&label_fields) {
        if field.is_empty() {
            writeln!(writer, "{image}")?;
        } else {
            writeln!(writer, "{image} {field}")?;
        }
    }
    writer.flush()?;

    Ok(summary)
}

/// Entry names for packed images: the original file names, unless two
/// records share one, in which case every entry becomes `{index}.{ext}`.
pub fn image_entry_names(image_paths: &[&str]) -> Vec<String> {
    let file_names: Vec<&str> = image_paths
        .iter()
        .map(|p| CompoundPath::parse(p).file_name())
        .collect();

    let mut seen = HashSet::with_capacity(file_names.len());
    let collides = file_names.iter().any(|name| !seen.insert(*name));
    if !collides {
        return file_names.into_iter().map(str::to_string).collect();
    }

    log::info!("Image file names collide; renaming archive entries by record index");
    file_names
        .iter()
        .enumerate()
        .map(|(i, name)| match name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!("{i}.{ext}"),
            _ => i.to_string(),
        })
        .collect()
}

fn pack_images(dataset: &Dataset, archive_path: &Path) -> Result<Vec<String>, DatasetError> {
    let image_paths = dataset.records().image_paths();
    let entries = image_entry_names(&image_paths);

    let file = create_new_file(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (image, entry) in image_paths.iter().zip(&entries) {
        let bytes = dataset.read_image_binary(image)?;
        zip.start_file(entry.as_str(), options)?;
        zip.write_all(&bytes)?;
    }
    zip.finish()?;
    Ok(entries)
}

fn write_payload_archive<L: PayloadLabel>(
    records: &[Record<L>],
    directory: &Path,
    summary: &mut WriteSummary,
) -> Result<Vec<String>, DatasetError> {
    let name = next_available_name(directory, LABELS_ARCHIVE)?;
    let path = directory.join(&name);

    let file = create_new_file(&path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut fields = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let valid: Vec<L> = record
            .labels
            .iter()
            .filter(|label| {
                let ok = label.is_valid();
                if !ok {
                    log::warn!("Skipping invalid box in {}: {:?}", record.image, label);
                }
                ok
            })
            .copied()
            .collect();
        summary.skipped_labels += record.labels.len() - valid.len();

        let entry = format!("{i}.txt");
        zip.start_file(entry.as_str(), options)?;
        zip.write_all(encode_payload(&valid).as_bytes())?;
        fields.push(compound(&name, &entry));
    }
    zip.finish()?;

    summary.labels_archive = Some(path);
    Ok(fields)
}

/// Opens `path` for writing, refusing to replace an existing file.
pub(crate) fn create_new_file(path: &Path) -> Result<File, DatasetError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => DatasetError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => DatasetError::Io(e),
        })
}

fn write_new_file(path: &Path, contents: &[u8]) -> Result<(), DatasetError> {
    let mut file = create_new_file(path)?;
    file.write_all(contents)?;
    Ok(())
}
