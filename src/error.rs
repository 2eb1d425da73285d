use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::DatasetKind;
use crate::validation::ValidationReport;

/// The main error type for simpledataset operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering of a report failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A plain file, an archive, or an archive entry does not exist.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Malformed manifest line, payload line, or undetectable dataset kind.
    #[error("{message}: '{content}'")]
    Format { message: String, content: String },

    /// A manifest line failed to decode. The whole load is aborted.
    #[error("Failed to parse manifest line '{line}': {source}")]
    ManifestLine {
        line: String,
        #[source]
        source: Box<DatasetError>,
    },

    #[error("Failed to open archive {path}: {source}")]
    InvalidArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Duplicated class ids found: '{content}'")]
    DuplicateClassIds { content: String },

    #[error("{path} already exists")]
    AlreadyExists { path: PathBuf },

    #[error("Failed to find a unique file name for {name} in {directory}")]
    ResourceExhausted { directory: PathBuf, name: String },

    /// No task route between two kinds, or the target format cannot be written.
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    #[error("{operation} is not supported for {kind} datasets")]
    UnsupportedOperation {
        operation: &'static str,
        kind: DatasetKind,
    },

    #[error("Expected a {expected} dataset, found {found}")]
    KindMismatch {
        expected: DatasetKind,
        found: DatasetKind,
    },

    #[error("Class id {class_id} is out of range for a label table with {table_len} entries")]
    ClassIdOutOfRange { class_id: u32, table_len: usize },

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write COCO JSON to {path}: {source}")]
    CocoJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid COCO JSON in {path}: {message}")]
    CocoJsonInvalid { path: PathBuf, message: String },

    #[error("Failed to parse VisualGenome JSON from {path}: {source}")]
    VisualGenomeJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse CSV from {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image {path}: {source}")]
    ImageEncode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: String,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Cannot concatenate datasets of different kinds: {kinds}")]
    MixedKinds { kinds: String },

    #[error("{path} is not inside the output directory {directory}")]
    OutsideOutputDirectory { path: PathBuf, directory: PathBuf },

    #[error("Invalid sample parameters: {message}")]
    InvalidSampleParams { message: String },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode MAT file: {message}")]
    MatDecode { message: String },

    #[error("Invalid HICO-DET annotations {path}: {message}")]
    HicoDetInvalid { path: PathBuf, message: String },
}

impl DatasetError {
    /// Shorthand for [`DatasetError::Format`].
    pub(crate) fn format(message: impl Into<String>, content: impl Into<String>) -> Self {
        DatasetError::Format {
            message: message.into(),
            content: content.into(),
        }
    }
}
