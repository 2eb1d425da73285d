//! The SIMPLE dataset container.
//!
//! A dataset is a manifest text file with one `<image_path> <label_field>`
//! line per image, an optional `labels.txt` next to it, and optional side
//! archives holding images and per-record label payloads. Paths of the form
//! `archive@entry` address files inside those archives.
//!
//! # Example
//!
//! ```
//! use simpledataset::dataset::{ClassId, Dataset, DatasetKind};
//!
//! let dataset = Dataset::load("a.jpg 3,5\nb.jpg 1\n", ".", None)?;
//! assert_eq!(dataset.kind(), DatasetKind::Classification);
//! assert_eq!(dataset.get_max_class_id(), ClassId(5));
//! # Ok::<(), simpledataset::DatasetError>(())
//! ```

mod bbox;
pub mod codec;
pub mod detect;
mod ids;
pub mod io_coco_json;
pub mod io_hicodet_mat;
pub mod io_openimages_csv;
pub mod io_visualgenome_json;
mod kind;
mod label;
mod label_table;
pub mod mat5;
mod model;
pub mod resolver;
pub mod writer;

pub use bbox::BBox;
pub use codec::LabelCodec;
pub use detect::detect_kind;
pub use ids::ClassId;
pub use kind::DatasetKind;
pub use label::{BoxLabel, Label, PayloadLabel, RelationLabel};
pub use label_table::{LabelTable, LABEL_TABLE_FILE};
pub(crate) use model::{image_size_from_bytes, match_records};
pub use model::{Dataset, Record, Records};
pub use resolver::{CompoundPath, PathResolver};
pub use writer::{next_available_name, write_dataset, WriteOptions, WriteSummary};
