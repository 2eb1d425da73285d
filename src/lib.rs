//! simpledataset: a plain-text dataset format for vision tasks.
//!
//! A dataset is a manifest listing one image per line followed by its label
//! field, a `labels.txt` naming the class ids, and optional zip archives
//! addressed with `archive@entry` paths. Three kinds share the format:
//! image classification, object detection and visual relationship.
//!
//! # Modules
//!
//! - [`dataset`]: the dataset entity, its codecs, the reader and the writer
//! - [`conversion`]: external formats (COCO, OpenImages, VisualGenome)
//! - [`task`]: re-deriving a dataset of one kind from another
//! - [`transform`]: filter, map, defrag, concat and friends
//! - [`sample`], [`summary`], [`validation`]: inspection and subsetting
//! - [`error`]: the crate error type

pub mod conversion;
pub mod dataset;
pub mod error;
pub mod sample;
pub mod summary;
pub mod task;
pub mod transform;
pub mod validation;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use conversion::{Format, ReadOptions};
use dataset::io_hicodet_mat::HicoDetSplit;
use dataset::io_openimages_csv::OpenImagesOdOptions;
use dataset::{ClassId, Dataset, DatasetKind, Record, Records, WriteOptions};
pub use error::DatasetError;

/// The simpledataset CLI application.
#[derive(Parser)]
#[command(name = "simpledataset")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print record counts and the class distribution.
    Summary(SummaryArgs),
    /// Check a dataset for errors and warnings.
    Validate(ValidateArgs),
    /// Keep or drop classes.
    Filter(FilterArgs),
    /// Remap class ids.
    Map(MapArgs),
    /// Renumber the used class ids densely.
    Defrag(TransformArgs),
    /// Concatenate datasets of one kind.
    Concat(ConcatArgs),
    /// Randomly sample records.
    Sample(SampleArgs),
    /// Pack images and labels into archives next to a new manifest.
    Pack(PackArgs),
    /// Create an unlabelled dataset from image files.
    Create(CreateArgs),
    /// Import a dataset from an external format.
    ConvertFrom(ConvertFromArgs),
    /// Export a dataset to an external format.
    ConvertTo(ConvertToArgs),
    /// Convert a dataset into another kind.
    ConvertTask(ConvertTaskArgs),
}

/// Report rendering.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct SummaryArgs {
    /// Manifest to summarize.
    input: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Manifest to validate.
    input: PathBuf,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

/// Input and output manifests shared by the in-place transforms.
#[derive(clap::Args)]
struct TransformArgs {
    /// Source manifest.
    input: PathBuf,

    /// Manifest to create.
    output: PathBuf,
}

#[derive(clap::Args)]
#[command(group(clap::ArgGroup::new("selection").required(true).args(["include", "exclude"])))]
struct FilterArgs {
    #[command(flatten)]
    paths: TransformArgs,

    /// Class ids to keep (comma separated).
    #[arg(long, value_delimiter = ',')]
    include: Vec<u32>,

    /// Class ids to drop (comma separated).
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<u32>,
}

#[derive(clap::Args)]
struct MapArgs {
    #[command(flatten)]
    paths: TransformArgs,

    /// A `SRC:DST` class id mapping. Repeatable.
    #[arg(long = "map", value_name = "SRC:DST", required = true, value_parser = parse_mapping)]
    mappings: Vec<(u32, u32)>,
}

#[derive(clap::Args)]
struct ConcatArgs {
    /// Manifests to concatenate, all of one kind.
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    /// Manifest to create. Every input must live below its directory.
    #[arg(short, long)]
    output: PathBuf,

    /// Merge records whose image bytes are identical.
    #[arg(long)]
    dedup_images: bool,
}

#[derive(clap::Args)]
#[command(group(clap::ArgGroup::new("size").required(true).args(["n", "fraction"])))]
struct SampleArgs {
    #[command(flatten)]
    paths: TransformArgs,

    /// Number of records to keep.
    #[arg(short)]
    n: Option<usize>,

    /// Fraction of records to keep, in (0, 1].
    #[arg(long)]
    fraction: Option<f64>,

    /// Seed for a reproducible sample.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Args)]
struct PackArgs {
    #[command(flatten)]
    paths: TransformArgs,

    /// Directory from which to load images.
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Keep images without annotations.
    #[arg(long)]
    keep_empty: bool,
}

#[derive(clap::Args)]
struct CreateArgs {
    /// Image files to include.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Manifest to create.
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct ConvertFromArgs {
    /// Annotation file in the source format.
    input: PathBuf,

    /// Source format (coco, openimages_od, openimages_vr, visualgenome, hicodet).
    format: Format,

    /// Manifest to create.
    output: PathBuf,

    /// Directory holding the images. Defaults to the input's directory.
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Drop OpenImages boxes flagged as occluded.
    #[arg(long)]
    exclude_occluded: bool,

    /// Keep OpenImages boxes flagged as depictions.
    #[arg(long)]
    include_depiction: bool,

    /// Keep OpenImages boxes flagged as taken from inside the object.
    #[arg(long)]
    include_inside: bool,

    /// HICO-DET split to read (train or test).
    #[arg(long, default_value = "train")]
    split: HicoDetSplit,
}

#[derive(clap::Args)]
struct ConvertToArgs {
    /// Source manifest.
    input: PathBuf,

    /// Target format.
    format: Format,

    /// Annotation file to create. Images are copied next to it.
    output: PathBuf,
}

#[derive(clap::Args)]
struct ConvertTaskArgs {
    /// Source manifest.
    input: PathBuf,

    /// Target kind (classification, detection or relationship).
    kind: DatasetKind,

    /// Manifest to create.
    output: PathBuf,
}

/// Run the simpledataset CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), DatasetError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Summary(args) => run_summary(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Filter(args) => run_filter(args),
        Commands::Map(args) => run_map(args),
        Commands::Defrag(args) => run_defrag(args),
        Commands::Concat(args) => run_concat(args),
        Commands::Sample(args) => run_sample(args),
        Commands::Pack(args) => run_pack(args),
        Commands::Create(args) => run_create(args),
        Commands::ConvertFrom(args) => run_convert_from(args),
        Commands::ConvertTo(args) => run_convert_to(args),
        Commands::ConvertTask(args) => run_convert_task(args),
    }
}

fn run_summary(args: SummaryArgs) -> Result<(), DatasetError> {
    let dataset = Dataset::load_file(&args.input, None)?;
    let report = summary::summarize(&dataset)?;
    match args.output {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), DatasetError> {
    let dataset = Dataset::load_file(&args.input, None)?;
    let report = validation::validate_dataset(&dataset);

    match args.output {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Text => print!("{report}"),
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;

    if has_errors || (args.strict && has_warnings) {
        Err(DatasetError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

fn run_filter(args: FilterArgs) -> Result<(), DatasetError> {
    ensure_new(&args.paths.output)?;
    let dataset = Dataset::load_file(&args.paths.input, None)?;
    let filter = if args.include.is_empty() {
        transform::ClassFilter::Exclude(class_set(&args.exclude))
    } else {
        transform::ClassFilter::Include(class_set(&args.include))
    };
    let filtered = transform::filter_classes(&dataset, &filter)?;
    save(&filtered, &args.paths.output, WriteOptions::default())
}

fn run_map(args: MapArgs) -> Result<(), DatasetError> {
    ensure_new(&args.paths.output)?;
    let dataset = Dataset::load_file(&args.paths.input, None)?;
    let mapping: HashMap<ClassId, ClassId> = args
        .mappings
        .iter()
        .map(|&(src, dst)| (ClassId(src), ClassId(dst)))
        .collect();
    let mapped = transform::map_classes(&dataset, &mapping)?;
    save(&mapped, &args.paths.output, WriteOptions::default())
}

fn run_defrag(args: TransformArgs) -> Result<(), DatasetError> {
    ensure_new(&args.output)?;
    let dataset = Dataset::load_file(&args.input, None)?;
    let (defragged, plan) = transform::defrag(&dataset)?;
    for entry in &plan {
        println!("{entry}");
    }
    save(&defragged, &args.output, WriteOptions::default())
}

fn run_concat(args: ConcatArgs) -> Result<(), DatasetError> {
    ensure_new(&args.output)?;
    let datasets = args
        .inputs
        .iter()
        .map(|input| Dataset::load_file(input, None))
        .collect::<Result<Vec<_>, _>>()?;
    let directory = parent_directory(&args.output);
    let options = transform::ConcatOptions {
        dedup_images: args.dedup_images,
    };
    let merged = transform::concat(&datasets, &directory, &options)?;
    save(&merged, &args.output, WriteOptions::default())
}

fn run_sample(args: SampleArgs) -> Result<(), DatasetError> {
    ensure_new(&args.paths.output)?;
    let opts = sample::SampleOptions {
        n: args.n,
        fraction: args.fraction,
        seed: args.seed,
    };
    sample::validate_sample_options(&opts)?;
    let dataset = Dataset::load_file(&args.paths.input, None)?;
    let sampled = sample::sample_dataset(&dataset, &opts)?;
    save(&sampled, &args.paths.output, WriteOptions::default())
}

fn run_pack(args: PackArgs) -> Result<(), DatasetError> {
    ensure_new(&args.paths.output)?;
    let dataset = Dataset::load_file(&args.paths.input, args.images_dir.as_deref())?;
    let dataset = if args.keep_empty {
        dataset
    } else {
        transform::drop_empty(&dataset)?
    };
    let options = WriteOptions {
        copy_images: true,
        ..WriteOptions::default()
    };
    save(&dataset, &args.paths.output, options)
}

fn run_create(args: CreateArgs) -> Result<(), DatasetError> {
    ensure_new(&args.output)?;
    println!("Creating a dataset with empty labels.");
    let records = args
        .images
        .iter()
        .map(|image| Record::new(image.to_string_lossy(), Vec::<ClassId>::new()))
        .collect();
    let dataset = Dataset::new(Records::Classification(records), std::env::current_dir()?);
    let options = WriteOptions {
        skip_label_table: true,
        copy_images: true,
    };
    save(&dataset, &args.output, options)
}

fn run_convert_from(args: ConvertFromArgs) -> Result<(), DatasetError> {
    ensure_new(&args.output)?;
    let images_dir = args
        .images_dir
        .clone()
        .unwrap_or_else(|| parent_directory(&args.input));
    let options = ReadOptions {
        openimages: OpenImagesOdOptions {
            include_occluded: !args.exclude_occluded,
            include_depiction: args.include_depiction,
            include_inside: args.include_inside,
        },
        hicodet_split: args.split,
    };
    let dataset = conversion::read_format(args.format, &args.input, &images_dir, &options)?;
    save(&dataset, &args.output, WriteOptions::default())
}

fn run_convert_to(args: ConvertToArgs) -> Result<(), DatasetError> {
    ensure_new(&args.output)?;
    let dataset = Dataset::load_file(&args.input, None)?;
    let images_dir = parent_directory(&args.output);
    conversion::write_format(args.format, &dataset, &args.output, &images_dir)?;
    println!("Successfully saved to {}", args.output.display());
    Ok(())
}

fn run_convert_task(args: ConvertTaskArgs) -> Result<(), DatasetError> {
    ensure_new(&args.output)?;
    let dataset = Dataset::load_file(&args.input, None)?;
    let converted = task::convert_task(dataset, args.kind, &parent_directory(&args.output))?;
    save(&converted, &args.output, WriteOptions::default())
}

/// Writes `dataset` to `output`, copying images when they would not resolve
/// from the output directory.
fn save(dataset: &Dataset, output: &Path, mut options: WriteOptions) -> Result<(), DatasetError> {
    let directory = parent_directory(output);
    if !options.copy_images && !same_directory(dataset.base_images_directory(), &directory) {
        options.copy_images = true;
    }
    let written = dataset::write_dataset(output, dataset, &options)?;
    if written.skipped_labels > 0 {
        eprintln!("Skipped {} invalid labels", written.skipped_labels);
    }
    println!(
        "Successfully saved {} ({} records)",
        written.manifest.display(),
        written.records
    );
    Ok(())
}

fn ensure_new(path: &Path) -> Result<(), DatasetError> {
    if path.exists() {
        return Err(DatasetError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn parent_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `a` and `b` name the same directory. A directory that does not
/// exist yet is never the same as another.
fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn class_set(ids: &[u32]) -> BTreeSet<ClassId> {
    ids.iter().copied().map(ClassId).collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatasetError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn parse_mapping(s: &str) -> Result<(u32, u32), String> {
    let (src, dst) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SRC:DST, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid class id '{v}': {e}"))
    };
    Ok((parse(src)?, parse(dst)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mapping() {
        assert_eq!(parse_mapping("3:0"), Ok((3, 0)));
        assert_eq!(parse_mapping(" 1 : 2 "), Ok((1, 2)));
        assert!(parse_mapping("3").is_err());
        assert!(parse_mapping("a:1").is_err());
        assert!(parse_mapping("-1:1").is_err());
    }

    #[test]
    fn test_to_json_reports_serializer_errors() {
        // Maps with non-string keys cannot be rendered as JSON objects.
        let value: std::collections::BTreeMap<(u32, u32), u32> = [((1, 2), 3)].into();
        assert!(matches!(to_json(&value), Err(DatasetError::Json(_))));
        assert_eq!(to_json(&[1, 2]).unwrap(), "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_same_directory() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let nested = temp.path().join("x");
        std::fs::create_dir(&nested).expect("mkdir");
        assert!(same_directory(temp.path(), &nested.join("..")));
        assert!(!same_directory(temp.path(), &nested));
        assert!(!same_directory(temp.path(), &temp.path().join("missing")));
    }
}
