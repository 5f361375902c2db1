//! cocomerge: merge COCO annotation datasets.
//!
//! Given an output directory and an ordered list of source dataset
//! directories, cocomerge produces one COCO dataset whose IDs are unique in
//! every list, whose annotations all point at existing images and
//! categories, and whose image files sit together in one folder.
//!
//! # Modules
//!
//! - [`coco`]: the COCO schema model and JSON I/O
//! - [`config`]: merge options
//! - [`loader`]: finding and parsing a source dataset
//! - [`remap`]: deterministic ID translation tables
//! - [`merge`]: the merge pipeline and its report
//! - [`writer`]: atomic annotation output and image transfer
//! - [`validation`]: structural checks on any COCO document
//! - [`error`]: the error taxonomy

pub mod coco;
pub mod config;
pub mod error;
pub mod loader;
pub mod merge;
pub mod remap;
pub mod validation;
pub mod writer;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use config::{
    AnnotationLocator, CancelFlag, CategoryMatch, IdBase, ImageNaming, ImageTransfer,
    MergeOptions,
};
pub use error::CocoMergeError;
pub use merge::{merge, MergeReport};

/// The cocomerge CLI application.
#[derive(Parser)]
#[command(name = "cocomerge")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge two or more COCO datasets into one directory.
    Merge(MergeArgs),
    /// Check a COCO annotation file for duplicate IDs and dangling references.
    Validate(ValidateArgs),
}

/// Report rendering for both subcommands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Source dataset directories, in merge order.
    #[arg(required = true, num_args = 1..)]
    sources: Vec<PathBuf>,

    /// Directory that receives the merged dataset.
    #[arg(short, long, env = "COCOMERGE_OUTPUT")]
    output: PathBuf,

    /// Merge into a non-empty output directory.
    #[arg(long)]
    overwrite: bool,

    /// Number IDs from 0 instead of 1.
    #[arg(long)]
    zero_based: bool,

    /// How image files are placed in the output.
    #[arg(long, value_enum, default_value_t = ImageTransfer::Copy)]
    transfer: ImageTransfer,

    /// How output image files are named.
    #[arg(long, value_enum, default_value_t = ImageNaming::Preserve)]
    naming: ImageNaming,

    /// Glob selecting the annotation file inside each source.
    #[arg(long, env = "COCOMERGE_PATTERN", default_value = AnnotationLocator::DEFAULT_PATTERN)]
    pattern: String,

    /// Image subfolder inside each source (falls back to the source root).
    #[arg(long, default_value = MergeOptions::DEFAULT_IMAGES_DIR)]
    source_images_dir: String,

    /// File name of the merged annotation file.
    #[arg(long, default_value = MergeOptions::DEFAULT_ANNOTATION_FILE)]
    annotation_file: String,

    /// Image subfolder of the output directory ('' for the root itself).
    #[arg(long, default_value = MergeOptions::DEFAULT_IMAGES_DIR)]
    images_dir: String,

    /// What makes two categories the same.
    #[arg(long, value_enum, default_value_t = CategoryMatch::Name)]
    category_match: CategoryMatch,

    /// Override info.description of the merged dataset.
    #[arg(long)]
    description: Option<String>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// COCO annotation file to validate.
    input: PathBuf,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

impl MergeArgs {
    fn into_options(self) -> MergeOptions {
        let mut opts = MergeOptions::new(self.output, self.sources);
        opts.overwrite = self.overwrite;
        opts.id_base = if self.zero_based {
            IdBase::Zero
        } else {
            IdBase::One
        };
        opts.transfer = self.transfer;
        opts.naming = self.naming;
        opts.locator = AnnotationLocator::new(self.pattern);
        opts.source_images_dir = Some(self.source_images_dir).filter(|d| !d.is_empty());
        opts.output_annotation_file = self.annotation_file;
        opts.output_images_dir = self.images_dir;
        opts.category_match = self.category_match;
        opts.info = self
            .description
            .map(|d| coco::DatasetInfo::new().with("description", d));
        opts
    }
}

/// Run the cocomerge CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), CocoMergeError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Merge(args)) => run_merge(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => {
            println!("cocomerge {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Merge COCO annotation datasets.");
            println!();
            println!("Run 'cocomerge --help' for usage information.");
            Ok(())
        }
    }
}

fn run_merge(args: MergeArgs) -> Result<(), CocoMergeError> {
    let format = args.report;
    let report = merge(&args.into_options())?;

    match format {
        ReportFormat::Json => print_json(&report)?,
        ReportFormat::Text => print!("{}", report),
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), CocoMergeError> {
    let dataset = coco::read_coco_json(&args.input)?;

    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    let report = validation::validate_dataset(&dataset, &opts);

    match args.output {
        ReportFormat::Json => print_json(&report)?,
        ReportFormat::Text => print!("{}", report),
    }

    if opts.fails(&report) {
        Err(CocoMergeError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CocoMergeError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| CocoMergeError::Write {
        path: PathBuf::from("<stdout>"),
        source,
    })?;
    println!("{}", json);
    Ok(())
}
