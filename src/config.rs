//! Merge configuration.
//!
//! [`MergeOptions`] is the single knob set for a merge. The CLI maps its
//! flags onto it; library callers build it directly.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::ValueEnum;

use crate::coco::{DatasetInfo, License};
use crate::error::CocoMergeError;

/// First value handed out by every ID counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum IdBase {
    Zero,
    #[default]
    One,
}

impl IdBase {
    pub fn start(self) -> u64 {
        match self {
            IdBase::Zero => 0,
            IdBase::One => 1,
        }
    }
}

/// How image files reach the output folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageTransfer {
    /// Copy, leaving the source dataset intact.
    #[default]
    Copy,
    /// Rename into place; falls back to copy + remove across filesystems.
    Move,
    /// Hard link; no extra disk space.
    HardLink,
}

/// How merged image files are named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageNaming {
    /// Keep each record's `file_name`, suffixing on collision.
    #[default]
    Preserve,
    /// `<merged image id>.<ext>` for every image.
    Sequential,
}

/// Semantic identity used to collapse categories across sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CategoryMatch {
    /// Same `name` means same category; the first supercategory wins.
    #[default]
    Name,
    /// Same `name` and same `supercategory`.
    NameAndSupercategory,
}

/// Rule for finding the annotation file inside a source directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationLocator {
    /// Glob matched against `/`-separated paths relative to the source
    /// directory. `*` does not cross directory boundaries.
    pub pattern: String,
}

impl AnnotationLocator {
    pub const DEFAULT_PATTERN: &'static str = "*.json";

    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub(crate) fn compile(&self) -> Result<glob::Pattern, CocoMergeError> {
        glob::Pattern::new(&self.pattern).map_err(|e| {
            CocoMergeError::config(format!(
                "invalid annotation file pattern '{}': {}",
                self.pattern, e
            ))
        })
    }
}

impl Default for AnnotationLocator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATTERN)
    }
}

/// A flag the caller can raise from another thread to stop a merge.
///
/// The merge checks it once per source dataset, never mid-file.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for a merge run.
#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Directory that receives the merged dataset.
    pub output_root: PathBuf,
    /// Source dataset directories, in merge order.
    pub sources: Vec<PathBuf>,
    pub id_base: IdBase,
    /// Allow writing into a non-empty output directory.
    pub overwrite: bool,
    pub transfer: ImageTransfer,
    pub naming: ImageNaming,
    pub locator: AnnotationLocator,
    /// Image subfolder inside each source; the source root is used when
    /// unset or absent on disk.
    pub source_images_dir: Option<String>,
    /// File name of the merged annotation document.
    pub output_annotation_file: String,
    /// Image subfolder of the output root. Empty means the root itself.
    pub output_images_dir: String,
    pub category_match: CategoryMatch,
    /// Replaces the merged `info` block when set.
    pub info: Option<DatasetInfo>,
    /// Replaces the merged `licenses` list when set. Image references are
    /// matched onto it by license `(name, url)`.
    pub licenses: Option<Vec<License>>,
    pub cancel: Option<CancelFlag>,
}

impl MergeOptions {
    pub const DEFAULT_ANNOTATION_FILE: &'static str = "annotations.json";
    pub const DEFAULT_IMAGES_DIR: &'static str = "images";

    pub fn new(output_root: impl Into<PathBuf>, sources: Vec<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            sources,
            id_base: IdBase::default(),
            overwrite: false,
            transfer: ImageTransfer::default(),
            naming: ImageNaming::default(),
            locator: AnnotationLocator::default(),
            source_images_dir: Some(Self::DEFAULT_IMAGES_DIR.to_string()),
            output_annotation_file: Self::DEFAULT_ANNOTATION_FILE.to_string(),
            output_images_dir: Self::DEFAULT_IMAGES_DIR.to_string(),
            category_match: CategoryMatch::default(),
            info: None,
            licenses: None,
            cancel: None,
        }
    }

    /// Final path of the merged annotation file.
    pub fn annotation_path(&self) -> PathBuf {
        self.output_root.join(&self.output_annotation_file)
    }

    /// Folder that receives image files.
    pub fn images_path(&self) -> PathBuf {
        if self.output_images_dir.is_empty() {
            self.output_root.clone()
        } else {
            self.output_root.join(&self.output_images_dir)
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Checks the configuration without touching the filesystem beyond
    /// metadata lookups.
    pub fn validate(&self) -> Result<(), CocoMergeError> {
        if self.sources.len() < 2 {
            return Err(CocoMergeError::config(format!(
                "at least 2 source datasets are required, got {}",
                self.sources.len()
            )));
        }

        if let Some(source) = self
            .sources
            .iter()
            .find(|s| same_path(s, &self.output_root))
        {
            return Err(CocoMergeError::config(format!(
                "source {} is also the output root",
                source.display()
            )));
        }

        self.locator.compile()?;

        if let Some(licenses) = &self.licenses {
            let mut ids = BTreeSet::new();
            if let Some(dup) = licenses.iter().find(|l| !ids.insert(l.id)) {
                return Err(CocoMergeError::config(format!(
                    "license override defines id {} more than once",
                    dup.id
                )));
            }
        }

        let file = self.output_annotation_file.trim();
        if file.is_empty() || file.contains(['/', '\\']) || file == self.output_images_dir {
            return Err(CocoMergeError::config(format!(
                "annotation file name '{}' must be a plain file name",
                self.output_annotation_file
            )));
        }

        if let Ok(meta) = std::fs::metadata(&self.output_root) {
            if meta.is_dir() && meta.permissions().readonly() {
                return Err(CocoMergeError::config(format!(
                    "output root {} is not writable",
                    self.output_root.display()
                )));
            }
        }

        Ok(())
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
