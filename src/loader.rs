//! Source dataset discovery and loading.
//!
//! A source is a directory holding exactly one annotation file (matched by
//! the configured [`AnnotationLocator`]) and the image files its records
//! point to.

use std::path::{Path, PathBuf};

use glob::MatchOptions;
use walkdir::WalkDir;

use crate::coco::{read_coco_json, CocoDataset};
use crate::config::{AnnotationLocator, MergeOptions};
use crate::error::CocoMergeError;

// Deep enough for `annotations/instances.json` layouts.
const MAX_SEARCH_DEPTH: usize = 2;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A parsed source dataset and where its files live.
#[derive(Clone, Debug)]
pub struct LoadedDataset {
    /// Position of this source in the merge order.
    pub source_index: usize,
    /// The source directory as given by the caller.
    pub root: PathBuf,
    /// The annotation file that was parsed.
    pub annotation_path: PathBuf,
    /// Directory `file_name` values are resolved against.
    pub image_root: PathBuf,
    pub dataset: CocoDataset,
}

impl LoadedDataset {
    /// Candidate on-disk locations for an image, most specific first.
    ///
    /// `file_name` is tried under the image root and then under the source
    /// root, which covers datasets whose file names already include the
    /// `images/` prefix.
    pub fn image_candidates(&self, file_name: &str) -> Vec<PathBuf> {
        let mut candidates = vec![self.image_root.join(file_name)];
        if self.image_root != self.root {
            candidates.push(self.root.join(file_name));
        }
        candidates
    }
}

/// Finds the single annotation file in `dataset_path`.
///
/// # Errors
/// `DatasetLayout` when nothing or more than one file matches.
pub fn locate_annotation_file(
    dataset_path: &Path,
    locator: &AnnotationLocator,
) -> Result<PathBuf, CocoMergeError> {
    let pattern = locator.compile()?;

    let mut candidates = Vec::new();
    for entry in WalkDir::new(dataset_path)
        .min_depth(1)
        .max_depth(MAX_SEARCH_DEPTH)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            CocoMergeError::layout(dataset_path, format!("cannot read directory: {e}"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(dataset_path) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if pattern.matches_with(&relative, MATCH_OPTIONS) {
            candidates.push(entry.into_path());
        }
    }

    match candidates.len() {
        0 => Err(CocoMergeError::layout(
            dataset_path,
            format!("no annotation file matches '{}'", locator.pattern),
        )),
        1 => Ok(candidates.remove(0)),
        n => Err(CocoMergeError::layout(
            dataset_path,
            format!(
                "{} files match '{}' ({}); set a more specific pattern",
                n,
                locator.pattern,
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )),
    }
}

/// Loads one source dataset.
///
/// Image files are not checked here; the writer reports missing ones.
pub fn load(
    dataset_path: &Path,
    source_index: usize,
    opts: &MergeOptions,
) -> Result<LoadedDataset, CocoMergeError> {
    if !dataset_path.is_dir() {
        return Err(CocoMergeError::layout(
            dataset_path,
            if dataset_path.exists() {
                "not a directory"
            } else {
                "directory does not exist"
            },
        ));
    }

    let annotation_path = locate_annotation_file(dataset_path, &opts.locator)?;
    log::debug!(
        "source {}: reading {}",
        source_index,
        annotation_path.display()
    );
    let dataset = read_coco_json(&annotation_path)?;

    let image_root = resolve_image_root(dataset_path, opts.source_images_dir.as_deref());

    log::info!(
        "Loaded {} ({} images, {} annotations, {} categories, {} licenses)",
        annotation_path.display(),
        dataset.images.len(),
        dataset.annotations.len(),
        dataset.categories.len(),
        dataset.licenses.len()
    );

    Ok(LoadedDataset {
        source_index,
        root: dataset_path.to_path_buf(),
        annotation_path,
        image_root,
        dataset,
    })
}

fn resolve_image_root(dataset_path: &Path, images_dir: Option<&str>) -> PathBuf {
    match images_dir {
        Some(dir) if !dir.is_empty() && dataset_path.join(dir).is_dir() => {
            dataset_path.join(dir)
        }
        _ => dataset_path.to_path_buf(),
    }
}
