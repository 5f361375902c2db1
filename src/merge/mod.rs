//! Merging several COCO datasets into one.
//!
//! [`merge`] is the library entry point: it validates the options, checks
//! the output location, loads every source in order, rewrites IDs through
//! one global [`OffsetTable`](crate::remap::OffsetTable) and hands the
//! result to the [`writer`](crate::writer).
//!
//! Loading is fail-fast. If any source cannot be loaded the merge aborts
//! before anything is written, since a partial merge would silently drop
//! data the caller asked for.

mod report;

pub use report::{
    EntityCounts, MergeIssue, MergeIssueCode, MergeReport, MergeSeverity, SourceSummary,
};

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::coco::{is_blank, CocoDataset, DatasetInfo, License};
use crate::config::MergeOptions;
use crate::error::CocoMergeError;
use crate::loader::{self, LoadedDataset};
use crate::remap::{self, OffsetTable, RemapError, RemapOptions};
use crate::writer;

/// Where an image of the merged document comes from.
#[derive(Clone, Debug)]
pub struct ImageSource {
    pub source_index: usize,
    /// The image's `file_name` before the merge.
    pub original_file_name: String,
    /// On-disk locations to try, most specific first.
    pub candidates: Vec<PathBuf>,
}

/// A merged document that has not been written yet.
#[derive(Clone, Debug)]
pub struct MergedResult {
    pub dataset: CocoDataset,
    pub report: MergeReport,
    /// Parallel to `dataset.images`.
    pub image_sources: Vec<ImageSource>,
}

/// Settings that shape the in-memory merge.
#[derive(Clone, Debug, Default)]
pub struct MergeSettings {
    pub remap: RemapOptions,
    /// Replaces the merged info block when set.
    pub info: Option<DatasetInfo>,
    /// Replaces the merged license list when set.
    pub licenses: Option<Vec<License>>,
}

impl From<&MergeOptions> for MergeSettings {
    fn from(opts: &MergeOptions) -> Self {
        Self {
            remap: RemapOptions {
                id_base: opts.id_base,
                category_match: opts.category_match,
            },
            info: opts.info.clone(),
            licenses: opts.licenses.clone(),
        }
    }
}

/// Runs a complete merge and writes the result to `opts.output_root`.
///
/// # Errors
/// Any [`CocoMergeError`] aborts the merge. Errors raised before the write
/// stage leave the output location untouched.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use cocomerge::{merge, MergeOptions};
///
/// let opts = MergeOptions::new(
///     "merged",
///     vec![PathBuf::from("datasets/a"), PathBuf::from("datasets/b")],
/// );
/// let report = merge(&opts)?;
/// println!("{report}");
/// # Ok::<(), cocomerge::CocoMergeError>(())
/// ```
pub fn merge(opts: &MergeOptions) -> Result<MergeReport, CocoMergeError> {
    opts.validate()?;
    writer::check_output_root(&opts.output_root, opts.overwrite)?;

    let mut loaded = Vec::with_capacity(opts.sources.len());
    for (index, path) in opts.sources.iter().enumerate() {
        if opts.is_cancelled() {
            log::info!("Merge cancelled after {} source(s)", index);
            return Err(CocoMergeError::Cancelled { completed: index });
        }
        loaded.push(loader::load(path, index, opts)?);
    }

    let mut merged = merge_datasets(&loaded, &MergeSettings::from(opts))?;
    writer::write(&mut merged, opts)?;

    log::info!(
        "Merged {} sources into {} ({})",
        loaded.len(),
        opts.output_root.display(),
        merged.report.output
    );
    Ok(merged.report)
}

/// Merges already-loaded datasets in memory.
///
/// Offsets are computed once over all sources. Records are appended in
/// source order; categories and licenses that collapse onto an earlier
/// record are appended only once.
pub fn merge_datasets(
    sources: &[LoadedDataset],
    settings: &MergeSettings,
) -> Result<MergedResult, CocoMergeError> {
    let models: Vec<&CocoDataset> = sources.iter().map(|s| &s.dataset).collect();
    let mut table = remap::build_offsets(&models, &settings.remap).map_err(|e| match e {
        RemapError::DuplicateId { source_index, .. } => {
            CocoMergeError::schema(&sources[source_index].annotation_path, e.to_string())
        }
    })?;
    if let Some(licenses) = &settings.licenses {
        retarget_licenses(&mut table, sources, licenses);
    }

    let mut report = MergeReport::new();
    let mut merged = CocoDataset::default();
    let mut image_sources = Vec::new();

    for (source, offsets) in sources.iter().zip(&table.sources) {
        let path = &source.annotation_path;
        let counts = EntityCounts::of(&source.dataset);
        report.input += counts;
        report.sources.push(SourceSummary {
            index: source.source_index,
            path: source.root.clone(),
            annotation_file: path.clone(),
            counts,
        });

        // An override list is installed after the loop.
        let source_licenses = match settings.licenses {
            Some(_) => &[][..],
            None => &source.dataset.licenses[..],
        };
        for license in source_licenses {
            let Some(id) = offsets.license(license.id) else {
                continue;
            };
            if merged.licenses.iter().all(|l| l.id != id) {
                let mut license = license.clone();
                license.id = id;
                merged.licenses.push(license);
            }
        }

        for category in &source.dataset.categories {
            let Some(id) = offsets.category(category.id) else {
                continue;
            };
            if merged.categories.iter().all(|c| c.id != id) {
                let mut category = category.clone();
                category.id = id;
                merged.categories.push(category);
            }
        }

        for image in &source.dataset.images {
            let mut image = image.clone();
            image.id = offsets.image(image.id).ok_or_else(|| {
                CocoMergeError::schema(path, format!("image {} has no offset", image.id))
            })?;

            if let Some(license) = image.license {
                image.license = offsets.license(license);
                if image.license.is_none() {
                    report.add(MergeIssue::warning(
                        MergeIssueCode::DanglingLicenseRef,
                        format!(
                            "{}: image '{}' references license {} which has no merged counterpart; reference dropped",
                            path.display(),
                            image.file_name,
                            license
                        ),
                    ));
                }
            }

            image_sources.push(ImageSource {
                source_index: source.source_index,
                original_file_name: image.file_name.clone(),
                candidates: source.image_candidates(&image.file_name),
            });
            merged.images.push(image);
        }

        for annotation in &source.dataset.annotations {
            let mut annotation = annotation.clone();
            let original_id = annotation.id;
            annotation.id = offsets.annotation(original_id).ok_or_else(|| {
                CocoMergeError::schema(path, format!("annotation {} has no offset", original_id))
            })?;
            annotation.image_id = offsets.image(annotation.image_id).ok_or_else(|| {
                CocoMergeError::schema(
                    path,
                    format!(
                        "annotation {} references image {} which this dataset does not define",
                        original_id, annotation.image_id
                    ),
                )
            })?;
            annotation.category_id = offsets.category(annotation.category_id).ok_or_else(|| {
                CocoMergeError::schema(
                    path,
                    format!(
                        "annotation {} references category {} which this dataset does not define",
                        original_id, annotation.category_id
                    ),
                )
            })?;
            merged.annotations.push(annotation);
        }
    }

    for conflict in &table.supercategory_conflicts {
        report.add(MergeIssue::info(
            MergeIssueCode::SupercategoryConflict,
            format!(
                "category '{}' from source {} has supercategory {:?}; kept {:?} (merged id {})",
                conflict.name,
                conflict.source_index,
                conflict.dropped,
                conflict.kept,
                conflict.merged_id
            ),
        ));
    }

    if let Some(licenses) = &settings.licenses {
        merged.licenses = licenses.clone();
    }

    merged.info = match &settings.info {
        Some(info) => info.clone(),
        None => merge_info(sources, &mut report),
    };

    report.sources_merged = sources.len();
    report.deduplicated_categories = table.deduplicated_categories;
    report.deduplicated_licenses = table.deduplicated_licenses;
    report.output = EntityCounts::of(&merged);
    report.offsets = table.sources;

    Ok(MergedResult {
        dataset: merged,
        report,
        image_sources,
    })
}

/// Points every source license at the override record with the same
/// `(name, url)`. Source licenses the override does not cover lose their
/// mapping, so images referencing them are reported as dangling.
fn retarget_licenses(table: &mut OffsetTable, sources: &[LoadedDataset], licenses: &[License]) {
    for (source, offsets) in sources.iter().zip(table.sources.iter_mut()) {
        offsets.licenses = source
            .dataset
            .licenses
            .iter()
            .filter_map(|license| {
                licenses
                    .iter()
                    .find(|l| l.name == license.name && l.url == license.url)
                    .map(|l| (license.id, l.id))
            })
            .collect();
    }
    table.deduplicated_licenses = 0;
}

/// First non-empty value per key, in source order. Disagreements are
/// advisory and only noted.
fn merge_info(sources: &[LoadedDataset], report: &mut MergeReport) -> DatasetInfo {
    let mut fields: Map<String, Value> = Map::new();
    let mut origin: Map<String, Value> = Map::new();

    for source in sources {
        for (key, value) in source.dataset.info.fields() {
            if is_blank(value) {
                continue;
            }
            match fields.get(key) {
                None => {
                    fields.insert(key.clone(), value.clone());
                    origin.insert(key.clone(), Value::from(source.source_index));
                }
                Some(kept) if kept != value => {
                    report.add(MergeIssue::info(
                        MergeIssueCode::InfoConflict,
                        format!(
                            "info.{} differs in source {} ({}); kept {} from source {}",
                            key, source.source_index, value, kept, origin[key]
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
    }

    DatasetInfo(fields)
}
