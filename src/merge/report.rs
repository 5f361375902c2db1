//! Merge report: what was merged, what was collapsed, what went wrong.
//!
//! The report is the structured result of a merge. Missing image files and
//! similar per-file problems end up here as warnings rather than aborting
//! the run, so callers should check [`MergeReport::has_warnings`] even when
//! the merge succeeded.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::coco::CocoDataset;
use crate::remap::SourceOffsets;

/// Outcome of one merge.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MergeReport {
    /// Per-source provenance, in merge order.
    pub sources: Vec<SourceSummary>,
    /// Sum of the source counts.
    pub input: EntityCounts,
    /// Counts in the merged document.
    pub output: EntityCounts,
    pub deduplicated_categories: usize,
    pub deduplicated_licenses: usize,
    /// Number of sources whose info blocks were considered.
    pub sources_merged: usize,
    /// Original-to-merged ID tables, one per source.
    pub offsets: Vec<SourceOffsets>,
    /// Images whose file reached the output folder.
    pub images_transferred: usize,
    /// Where the merged annotation file was written, once written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_file: Option<PathBuf>,
    pub issues: Vec<MergeIssue>,
}

impl MergeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: MergeIssue) {
        self.issues.push(issue);
    }

    pub fn warning_count(&self) -> usize {
        self.count(MergeSeverity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(MergeSeverity::Info)
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    /// Issues with the given code, in the order they were raised.
    pub fn issues_with(&self, code: MergeIssueCode) -> impl Iterator<Item = &MergeIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }

    fn count(&self, severity: MergeSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merged {} source dataset(s):", self.sources.len())?;
        for source in &self.sources {
            writeln!(
                f,
                "  [{}] {}: {}",
                source.index,
                source.path.display(),
                source.counts
            )?;
        }
        writeln!(f, "  output: {}", self.output)?;

        if self.deduplicated_categories > 0 || self.deduplicated_licenses > 0 {
            writeln!(
                f,
                "  deduplicated: {} categories, {} licenses",
                self.deduplicated_categories, self.deduplicated_licenses
            )?;
        }
        writeln!(
            f,
            "  images transferred: {}/{}",
            self.images_transferred, self.output.images
        )?;
        if let Some(path) = &self.annotation_file {
            writeln!(f, "  annotation file: {}", path.display())?;
        }

        for (label, severity) in [
            ("Warnings", MergeSeverity::Warning),
            ("Notes", MergeSeverity::Info),
        ] {
            let count = self.count(severity);
            if count == 0 {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{} ({}):", label, count)?;
            for issue in self.issues.iter().filter(|i| i.severity == severity) {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        Ok(())
    }
}

/// Provenance of one source.
#[derive(Clone, Debug, Serialize)]
pub struct SourceSummary {
    pub index: usize,
    pub path: PathBuf,
    pub annotation_file: PathBuf,
    pub counts: EntityCounts,
}

/// Counts of the four COCO lists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub images: usize,
    pub annotations: usize,
    pub categories: usize,
    pub licenses: usize,
}

impl EntityCounts {
    pub fn of(dataset: &CocoDataset) -> Self {
        Self {
            images: dataset.images.len(),
            annotations: dataset.annotations.len(),
            categories: dataset.categories.len(),
            licenses: dataset.licenses.len(),
        }
    }
}

impl std::ops::AddAssign for EntityCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.images += rhs.images;
        self.annotations += rhs.annotations;
        self.categories += rhs.categories;
        self.licenses += rhs.licenses;
    }
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} images, {} annotations, {} categories, {} licenses",
            self.images, self.annotations, self.categories, self.licenses
        )
    }
}

/// A single non-fatal finding.
#[derive(Clone, Debug, Serialize)]
pub struct MergeIssue {
    pub severity: MergeSeverity,
    pub code: MergeIssueCode,
    pub message: String,
}

impl MergeIssue {
    pub fn warning(code: MergeIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: MergeSeverity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn info(code: MergeIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: MergeSeverity::Info,
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSeverity {
    /// Data the caller expected did not fully make it into the output.
    Warning,
    /// A policy decision worth knowing about.
    Info,
}

/// Stable issue codes for programmatic consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeIssueCode {
    /// An image's source file was not found; its record was still written.
    MissingImageFile,
    /// Copying, moving or linking an image file failed.
    ImageTransferFailed,
    /// An image was renamed to avoid a file name collision.
    ImageRenamed,
    /// An image referenced a license its source does not define.
    DanglingLicenseRef,
    /// Same-name categories disagreed on supercategory.
    SupercategoryConflict,
    /// Sources disagreed on an info field; the first value was kept.
    InfoConflict,
}
