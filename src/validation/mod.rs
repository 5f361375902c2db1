//! Structural checks on a COCO document.
//!
//! These are the invariants a merge must preserve: unique IDs in every
//! list, and no annotation or image pointing at a record that does not
//! exist. Geometry is deliberately not inspected.

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::{BTreeMap, BTreeSet};

use crate::coco::{CategoryId, CocoDataset};

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Treat warnings as failures (used by the CLI exit status).
    pub strict: bool,
}

impl ValidateOptions {
    /// Whether `report` counts as a failure under these options.
    pub fn fails(&self, report: &ValidationReport) -> bool {
        !report.is_ok() || (self.strict && report.warning_count() > 0)
    }
}

/// Checks ID uniqueness, references and naming.
pub fn validate_dataset(dataset: &CocoDataset, _opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    let license_ids = check_unique(
        dataset.licenses.iter().map(|l| l.id.as_u64()),
        IssueCode::DuplicateLicenseId,
        |id| IssueContext::License { id },
        &mut report,
    );
    let image_ids = check_unique(
        dataset.images.iter().map(|i| i.id.as_u64()),
        IssueCode::DuplicateImageId,
        |id| IssueContext::Image { id },
        &mut report,
    );
    let category_ids = check_unique(
        dataset.categories.iter().map(|c| c.id.as_u64()),
        IssueCode::DuplicateCategoryId,
        |id| IssueContext::Category { id },
        &mut report,
    );
    check_unique(
        dataset.annotations.iter().map(|a| a.id.as_u64()),
        IssueCode::DuplicateAnnotationId,
        |id| IssueContext::Annotation { id },
        &mut report,
    );

    for image in &dataset.images {
        let id = image.id.as_u64();
        if image.file_name.trim().is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyFileName,
                "Empty file_name",
                IssueContext::Image { id },
            ));
        }
        if let Some(license) = image.license {
            if !license_ids.contains(&license.as_u64()) {
                report.add(ValidationIssue::error(
                    IssueCode::MissingLicenseRef,
                    format!("References non-existent license {}", license),
                    IssueContext::Image { id },
                ));
            }
        }
    }

    check_category_names(dataset, &mut report);

    for ann in &dataset.annotations {
        let id = ann.id.as_u64();
        if !image_ids.contains(&ann.image_id.as_u64()) {
            report.add(ValidationIssue::error(
                IssueCode::MissingImageRef,
                format!("References non-existent image {}", ann.image_id),
                IssueContext::Annotation { id },
            ));
        }
        if !category_ids.contains(&ann.category_id.as_u64()) {
            report.add(ValidationIssue::error(
                IssueCode::MissingCategoryRef,
                format!("References non-existent category {}", ann.category_id),
                IssueContext::Annotation { id },
            ));
        }
    }

    report
}

/// Reports repeated IDs and returns the set of IDs seen.
fn check_unique(
    ids: impl Iterator<Item = u64>,
    code: IssueCode,
    context: impl Fn(u64) -> IssueContext,
    report: &mut ValidationReport,
) -> BTreeSet<u64> {
    let mut first_index: BTreeMap<u64, usize> = BTreeMap::new();
    for (idx, id) in ids.enumerate() {
        if let Some(first) = first_index.get(&id) {
            report.add(ValidationIssue::error(
                code,
                format!("Duplicate ID {} (first seen at index {})", id, first),
                context(id),
            ));
        } else {
            first_index.insert(id, idx);
        }
    }
    first_index.into_keys().collect()
}

fn check_category_names(dataset: &CocoDataset, report: &mut ValidationReport) {
    let mut seen: BTreeMap<(&str, Option<&str>), CategoryId> = BTreeMap::new();
    for category in &dataset.categories {
        let id = category.id.as_u64();
        if category.name.trim().is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyCategoryName,
                "Empty category name",
                IssueContext::Category { id },
            ));
            continue;
        }

        let key = (category.name.as_str(), category.supercategory.as_deref());
        match seen.get(&key) {
            Some(first) => report.add(ValidationIssue::warning(
                IssueCode::DuplicateCategoryName,
                format!(
                    "Duplicate category name '{}' (also used by category {})",
                    category.name, first
                ),
                IssueContext::Category { id },
            )),
            None => {
                seen.insert(key, category.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coco::{Annotation, Category, Image, License, LicenseId};

    fn valid_dataset() -> CocoDataset {
        CocoDataset {
            licenses: vec![License::new(1u64, "CC0")],
            images: vec![Image::new(1u64, "image.jpg", 640, 480).with_license(1u64)],
            categories: vec![Category::new(1u64, "person")],
            annotations: vec![Annotation::new(1u64, 1u64, 1u64).with_bbox(1.0, 2.0, 3.0, 4.0)],
            ..Default::default()
        }
    }

    fn codes(report: &ValidationReport) -> Vec<IssueCode> {
        report.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn valid_dataset_is_clean() {
        let report = validate_dataset(&valid_dataset(), &ValidateOptions::default());
        assert!(report.is_clean(), "{report}");
    }

    #[test]
    fn duplicate_ids_are_errors_in_every_list() {
        let mut dataset = valid_dataset();
        dataset.images.push(Image::new(1u64, "other.jpg", 1, 1));
        dataset.categories.push(Category::new(1u64, "car"));
        dataset.licenses.push(License::new(1u64, "MIT"));
        dataset.annotations.push(Annotation::new(1u64, 1u64, 1u64));

        let report = validate_dataset(&dataset, &ValidateOptions::default());
        assert_eq!(report.error_count(), 4);
        for code in [
            IssueCode::DuplicateImageId,
            IssueCode::DuplicateCategoryId,
            IssueCode::DuplicateLicenseId,
            IssueCode::DuplicateAnnotationId,
        ] {
            assert!(codes(&report).contains(&code), "missing {code:?}");
        }
    }

    #[test]
    fn dangling_references_are_errors() {
        let mut dataset = valid_dataset();
        dataset.annotations.push(Annotation::new(2u64, 99u64, 98u64));
        dataset.images[0].license = Some(LicenseId(7));

        let report = validate_dataset(&dataset, &ValidateOptions::default());
        assert_eq!(
            codes(&report),
            vec![
                IssueCode::MissingLicenseRef,
                IssueCode::MissingImageRef,
                IssueCode::MissingCategoryRef
            ]
        );
    }

    #[test]
    fn naming_problems_are_warnings() {
        let mut dataset = valid_dataset();
        dataset.images[0].file_name = " ".into();
        dataset.categories.push(Category::new(2u64, "person"));
        dataset.categories.push(Category::new(3u64, ""));

        let report = validate_dataset(&dataset, &ValidateOptions::default());
        assert!(report.is_ok());
        assert_eq!(report.warning_count(), 3);

        assert!(!ValidateOptions::default().fails(&report));
        assert!(ValidateOptions { strict: true }.fails(&report));
    }

    #[test]
    fn same_name_with_different_supercategory_is_not_a_duplicate() {
        let mut dataset = valid_dataset();
        dataset.categories[0].supercategory = Some("human".into());
        dataset
            .categories
            .push(Category::new(2u64, "person").with_supercategory("statue"));

        let report = validate_dataset(&dataset, &ValidateOptions::default());
        assert!(report.is_clean(), "{report}");
    }
}
