//! Persisting a merged dataset.
//!
//! Output layout:
//!
//! ```text
//! <output_root>/
//!   annotations.json     (MergeOptions::output_annotation_file)
//!   images/              (MergeOptions::output_images_dir)
//!     ...
//! ```
//!
//! The annotation file is written to a temporary file in the output root and
//! renamed into place, so the final path never holds a partial document.
//! Image problems never abort the write; they become report warnings and
//! the image record is kept.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::coco::write_coco;
use crate::config::{ImageNaming, ImageTransfer, MergeOptions};
use crate::error::CocoMergeError;
use crate::merge::{ImageSource, MergeIssue, MergeIssueCode, MergedResult};

/// Fails if `output_root` cannot receive a merge. Writes nothing.
///
/// # Errors
/// `Output` when the path exists but is not a directory, or is a non-empty
/// directory and `overwrite` is false.
pub fn check_output_root(output_root: &Path, overwrite: bool) -> Result<(), CocoMergeError> {
    let meta = match fs::metadata(output_root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CocoMergeError::output(output_root, e.to_string())),
    };

    if !meta.is_dir() {
        return Err(CocoMergeError::output(
            output_root,
            "path exists and is not a directory",
        ));
    }

    if !overwrite && fs::read_dir(output_root)?.next().is_some() {
        return Err(CocoMergeError::output(
            output_root,
            "directory is not empty (enable overwrite to merge into it)",
        ));
    }

    Ok(())
}

/// Writes the merged dataset: image files first, so renames land in the
/// records, then the annotation file.
pub fn write(merged: &mut MergedResult, opts: &MergeOptions) -> Result<(), CocoMergeError> {
    let images_dir = opts.images_path();
    fs::create_dir_all(&images_dir)?;

    let mut reserved = ReservedNames::default();
    if opts.output_images_dir.is_empty() {
        reserved.reserve(&opts.output_annotation_file);
    }
    let planned = plan_file_names(merged, opts.naming, reserved);

    let resolved: Vec<Option<PathBuf>> = merged
        .image_sources
        .iter()
        .map(|source| source.candidates.iter().find(|p| p.is_file()).cloned())
        .collect();
    let mut pending: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for path in resolved.iter().flatten() {
        *pending.entry(path.clone()).or_default() += 1;
    }

    let mut transferred = 0;

    for (index, target_name) in planned.into_iter().enumerate() {
        let source = &merged.image_sources[index];
        let image = &mut merged.dataset.images[index];

        if target_name != image.file_name {
            log::debug!(
                "source {}: {} -> {}",
                source.source_index,
                image.file_name,
                target_name
            );
            image.file_name = target_name;
        }

        let Some(from) = &resolved[index] else {
            log::warn!(
                "Image file for '{}' (source {}) not found",
                source.original_file_name,
                source.source_index
            );
            merged.report.add(MergeIssue::warning(
                MergeIssueCode::MissingImageFile,
                format!(
                    "source {}: image file '{}' not found (looked in {})",
                    source.source_index,
                    source.original_file_name,
                    display_paths(&source.candidates)
                ),
            ));
            continue;
        };

        // A file shared by several records is only moved by the last one.
        let mode = match pending.get_mut(from) {
            Some(left) => {
                *left -= 1;
                if *left > 0 && opts.transfer == ImageTransfer::Move {
                    ImageTransfer::Copy
                } else {
                    opts.transfer
                }
            }
            None => opts.transfer,
        };

        let to = images_dir.join(&image.file_name);
        match transfer(from, &to, mode) {
            Ok(()) => transferred += 1,
            Err(e) => {
                log::warn!("Failed to transfer image {}: {}", from.display(), e);
                merged.report.add(MergeIssue::warning(
                    MergeIssueCode::ImageTransferFailed,
                    format!("{} -> {}: {}", from.display(), to.display(), e),
                ));
            }
        }
    }

    merged.report.images_transferred = transferred;

    let annotation_path = opts.annotation_path();
    write_annotation_file(merged, &opts.output_root, &annotation_path)?;
    merged.report.annotation_file = Some(annotation_path);
    Ok(())
}

/// Output paths already claimed inside the image folder.
///
/// A name is free only if no file or directory owns it and none of its
/// parent directories is already a file.
#[derive(Debug, Default)]
struct ReservedNames {
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
}

impl ReservedNames {
    fn is_free(&self, name: &str) -> bool {
        !self.files.contains(name) && !self.dirs.contains(name) && !self.parent_is_file(name)
    }

    fn parent_is_file(&self, name: &str) -> bool {
        parent_dirs(name).any(|dir| self.files.contains(dir))
    }

    fn reserve(&mut self, name: &str) {
        for dir in parent_dirs(name) {
            self.dirs.insert(dir.to_string());
        }
        self.files.insert(name.to_string());
    }
}

/// `a/b/c.jpg` yields `a` and `a/b`.
fn parent_dirs(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('/').map(move |(i, _)| &name[..i])
}

/// Decides every output file name before any file is touched, so naming
/// depends only on the merged records and never on what is already on disk.
fn plan_file_names(
    merged: &mut MergedResult,
    naming: ImageNaming,
    mut reserved: ReservedNames,
) -> Vec<String> {
    let mut names = Vec::with_capacity(merged.dataset.images.len());

    for (image, source) in merged.dataset.images.iter().zip(&merged.image_sources) {
        let wanted = match naming {
            ImageNaming::Preserve => normalize_file_name(&image.file_name),
            ImageNaming::Sequential => match extension(&image.file_name) {
                Some(ext) => format!("{}.{}", image.id, ext),
                None => image.id.to_string(),
            },
        };

        let name = if reserved.is_free(&wanted) {
            wanted
        } else {
            let renamed = disambiguate(&wanted, source, &reserved);
            log::info!(
                "Renamed '{}' from source {} to '{}' to avoid a collision",
                wanted,
                source.source_index,
                renamed
            );
            merged.report.add(MergeIssue::info(
                MergeIssueCode::ImageRenamed,
                format!(
                    "source {}: '{}' renamed to '{}' (name already used)",
                    source.source_index, wanted, renamed
                ),
            ));
            renamed
        };

        reserved.reserve(&name);
        names.push(name);
    }

    names
}

/// `dir/stem_src<N>.ext`, then `dir/stem_src<N>_<k>.ext` until free. When a
/// parent directory is already taken by a file, the path is flattened with
/// `_` first.
fn disambiguate(wanted: &str, source: &ImageSource, reserved: &ReservedNames) -> String {
    let wanted = if reserved.parent_is_file(wanted) {
        wanted.replace('/', "_")
    } else {
        wanted.to_string()
    };

    let (dir, file) = match wanted.rsplit_once('/') {
        Some((dir, file)) => (format!("{dir}/"), file),
        None => (String::new(), wanted.as_str()),
    };
    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (file, String::new()),
    };

    let base = format!("{dir}{stem}_src{}", source.source_index);
    let mut candidate = format!("{base}{ext}");
    let mut n = 1;
    while !reserved.is_free(&candidate) {
        candidate = format!("{base}_{n}{ext}");
        n += 1;
    }
    candidate
}

/// Keeps the relative path but drops anything that would escape the image
/// folder (roots, `.` and `..`), and uses `/` separators.
fn normalize_file_name(file_name: &str) -> String {
    let normalized = Path::new(&file_name.replace('\\', "/"))
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    if normalized.is_empty() {
        "unnamed".to_string()
    } else {
        normalized
    }
}

/// Fuzz-only entrypoint for output file name normalization.
#[cfg(feature = "fuzzing")]
pub fn fuzz_normalize_file_name(input: &str) -> String {
    normalize_file_name(input)
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
}

fn transfer(from: &Path, to: &Path, mode: ImageTransfer) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    match mode {
        ImageTransfer::Copy => fs::copy(from, to).map(|_| ()),
        ImageTransfer::Move => match fs::rename(from, to) {
            Ok(()) => Ok(()),
            // Cross-device renames fail; fall back to copy + remove.
            Err(_) => {
                fs::copy(from, to)?;
                fs::remove_file(from)
            }
        },
        ImageTransfer::HardLink => {
            if to.exists() {
                fs::remove_file(to)?;
            }
            fs::hard_link(from, to)
        }
    }
}

fn write_annotation_file(
    merged: &MergedResult,
    output_root: &Path,
    final_path: &Path,
) -> Result<(), CocoMergeError> {
    let tmp = NamedTempFile::new_in(output_root)?;
    write_coco(BufWriter::new(tmp.as_file()), &merged.dataset, final_path)?;
    tmp.as_file().sync_all()?;
    tmp.persist(final_path).map_err(|e| CocoMergeError::Io(e.error))?;

    log::info!(
        "Wrote {} ({})",
        final_path.display(),
        merged.report.output
    );
    Ok(())
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coco::{CocoDataset, Image};
    use crate::merge::MergeReport;

    fn result_with(names: &[(usize, &str)]) -> MergedResult {
        let images = names
            .iter()
            .enumerate()
            .map(|(i, (_, name))| Image::new(i as u64 + 1, *name, 4, 4))
            .collect();
        let image_sources = names
            .iter()
            .map(|(src, name)| ImageSource {
                source_index: *src,
                original_file_name: name.to_string(),
                candidates: vec![PathBuf::from(format!("/nowhere/{src}/{name}"))],
            })
            .collect();
        MergedResult {
            dataset: CocoDataset {
                images,
                ..Default::default()
            },
            report: MergeReport::new(),
            image_sources,
        }
    }

    #[test]
    fn collisions_get_a_source_suffix() {
        let mut merged = result_with(&[(0, "img.jpg"), (1, "img.jpg"), (2, "img.jpg")]);
        let names = plan_file_names(&mut merged, ImageNaming::Preserve, ReservedNames::default());
        assert_eq!(names, vec!["img.jpg", "img_src1.jpg", "img_src2.jpg"]);
        assert_eq!(
            merged
                .report
                .issues_with(MergeIssueCode::ImageRenamed)
                .count(),
            2
        );
    }

    #[test]
    fn suffix_collisions_count_up() {
        let mut merged = result_with(&[(0, "a.png"), (1, "a_src1.png"), (1, "a.png")]);
        let names = plan_file_names(&mut merged, ImageNaming::Preserve, ReservedNames::default());
        assert_eq!(names, vec!["a.png", "a_src1.png", "a_src1_1.png"]);
    }

    #[test]
    fn nested_and_extensionless_names() {
        let mut merged = result_with(&[(0, "train/x.jpg"), (1, "train/x.jpg"), (0, "raw"), (1, "raw")]);
        let names = plan_file_names(&mut merged, ImageNaming::Preserve, ReservedNames::default());
        assert_eq!(names, vec!["train/x.jpg", "train/x_src1.jpg", "raw", "raw_src1"]);
    }

    #[test]
    fn sequential_naming_uses_merged_ids() {
        let mut merged = result_with(&[(0, "a.jpg"), (1, "dir/b.PNG"), (1, "noext")]);
        let names = plan_file_names(&mut merged, ImageNaming::Sequential, ReservedNames::default());
        assert_eq!(names, vec!["1.jpg", "2.PNG", "3"]);
    }

    #[test]
    fn file_and_directory_names_never_overlap() {
        let mut merged = result_with(&[(0, "a"), (1, "a/b.jpg"), (0, "x/y.jpg"), (1, "x")]);
        let names = plan_file_names(&mut merged, ImageNaming::Preserve, ReservedNames::default());
        assert_eq!(names, vec!["a", "a_b_src1.jpg", "x/y.jpg", "x_src1"]);
        assert_eq!(
            merged
                .report
                .issues_with(MergeIssueCode::ImageRenamed)
                .count(),
            2
        );
    }

    #[test]
    fn reserved_annotation_file_name_is_avoided() {
        let mut reserved = ReservedNames::default();
        reserved.reserve("annotations.json");
        let mut merged = result_with(&[(0, "annotations.json"), (1, "annotations.json/c.jpg")]);
        let names = plan_file_names(&mut merged, ImageNaming::Preserve, reserved);
        assert_eq!(names, vec!["annotations_src0.json", "annotations.json_c_src1.jpg"]);
    }

    #[test]
    fn escaping_paths_are_normalized() {
        assert_eq!(normalize_file_name("../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize_file_name("/abs/img.jpg"), "abs/img.jpg");
        assert_eq!(normalize_file_name("./a\\b.jpg"), "a/b.jpg");
        assert_eq!(normalize_file_name(".."), "unnamed");
    }

    #[test]
    fn missing_output_root_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_output_root(&dir.path().join("new"), false).is_ok());
    }

    #[test]
    fn file_as_output_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        let err = check_output_root(&file, true).unwrap_err();
        assert!(matches!(err, CocoMergeError::Output { .. }));
    }

    #[test]
    fn non_empty_root_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.json"), "{}").unwrap();
        assert!(matches!(
            check_output_root(dir.path(), false),
            Err(CocoMergeError::Output { .. })
        ));
        assert!(check_output_root(dir.path(), true).is_ok());
    }

    #[test]
    fn missing_images_are_warnings_and_records_stay() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let opts = MergeOptions::new(&out, vec![]);
        let mut merged = result_with(&[(0, "gone.jpg"), (1, "gone.jpg")]);

        write(&mut merged, &opts).unwrap();

        assert_eq!(merged.report.warning_count(), 2);
        assert_eq!(merged.report.images_transferred, 0);
        assert_eq!(merged.dataset.images[1].file_name, "gone_src1.jpg");

        let written = fs::read_to_string(out.join("annotations.json")).unwrap();
        assert!(written.contains("gone_src1.jpg"));
        // Only the final file remains; the temporary file was renamed away.
        let entries: Vec<_> = fs::read_dir(&out).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    fn result_from_files(files: &[(usize, &str, PathBuf)]) -> MergedResult {
        let mut merged = result_with(
            &files
                .iter()
                .map(|(src, name, _)| (*src, *name))
                .collect::<Vec<_>>(),
        );
        for (source, (_, _, path)) in merged.image_sources.iter_mut().zip(files) {
            source.candidates = vec![path.clone()];
        }
        merged
    }

    #[test]
    fn image_named_like_the_annotation_file_survives_root_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("annotations.json");
        fs::write(&src, b"pixels").unwrap();
        let out = dir.path().join("out");
        let mut opts = MergeOptions::new(&out, vec![]);
        opts.output_images_dir = String::new();
        let mut merged = result_from_files(&[(0, "annotations.json", src)]);

        write(&mut merged, &opts).unwrap();

        assert_eq!(merged.dataset.images[0].file_name, "annotations_src0.json");
        assert_eq!(fs::read(out.join("annotations_src0.json")).unwrap(), b"pixels");
        let written = fs::read_to_string(out.join("annotations.json")).unwrap();
        assert!(written.contains("\"images\""), "{written}");
    }

    #[test]
    fn moving_a_file_shared_by_two_records_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("shared.jpg");
        fs::write(&src, b"pixels").unwrap();
        let out = dir.path().join("out");
        let mut opts = MergeOptions::new(&out, vec![]);
        opts.transfer = ImageTransfer::Move;
        let mut merged =
            result_from_files(&[(0, "shared.jpg", src.clone()), (0, "shared.jpg", src.clone())]);

        write(&mut merged, &opts).unwrap();

        assert_eq!(merged.report.warning_count(), 0, "{}", merged.report);
        assert_eq!(merged.report.images_transferred, 2);
        assert_eq!(fs::read(out.join("images/shared.jpg")).unwrap(), b"pixels");
        assert_eq!(fs::read(out.join("images/shared_src0.jpg")).unwrap(), b"pixels");
        assert!(!src.exists());
    }

    #[test]
    fn move_and_hard_link_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");

        fs::write(&src, b"pixels").unwrap();
        let linked = dir.path().join("out/linked.bin");
        transfer(&src, &linked, ImageTransfer::HardLink).unwrap();
        assert_eq!(fs::read(&linked).unwrap(), b"pixels");
        assert!(src.exists());

        let moved = dir.path().join("out/nested/moved.bin");
        transfer(&src, &moved, ImageTransfer::Move).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&moved).unwrap(), b"pixels");
    }
}
