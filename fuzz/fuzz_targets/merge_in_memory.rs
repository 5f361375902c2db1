//! Fuzz target for the in-memory merge.
//!
//! The input is split at the first NUL byte into two COCO documents. When
//! both parse, merging them must either fail cleanly or produce a document
//! that passes structural validation.
//!
//! Run with:
//!   cargo +nightly fuzz run merge_in_memory

#![no_main]

use std::path::PathBuf;

use cocomerge::coco::from_coco_slice;
use cocomerge::loader::LoadedDataset;
use cocomerge::merge::{merge_datasets, MergeSettings};
use cocomerge::validation::{validate_dataset, ValidateOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }
    let Some(split) = data.iter().position(|b| *b == 0) else {
        return;
    };

    let (Ok(first), Ok(second)) = (
        from_coco_slice(&data[..split]),
        from_coco_slice(&data[split + 1..]),
    ) else {
        return;
    };

    let sources: Vec<LoadedDataset> = [first, second]
        .into_iter()
        .enumerate()
        .map(|(index, dataset)| {
            let root = PathBuf::from(format!("fuzz{index}"));
            LoadedDataset {
                source_index: index,
                annotation_path: root.join("annotations.json"),
                image_root: root.clone(),
                root,
                dataset,
            }
        })
        .collect();

    if let Ok(merged) = merge_datasets(&sources, &MergeSettings::default()) {
        let report = validate_dataset(&merged.dataset, &ValidateOptions::default());
        assert!(report.is_ok(), "merge produced an invalid document:\n{report}");
    }
});
