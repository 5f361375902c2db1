//! Fuzz target for output file name normalization.
//!
//! A normalized name must stay inside the image folder.
//!
//! Run with:
//!   cargo +nightly fuzz run file_name_normalize

#![no_main]

use std::path::{Component, Path};

use cocomerge::writer::fuzz_normalize_file_name;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &str| {
    let name = fuzz_normalize_file_name(input);

    assert!(!name.is_empty());
    assert!(
        Path::new(&name)
            .components()
            .all(|c| matches!(c, Component::Normal(_))),
        "{input:?} normalized to escaping path {name:?}"
    );
});
