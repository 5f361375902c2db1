#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;

use cocomerge::coco::{Annotation, Category, CocoDataset, Image};
use cocomerge::loader::LoadedDataset;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Names drawn from a small pool so datasets regularly share categories.
const CATEGORY_POOL: &[&str] = &["person", "dog", "cat", "car", "bicycle", "tree"];

/// Distinct, arbitrary (non-contiguous) IDs.
fn arb_ids(min: usize, max: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(0u64..10_000, min..=max)
        .prop_map(|ids| ids.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// A structurally valid COCO document with sparse, shuffled IDs.
pub fn arb_dataset(
    max_images: usize,
    max_categories: usize,
    max_annotations: usize,
) -> BoxedStrategy<CocoDataset> {
    (
        arb_ids(1, max_images),
        prop::sample::subsequence(CATEGORY_POOL.to_vec(), 1..=max_categories.min(CATEGORY_POOL.len())),
        arb_ids(1, max_categories.min(CATEGORY_POOL.len())),
    )
        .prop_flat_map(move |(image_ids, names, category_ids)| {
            let n_categories = names.len().min(category_ids.len());
            let categories: Vec<Category> = names
                .into_iter()
                .zip(category_ids)
                .take(n_categories)
                .map(|(name, id)| Category::new(id, name))
                .collect();
            let images: Vec<Image> = image_ids
                .iter()
                .map(|id| Image::new(*id, format!("img_{id}.jpg"), 64, 48))
                .collect();

            let image_count = images.len();
            let annotation_refs = prop::collection::vec(
                (0..image_count, 0..n_categories),
                0..=max_annotations,
            );
            (Just(images), Just(categories), annotation_refs, arb_ids(max_annotations, max_annotations))
        })
        .prop_map(|(images, categories, refs, annotation_ids)| {
            let annotations = refs
                .into_iter()
                .zip(annotation_ids)
                .map(|((image_idx, category_idx), id)| {
                    Annotation::new(id, images[image_idx].id, categories[category_idx].id)
                        .with_bbox(1.0, 2.0, 3.0, 4.0)
                })
                .collect();
            CocoDataset {
                images,
                categories,
                annotations,
                ..Default::default()
            }
        })
        .boxed()
}

/// Two to four independent datasets.
pub fn arb_sources() -> BoxedStrategy<Vec<CocoDataset>> {
    prop::collection::vec(arb_dataset(6, 4, 12), 2..=4).boxed()
}

/// Wraps in-memory datasets as if they had been loaded from disk.
pub fn as_loaded(datasets: &[CocoDataset]) -> Vec<LoadedDataset> {
    datasets
        .iter()
        .enumerate()
        .map(|(index, dataset)| {
            let root = PathBuf::from(format!("/sources/{index}"));
            LoadedDataset {
                source_index: index,
                annotation_path: root.join("annotations.json"),
                image_root: root.join("images"),
                root,
                dataset: dataset.clone(),
            }
        })
        .collect()
}

pub fn distinct_category_names(datasets: &[CocoDataset]) -> BTreeSet<String> {
    datasets
        .iter()
        .flat_map(|d| d.categories.iter().map(|c| c.name.clone()))
        .collect()
}
