//! ID translation tables for a merge.
//!
//! [`build_offsets`] makes one ordered pass over the sources and decides,
//! for every original ID of every entity kind, which ID it gets in the
//! merged document:
//!
//! - images and annotations always get a fresh ID, `counter + rank`, where
//!   rank is the record's position in its source list;
//! - categories and licenses first consult a table keyed by semantic
//!   identity and reuse the merged ID of an equivalent record seen earlier.
//!
//! The counters and the identity tables live in a [`Remapper`] value owned
//! by one call, so independent merges never share state. Only ordered maps
//! are used; the result depends on input order alone.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::coco::{AnnotationId, Category, CategoryId, CocoDataset, ImageId, License, LicenseId};
use crate::config::{CategoryMatch, IdBase};

/// Options for [`build_offsets`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RemapOptions {
    pub id_base: IdBase,
    pub category_match: CategoryMatch,
}

/// The entity lists that carry IDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Image,
    Annotation,
    Category,
    License,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Image => "image",
            EntityKind::Annotation => "annotation",
            EntityKind::Category => "category",
            EntityKind::License => "license",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemapError {
    #[error("source {source_index} defines {kind} id {id} more than once")]
    DuplicateId {
        source_index: usize,
        kind: EntityKind,
        id: u64,
    },
}

/// Original-to-merged ID maps for one source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceOffsets {
    pub source_index: usize,
    pub images: BTreeMap<ImageId, ImageId>,
    pub annotations: BTreeMap<AnnotationId, AnnotationId>,
    pub categories: BTreeMap<CategoryId, CategoryId>,
    pub licenses: BTreeMap<LicenseId, LicenseId>,
}

impl SourceOffsets {
    pub fn image(&self, id: ImageId) -> Option<ImageId> {
        self.images.get(&id).copied()
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<AnnotationId> {
        self.annotations.get(&id).copied()
    }

    pub fn category(&self, id: CategoryId) -> Option<CategoryId> {
        self.categories.get(&id).copied()
    }

    pub fn license(&self, id: LicenseId) -> Option<LicenseId> {
        self.licenses.get(&id).copied()
    }
}

/// A category that matched an earlier one by name but disagreed on
/// supercategory. The earlier record is kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupercategoryConflict {
    pub source_index: usize,
    pub name: String,
    pub merged_id: CategoryId,
    pub kept: Option<String>,
    pub dropped: Option<String>,
}

/// Everything [`build_offsets`] decided.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OffsetTable {
    /// One entry per source, in input order.
    pub sources: Vec<SourceOffsets>,
    /// Categories that reused an earlier merged ID.
    pub deduplicated_categories: usize,
    /// Licenses that reused an earlier merged ID.
    pub deduplicated_licenses: usize,
    pub supercategory_conflicts: Vec<SupercategoryConflict>,
}

impl OffsetTable {
    pub fn source(&self, index: usize) -> Option<&SourceOffsets> {
        self.sources.get(index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CategoryKey {
    name: String,
    supercategory: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct LicenseKey {
    name: String,
    url: Option<String>,
}

struct CategoryEntry {
    merged_id: CategoryId,
    supercategory: Option<String>,
}

/// Running state of one remapping pass.
struct Remapper {
    opts: RemapOptions,
    next_image: u64,
    next_annotation: u64,
    next_category: u64,
    next_license: u64,
    categories_seen: BTreeMap<CategoryKey, CategoryEntry>,
    licenses_seen: BTreeMap<LicenseKey, LicenseId>,
    table: OffsetTable,
}

impl Remapper {
    fn new(opts: RemapOptions) -> Self {
        let start = opts.id_base.start();
        Self {
            opts,
            next_image: start,
            next_annotation: start,
            next_category: start,
            next_license: start,
            categories_seen: BTreeMap::new(),
            licenses_seen: BTreeMap::new(),
            table: OffsetTable::default(),
        }
    }

    fn add_source(&mut self, source_index: usize, model: &CocoDataset) -> Result<(), RemapError> {
        let mut offsets = SourceOffsets {
            source_index,
            ..Default::default()
        };

        offsets.images = sequential(
            model.images.iter().map(|img| img.id.as_u64()),
            &mut self.next_image,
            source_index,
            EntityKind::Image,
        )?;
        offsets.annotations = sequential(
            model.annotations.iter().map(|ann| ann.id.as_u64()),
            &mut self.next_annotation,
            source_index,
            EntityKind::Annotation,
        )?;

        for category in &model.categories {
            let merged = self.category_id(source_index, category);
            if offsets.categories.insert(category.id, merged).is_some() {
                return Err(RemapError::DuplicateId {
                    source_index,
                    kind: EntityKind::Category,
                    id: category.id.as_u64(),
                });
            }
        }

        for license in &model.licenses {
            let merged = self.license_id(license);
            if offsets.licenses.insert(license.id, merged).is_some() {
                return Err(RemapError::DuplicateId {
                    source_index,
                    kind: EntityKind::License,
                    id: license.id.as_u64(),
                });
            }
        }

        log::debug!(
            "source {}: images -> [{}, {}), annotations -> [{}, {}), {} categories, {} licenses",
            source_index,
            self.next_image - offsets.images.len() as u64,
            self.next_image,
            self.next_annotation - offsets.annotations.len() as u64,
            self.next_annotation,
            offsets.categories.len(),
            offsets.licenses.len()
        );

        self.table.sources.push(offsets);
        Ok(())
    }

    fn category_id(&mut self, source_index: usize, category: &Category) -> CategoryId {
        let key = CategoryKey {
            name: category.name.clone(),
            supercategory: match self.opts.category_match {
                CategoryMatch::Name => None,
                CategoryMatch::NameAndSupercategory => category.supercategory.clone(),
            },
        };

        if let Some(entry) = self.categories_seen.get(&key) {
            self.table.deduplicated_categories += 1;
            if entry.supercategory != category.supercategory {
                self.table.supercategory_conflicts.push(SupercategoryConflict {
                    source_index,
                    name: category.name.clone(),
                    merged_id: entry.merged_id,
                    kept: entry.supercategory.clone(),
                    dropped: category.supercategory.clone(),
                });
            }
            return entry.merged_id;
        }

        let merged_id = CategoryId::new(self.next_category);
        self.next_category += 1;
        self.categories_seen.insert(
            key,
            CategoryEntry {
                merged_id,
                supercategory: category.supercategory.clone(),
            },
        );
        merged_id
    }

    fn license_id(&mut self, license: &License) -> LicenseId {
        let key = LicenseKey {
            name: license.name.clone(),
            url: license.url.clone(),
        };

        if let Some(&merged_id) = self.licenses_seen.get(&key) {
            self.table.deduplicated_licenses += 1;
            return merged_id;
        }

        let merged_id = LicenseId::new(self.next_license);
        self.next_license += 1;
        self.licenses_seen.insert(key, merged_id);
        merged_id
    }
}

/// Assigns `*next + rank` to each ID in order and advances the counter.
fn sequential<T>(
    ids: impl Iterator<Item = u64>,
    next: &mut u64,
    source_index: usize,
    kind: EntityKind,
) -> Result<BTreeMap<T, T>, RemapError>
where
    T: From<u64> + Ord,
{
    let base = *next;
    let mut map = BTreeMap::new();
    let mut count = 0u64;
    for (rank, id) in ids.enumerate() {
        if map.insert(T::from(id), T::from(base + rank as u64)).is_some() {
            return Err(RemapError::DuplicateId {
                source_index,
                kind,
                id,
            });
        }
        count += 1;
    }
    *next = base + count;
    Ok(map)
}

/// Computes the translation tables for `models`, in order.
///
/// Identical input always yields an identical table.
pub fn build_offsets(
    models: &[&CocoDataset],
    opts: &RemapOptions,
) -> Result<OffsetTable, RemapError> {
    let mut remapper = Remapper::new(*opts);
    for (index, model) in models.iter().enumerate() {
        remapper.add_source(index, model)?;
    }
    Ok(remapper.table)
}
