//! In-memory COCO document.
//!
//! Only the fields the merge has to read or rewrite are typed. Everything
//! else a COCO variant carries (bbox, segmentation, keypoints, area, score,
//! coco_url, ...) is kept verbatim in each record's `extra` map so it
//! survives the merge untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::ids::{AnnotationId, CategoryId, ImageId, LicenseId};

/// A complete COCO annotation document.
///
/// Top-level keys serialize in the order `info`, `licenses`, `images`,
/// `annotations`, `categories`. List order is whatever the caller stored;
/// the merge relies on that to keep per-source order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(default, deserialize_with = "info_or_null")]
    pub info: DatasetInfo,

    /// Some writers use the singular key `license` for this list.
    #[serde(default, alias = "license")]
    pub licenses: Vec<License>,

    pub images: Vec<Image>,

    pub annotations: Vec<Annotation>,

    pub categories: Vec<Category>,
}

impl CocoDataset {
    /// Looks up an image by ID with a linear scan.
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|img| img.id == id)
    }

    /// Looks up a category by ID with a linear scan.
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|cat| cat.id == id)
    }
}

// Some exporters write `"info": null`.
fn info_or_null<'de, D>(deserializer: D) -> Result<DatasetInfo, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<DatasetInfo>::deserialize(deserializer)?.unwrap_or_default())
}

/// The free-form `info` block.
///
/// COCO producers disagree on its shape (`year` as a number or a string,
/// extra vendor keys), so it is held as a plain JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetInfo(pub Map<String, Value>);

impl DatasetInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a string-valued field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`DatasetInfo::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// True when no field carries a meaningful value.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(is_blank)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Null, empty strings, empty arrays and empty objects count as "no value"
/// when merging info blocks.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// A license referenced by images.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl License {
    pub fn new(id: impl Into<LicenseId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: None,
            extra: Map::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A category (class label).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,

    /// Keypoint names, skeletons and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supercategory: None,
            extra: Map::new(),
        }
    }

    pub fn with_supercategory(mut self, supercategory: impl Into<String>) -> Self {
        self.supercategory = Some(supercategory.into());
        self
    }
}

/// An image record. `file_name` is resolved relative to the dataset's
/// image root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,

    /// Kept as a raw JSON number; exporters write `640` as well as `640.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Number>,

    pub file_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseId>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Image {
    pub fn new(id: impl Into<ImageId>, file_name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width: Some(width.into()),
            height: Some(height.into()),
            file_name: file_name.into(),
            license: None,
            extra: Map::new(),
        }
    }

    pub fn with_license(mut self, license: impl Into<LicenseId>) -> Self {
        self.license = Some(license.into());
        self
    }
}

/// One labeled instance. Geometry is opaque to the merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,

    pub image_id: ImageId,

    pub category_id: CategoryId,

    /// `bbox`, `segmentation`, `area`, `iscrowd`, `score`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    pub fn new(
        id: impl Into<AnnotationId>,
        image_id: impl Into<ImageId>,
        category_id: impl Into<CategoryId>,
    ) -> Self {
        Self {
            id: id.into(),
            image_id: image_id.into(),
            category_id: category_id.into(),
            extra: Map::new(),
        }
    }

    /// Attaches a COCO `[x, y, width, height]` box and the matching area.
    pub fn with_bbox(mut self, x: f64, y: f64, w: f64, h: f64) -> Self {
        self.extra
            .insert("bbox".to_string(), serde_json::json!([x, y, w, h]));
        self.extra
            .insert("area".to_string(), serde_json::json!(w * h));
        self.extra.insert("iscrowd".to_string(), Value::from(0));
        self
    }
}
