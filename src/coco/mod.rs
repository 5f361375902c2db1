//! The COCO schema model.
//!
//! A [`CocoDataset`] holds the five top-level COCO entries. Records are
//! permissive: beyond the IDs and references the merge rewrites, every field
//! is carried through as raw JSON.
//!
//! # Example
//!
//! ```
//! use cocomerge::coco::{Annotation, Category, CocoDataset, Image};
//!
//! let dataset = CocoDataset {
//!     images: vec![Image::new(1u64, "image.jpg", 640, 480)],
//!     categories: vec![Category::new(1u64, "person")],
//!     annotations: vec![Annotation::new(1u64, 1u64, 1u64).with_bbox(10.0, 20.0, 90.0, 180.0)],
//!     ..Default::default()
//! };
//! assert_eq!(dataset.images.len(), 1);
//! ```

mod ids;
mod io;
mod model;

pub use ids::{AnnotationId, CategoryId, ImageId, LicenseId};
pub use io::{
    from_coco_slice, from_coco_str, from_coco_value, read_coco_json, to_coco_string, write_coco,
};
pub use model::{is_blank, Annotation, Category, CocoDataset, DatasetInfo, Image, License};
