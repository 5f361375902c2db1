//! Newtype IDs for the four COCO entity lists.
//!
//! The merge rewrites IDs in bulk, so keeping each kind in its own type
//! means an image ID can never be written into a `category_id` slot by
//! accident.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! coco_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[inline]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw integer as it appears in COCO JSON.
            #[inline]
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

coco_id!(
    /// Identifier of an entry in `images`.
    ImageId
);
coco_id!(
    /// Identifier of an entry in `annotations`.
    AnnotationId
);
coco_id!(
    /// Identifier of an entry in `categories`.
    CategoryId
);
coco_id!(
    /// Identifier of an entry in `licenses`.
    LicenseId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        assert!(ImageId(2) < ImageId(10));
        assert_eq!(CategoryId::from(7), CategoryId::new(7));
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", LicenseId(3)), "LicenseId(3)");
        assert_eq!(AnnotationId(42).to_string(), "42");
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&ImageId(5)).unwrap();
        assert_eq!(json, "5");
        let back: CategoryId = serde_json::from_str("9").unwrap();
        assert_eq!(back, CategoryId(9));
    }
}
