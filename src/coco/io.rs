//! COCO JSON reading and writing.
//!
//! Reading happens in two phases so the error says what went wrong:
//! bytes that are not JSON at all become [`CocoMergeError::Parse`], JSON
//! that does not have the COCO shape becomes [`CocoMergeError::Schema`].
//!
//! Writing keeps list order exactly as stored. Unknown per-record fields
//! come out in sorted key order, which keeps repeated writes byte-identical.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use serde_json::Value;

use super::model::CocoDataset;
use crate::error::CocoMergeError;

/// Reads a COCO annotation file.
///
/// # Errors
/// `Io` if the file cannot be opened, `Parse` on malformed JSON, `Schema`
/// when a required key or field is missing or has the wrong type.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use cocomerge::coco::read_coco_json;
///
/// let dataset = read_coco_json(Path::new("annotations.json"))?;
/// # Ok::<(), cocomerge::CocoMergeError>(())
/// ```
pub fn read_coco_json(path: &Path) -> Result<CocoDataset, CocoMergeError> {
    let value: Value = {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            CocoMergeError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?
    };

    from_coco_value(value).map_err(|e| CocoMergeError::schema(path, e.to_string()))
}

/// Builds a dataset from already-parsed JSON.
///
/// Required top-level keys are `images`, `annotations` and `categories`;
/// `info` and `licenses` default to empty when absent.
pub fn from_coco_value(value: Value) -> Result<CocoDataset, serde_json::Error> {
    serde_json::from_value(value)
}

/// Reads a dataset from a COCO JSON string.
///
/// Useful for testing without file I/O.
pub fn from_coco_str(json: &str) -> Result<CocoDataset, serde_json::Error> {
    serde_json::from_str(json)
}

/// Reads a dataset from raw bytes.
pub fn from_coco_slice(bytes: &[u8]) -> Result<CocoDataset, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Serializes a dataset to pretty-printed COCO JSON.
pub fn to_coco_string(dataset: &CocoDataset) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(dataset)
}

/// Serializes a dataset into any writer, followed by a trailing newline.
pub fn write_coco<W: Write>(
    mut writer: W,
    dataset: &CocoDataset,
    path: &Path,
) -> Result<(), CocoMergeError> {
    serde_json::to_writer_pretty(&mut writer, dataset).map_err(|source| {
        CocoMergeError::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
