#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// A tiny but valid 24-bit BMP, so copied files are real images.
pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixels = row_stride * height;
    let file_size = 54 + pixels;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&54u32.to_le_bytes());
    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&pixels.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&[0; 8]);
    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// One image record: `(id, file_name)`.
pub type ImageSpec<'a> = (u64, &'a str);
/// One category record: `(id, name)`.
pub type CategorySpec<'a> = (u64, &'a str);
/// One annotation record: `(id, image_id, category_id)`.
pub type AnnotationSpec = (u64, u64, u64);

pub fn coco_json(
    images: &[ImageSpec],
    categories: &[CategorySpec],
    annotations: &[AnnotationSpec],
) -> Value {
    json!({
        "info": {"description": "fixture", "version": "1.0"},
        "licenses": [],
        "images": images
            .iter()
            .map(|(id, name)| json!({"id": id, "file_name": name, "width": 8, "height": 6}))
            .collect::<Vec<_>>(),
        "categories": categories
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name, "supercategory": "thing"}))
            .collect::<Vec<_>>(),
        "annotations": annotations
            .iter()
            .map(|(id, image_id, category_id)| json!({
                "id": id,
                "image_id": image_id,
                "category_id": category_id,
                "bbox": [1.0, 1.0, 2.0, 2.0],
                "area": 4.0,
                "iscrowd": 0
            }))
            .collect::<Vec<_>>(),
    })
}

/// Writes `annotations.json` plus one BMP per image under `images/`.
pub fn write_dataset(root: &Path, document: &Value) -> PathBuf {
    fs::create_dir_all(root.join("images")).expect("create images dir");
    fs::write(
        root.join("annotations.json"),
        serde_json::to_string_pretty(document).expect("serialize fixture"),
    )
    .expect("write annotations");

    if let Some(images) = document["images"].as_array() {
        for image in images {
            let name = image["file_name"].as_str().expect("file_name");
            write_bmp(&root.join("images").join(name), 8, 6);
        }
    }
    root.to_path_buf()
}

/// Dataset A of the documented dog scenario.
pub fn dog_dataset_a(root: &Path) -> PathBuf {
    write_dataset(
        root,
        &coco_json(&[(1, "a1.bmp"), (2, "a2.bmp")], &[(5, "dog")], &[(1, 1, 5)]),
    )
}

/// Dataset B of the documented dog scenario.
pub fn dog_dataset_b(root: &Path) -> PathBuf {
    write_dataset(
        root,
        &coco_json(&[(1, "b1.bmp")], &[(7, "dog")], &[(1, 1, 7)]),
    )
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read json")).expect("parse json")
}
