// Copyright 2023 Remi Bernotavicius

use crate::error::{AppError, AppResult};
use image::ImageFormat;
use std::io;
use std::path::{Component, Path, PathBuf};

const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

const MAX_DIMENSION: u32 = 8192;

/// Uploaded images on local disk. Paths handed out are relative to the root
/// and are what gets stored in the database.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let path = Path::new(relative);
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(AppError::BadRequest(format!(
                "invalid storage path {relative:?}"
            )));
        }
        Ok(self.root.join(path))
    }

    /// Checks `bytes` is an image we accept and writes it under `dir`.
    pub fn store(&self, dir: &str, bytes: &[u8]) -> AppResult<String> {
        let format = image::guess_format(bytes)
            .ok()
            .filter(|f| ACCEPTED_FORMATS.contains(f))
            .ok_or_else(|| {
                AppError::field("image", "format", "画像はPNG・JPEG・GIF・WebPのみ対応しています")
            })?;

        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|_| AppError::field("image", "corrupt", "画像を読み込めませんでした"))?;
        if decoded.width() > MAX_DIMENSION || decoded.height() > MAX_DIMENSION {
            return Err(AppError::field("image", "dimensions", "画像が大きすぎます"));
        }

        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let relative = format!("{dir}/{:016x}.{extension}", rand::random::<u64>());
        let path = self.resolve(&relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        log::info!("stored {} bytes at {relative}", bytes.len());
        Ok(relative)
    }

    pub fn delete(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub fn test_png() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([255, 128, 0]));
    let mut bytes = io::Cursor::new(vec![]);
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

#[test]
fn store_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path()).unwrap();

    let path = storage.store("recipes", &test_png()).unwrap();
    assert!(path.starts_with("recipes/"));
    assert!(path.ends_with(".png"));
    assert!(dir.path().join(&path).exists());

    storage.delete(&path).unwrap();
    assert!(!dir.path().join(&path).exists());

    // already gone
    storage.delete(&path).unwrap();
}

#[test]
fn rejects_non_images() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path()).unwrap();

    let error = storage.store("users", b"#!/bin/sh\necho hi\n").unwrap_err();
    assert!(matches!(error, AppError::Validation(_)));
}

#[test]
fn rejects_paths_outside_root() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path()).unwrap();

    assert!(storage.delete("../etc/passwd").is_err());
    assert!(storage.delete("/etc/passwd").is_err());
}
