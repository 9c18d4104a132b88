//! Image utility functions

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::DynamicImage;
use uuid::Uuid;

use crate::dataset::ImageFormat;

/// Encode image to JPEG bytes
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.to_rgb8().write_to(&mut buffer, image::ImageFormat::Jpeg)?;
    Ok(buffer.into_inner())
}

/// Encode image to PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Persist an uploaded image under a random name with the extension of its sniffed format
pub async fn save_upload(dir: &Path, data: &[u8], format: ImageFormat) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", Uuid::new_v4().simple(), format.extension()));
    tokio::fs::write(&path, data).await?;
    Ok(path)
}
