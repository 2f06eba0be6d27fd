//! Decoding, resizing and encoding
//!
//! Everything here is CPU bound and called from the blocking pool.

use crate::config::ThumbnailSettings;
use crate::error::ItemError;
use crate::utils::PartialFile;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::path::Path;

/// Dimensions that fit `width x height` inside `max_width x max_height`
///
/// Returns `None` when the image already fits; images are never enlarged.
/// The aspect ratio is kept and each side is at least one pixel.
///
/// # Examples
///
/// ```
/// use imsearch_dl::pipeline::fit_within;
///
/// assert_eq!(fit_within(200, 100, 90, 90), Some((90, 45)));
/// assert_eq!(fit_within(50, 40, 90, 90), None);
/// ```
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> Option<(u32, u32)> {
    let scale_w = f64::from(max_width) / f64::from(width.max(1));
    let scale_h = f64::from(max_height) / f64::from(height.max(1));
    let scale = scale_w.min(scale_h);
    if scale >= 1.0 {
        return None;
    }
    let new_width = ((f64::from(width) * scale) as u32).max(1);
    let new_height = ((f64::from(height) * scale) as u32).max(1);
    Some((new_width, new_height))
}

/// Scale `image` down to fit the bounds, or return it unchanged
pub fn downsize_to_fit(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    match fit_within(image.width(), image.height(), max_width, max_height) {
        Some((width, height)) => image.resize_exact(width, height, FilterType::Lanczos3),
        None => image,
    }
}

/// Build a thumbnail from the full-size image
///
/// With `pad_to_size` the scaled image is centred on a black canvas of exactly
/// `width x height`; otherwise the scaled image itself is returned.
pub fn create_thumbnail(image: &DynamicImage, settings: &ThumbnailSettings) -> DynamicImage {
    let resized = downsize_to_fit(image.clone(), settings.width, settings.height);
    if !settings.pad_to_size {
        return resized;
    }

    let mut canvas = RgbImage::new(settings.width, settings.height);
    let x = settings.width.saturating_sub(resized.width()) / 2;
    let y = settings.height.saturating_sub(resized.height()) / 2;
    image::imageops::overlay(&mut canvas, &resized.to_rgb8(), i64::from(x), i64::from(y));
    DynamicImage::ImageRgb8(canvas)
}

/// Decode the raw file as RGB
///
/// An undecodable file is removed and reported as [`ItemError::CorruptImage`].
pub(crate) fn load_rgb(path: &Path) -> Result<DynamicImage, ItemError> {
    let decoded = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| {
            crate::utils::remove_quietly(path);
            ItemError::CorruptImage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    Ok(DynamicImage::ImageRgb8(decoded.to_rgb8()))
}

/// Encode `image` as `format` and move it atomically to `dest`
pub(crate) fn save_image(image: &DynamicImage, dest: &Path, format: &str) -> Result<(), ItemError> {
    let image_format = ImageFormat::from_extension(format).ok_or_else(|| {
        ItemError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsupported output format '{format}'"),
        ))
    })?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let partial = PartialFile::new(dest);
    image
        .save_with_format(partial.path(), image_format)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => ItemError::Io(io),
            other => ItemError::Io(std::io::Error::other(format!(
                "failed to encode {}: {other}",
                dest.display()
            ))),
        })?;
    partial.commit()?;
    Ok(())
}
