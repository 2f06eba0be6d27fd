//! Shared test helpers: synthetic images and ready-made downloaders.

use crate::config::Config;
use crate::downloader::ImageDownloader;
use crate::types::{ProcessedImage, ResultRecord};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// PNG-encoded gradient image of the given size
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Bytes that look like the start of a JPEG but are not an image
pub(crate) fn corrupt_bytes() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(b"definitely not image data");
    bytes
}

/// A processed image with plausible paths that need not exist
pub(crate) fn sample_image(image_id: &str) -> ProcessedImage {
    let dir = PathBuf::from("/tmp/imsearch-test");
    ProcessedImage {
        record: ResultRecord::new(format!("https://img.example.com/{image_id}.jpg"), image_id),
        orig_path: dir.join(format!("{image_id}.jpg")),
        clean_path: dir.join(format!("{image_id}-clean.jpg")),
        thumb_path: dir.join(format!("{image_id}-thumb-90x90.jpg")),
        download_time: Some(0.1),
    }
}

/// Test configuration: PNG outputs, generous item timeouts, two callback workers
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.conversion.format = "png".to_string();
    config.pipeline.thumbnail.format = "png".to_string();
    config.download.batch_timeout = Duration::from_secs(10);
    config.download.item_timeout = Duration::from_secs(5);
    config.download.request_timeout = Duration::from_secs(2);
    config.callbacks.worker_count = Some(2);
    config.callbacks.join_timeout = Duration::from_secs(10);
    config
}

/// Helper to create a test ImageDownloader and an output directory.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) fn create_test_downloader() -> (ImageDownloader, TempDir) {
    create_test_downloader_with(test_config())
}

/// Same as [`create_test_downloader`] with a caller-supplied configuration
pub(crate) fn create_test_downloader_with(config: Config) -> (ImageDownloader, TempDir) {
    let temp_dir = tempdir().unwrap();
    let downloader = ImageDownloader::new(config).unwrap();
    (downloader, temp_dir)
}
