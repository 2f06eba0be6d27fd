//! Header-only acceptance checks for downloaded images

use crate::config::FilterSettings;
use crate::error::{FilterReason, ItemError};
use crate::utils::remove_quietly;
use image::{ImageDecoder, ImageReader};
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of the "this photo is no longer available" image served by Flickr
pub const KNOWN_PLACEHOLDER_SHA256: &str =
    "0f28f49410a89e24c95acfd345210cc6f2294814584ad7c60f698fee74e46aad";

/// Image properties available without decoding pixel data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Colour channels per pixel
    pub channels: u8,
}

impl ImageHeader {
    /// In-memory size estimate: width * height * channels
    pub fn estimated_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.channels)
    }
}

/// Read dimensions and channel count from the file header
pub fn read_header(path: &Path) -> image::ImageResult<ImageHeader> {
    let decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let (width, height) = decoder.dimensions();
    Ok(ImageHeader {
        width,
        height,
        channels: decoder.color_type().channel_count(),
    })
}

/// Apply dimension and size rules to a header
pub fn check_header(header: &ImageHeader, settings: &FilterSettings) -> Result<(), FilterReason> {
    if header.width < settings.min_width {
        return Err(FilterReason::TooNarrow {
            width: header.width,
            min: settings.min_width,
        });
    }
    if header.height < settings.min_height {
        return Err(FilterReason::TooShort {
            height: header.height,
            min: settings.min_height,
        });
    }
    if header.width > settings.max_width {
        return Err(FilterReason::TooWide {
            width: header.width,
            max: settings.max_width,
        });
    }
    if header.height > settings.max_height {
        return Err(FilterReason::TooTall {
            height: header.height,
            max: settings.max_height,
        });
    }
    let bytes = header.estimated_bytes();
    if bytes > settings.max_size_bytes {
        return Err(FilterReason::TooLarge {
            bytes,
            max: settings.max_size_bytes,
        });
    }
    Ok(())
}

/// Lower-case hex SHA-256 of the file content
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether the file content is the known placeholder image
pub fn is_known_placeholder(path: &Path) -> std::io::Result<bool> {
    Ok(sha256_file(path)? == KNOWN_PLACEHOLDER_SHA256)
}

/// Accept or reject the raw file at `path`
///
/// Rejected and undecodable files are deleted before the error is returned.
pub(crate) fn filter_image(path: &Path, settings: &FilterSettings) -> Result<(), ItemError> {
    filter_image_with(path, settings, &[KNOWN_PLACEHOLDER_SHA256])
}

/// [`filter_image`] against an explicit list of placeholder digests
pub(crate) fn filter_image_with(
    path: &Path,
    settings: &FilterSettings,
    placeholder_digests: &[&str],
) -> Result<(), ItemError> {
    let header = match read_header(path) {
        Ok(header) => header,
        Err(e) => {
            remove_quietly(path);
            return Err(ItemError::CorruptImage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let mut verdict = check_header(&header, settings);
    if verdict.is_ok() && settings.remove_known_placeholder {
        verdict = check_placeholder(path, placeholder_digests)?;
    }

    if let Err(reason) = verdict {
        remove_quietly(path);
        return Err(ItemError::Filtered {
            path: path.to_path_buf(),
            reason,
        });
    }
    Ok(())
}

/// Reject the file if its digest is listed; a failed read is an error, not a pass
fn check_placeholder(
    path: &Path,
    placeholder_digests: &[&str],
) -> Result<Result<(), FilterReason>, ItemError> {
    let digest = sha256_file(path).map_err(|e| {
        ItemError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to hash '{}': {}", path.display(), e),
        ))
    })?;
    if placeholder_digests.contains(&digest.as_str()) {
        Ok(Err(FilterReason::Placeholder))
    } else {
        Ok(Ok(()))
    }
}
