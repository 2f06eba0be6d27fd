//! Output filenames for one result record

use crate::config::{ConversionSettings, PipelineSettings, ThumbnailSettings};
use crate::types::ResultRecord;
use crate::utils::extension_from_url;
use std::path::{Path, PathBuf};

/// Where each artifact of one record lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    /// Raw download: `{output_dir}/{image_id}{ext}`
    pub raw: PathBuf,
    /// Standardized image
    pub clean: PathBuf,
    /// Thumbnail
    pub thumb: PathBuf,
}

impl OutputPaths {
    /// Derive every output path for `record` under `output_dir`
    ///
    /// Names depend only on the record and the settings, so re-running with
    /// unchanged settings finds the previous outputs and changed settings
    /// never overwrite them.
    ///
    /// # Examples
    ///
    /// ```
    /// use imsearch_dl::config::PipelineSettings;
    /// use imsearch_dl::pipeline::OutputPaths;
    /// use imsearch_dl::ResultRecord;
    /// use std::path::Path;
    ///
    /// let record = ResultRecord::new("https://example.com/cat.png?s=1", "abc123");
    /// let paths = OutputPaths::new(Path::new("/out"), &record, &PipelineSettings::default());
    ///
    /// assert_eq!(paths.raw, Path::new("/out/abc123.png"));
    /// assert_eq!(paths.clean, Path::new("/out/abc123-clean.jpg"));
    /// assert_eq!(paths.thumb, Path::new("/out/abc123-thumb-90x90.jpg"));
    /// ```
    pub fn new(output_dir: &Path, record: &ResultRecord, settings: &PipelineSettings) -> Self {
        let stem = record.image_id.as_str();
        Self {
            raw: output_dir.join(format!("{stem}{}", extension_from_url(&record.url))),
            clean: clean_path(output_dir, stem, &settings.conversion),
            thumb: thumb_path(output_dir, stem, &settings.thumbnail),
        }
    }
}

fn clean_path(output_dir: &Path, stem: &str, conversion: &ConversionSettings) -> PathBuf {
    let name = format!(
        "{stem}{}.{}",
        conversion.suffix,
        conversion.format.to_lowercase()
    );
    in_subdir(output_dir, &conversion.subdir).join(name)
}

fn thumb_path(output_dir: &Path, stem: &str, thumbnail: &ThumbnailSettings) -> PathBuf {
    let name = format!(
        "{stem}{}-{}x{}.{}",
        thumbnail.suffix,
        thumbnail.width,
        thumbnail.height,
        thumbnail.format.to_lowercase()
    );
    in_subdir(output_dir, &thumbnail.subdir).join(name)
}

fn in_subdir(output_dir: &Path, subdir: &str) -> PathBuf {
    if subdir.is_empty() {
        output_dir.to_path_buf()
    } else {
        output_dir.join(subdir)
    }
}
