//! Core types for imsearch-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// One search result entry as returned by a search back-end
///
/// `image_id` is a stable fingerprint of engine-specific identifying data and is
/// used to derive every output filename for this result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Direct URL of the full-size image
    pub url: String,
    /// Stable identifier used for output filenames
    pub image_id: String,
    /// Result title, when the engine provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 1-based rank within the query, when the engine provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

impl ResultRecord {
    /// Create a record with an explicit image id
    pub fn new(url: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            image_id: image_id.into(),
            title: None,
            rank: None,
        }
    }

    /// Create a record whose image id is the fingerprint of `identifying_data`
    ///
    /// # Examples
    ///
    /// ```
    /// use imsearch_dl::ResultRecord;
    ///
    /// let a = ResultRecord::fingerprinted("https://example.com/cat.jpg", "cat.jpg");
    /// let b = ResultRecord::fingerprinted("https://mirror.example.com/cat.jpg", "cat.jpg");
    /// assert_eq!(a.image_id, b.image_id);
    /// ```
    pub fn fingerprinted(url: impl Into<String>, identifying_data: &str) -> Self {
        Self::new(url, Self::fingerprint(identifying_data))
    }

    /// Lower-case hex MD5 digest of engine identifying data
    pub fn fingerprint(identifying_data: &str) -> String {
        format!("{:x}", md5::compute(identifying_data.as_bytes()))
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the rank
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }
}

/// Transient unit of work for one image pipeline invocation
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// The result being acquired
    pub record: ResultRecord,
    /// Directory receiving the raw image (converted images go to subdirectories of it)
    pub output_dir: PathBuf,
    /// When the task was created, used for `download_time`
    pub started: Instant,
}

impl DownloadTask {
    /// Create a task starting now
    pub fn new(record: ResultRecord, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            record,
            output_dir: output_dir.into(),
            started: Instant::now(),
        }
    }
}

/// A successfully acquired image: the original record enriched with output paths
///
/// Serializes flat, i.e. the record fields sit next to `orig_path`, `clean_path`,
/// `thumb_path` and `download_time`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// The search result this image came from
    #[serde(flatten)]
    pub record: ResultRecord,
    /// Raw file as downloaded
    pub orig_path: PathBuf,
    /// Standardized (converted and size-capped) image
    pub clean_path: PathBuf,
    /// Thumbnail image
    pub thumb_path: PathBuf,
    /// Seconds from task creation to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_time: Option<f64>,
}

/// Classification of a per-item failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or protocol failure
    Transport,
    /// Rejected by the filter policy
    Filtered,
    /// Downloaded bytes are not a decodable image
    CorruptImage,
    /// Per-item or batch deadline exceeded
    Timeout,
    /// Local filesystem failure
    Io,
}

/// Image size class understood by search back-ends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    /// Small images
    Small,
    /// Medium images
    Medium,
    /// Large images
    Large,
}

/// Image style understood by search back-ends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    /// Photographs
    Photo,
    /// Clip art
    Clipart,
    /// Line drawings
    Lineart,
    /// Faces
    Face,
    /// Animated images
    Animated,
}

/// Options for a single query
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Size class filter (default: medium; engine default when `None`)
    #[serde(default = "default_size")]
    pub size: Option<ImageSize>,
    /// Style filter (default: photo; engine default when `None`)
    #[serde(default = "default_style")]
    pub style: Option<ImageStyle>,
    /// Number of results wanted (default: 100)
    #[serde(default = "default_num_results")]
    pub num_results: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            size: default_size(),
            style: default_style(),
            num_results: default_num_results(),
        }
    }
}

fn default_size() -> Option<ImageSize> {
    Some(ImageSize::Medium)
}

fn default_style() -> Option<ImageStyle> {
    Some(ImageStyle::Photo)
}

fn default_num_results() -> usize {
    100
}

/// Events emitted by [`ImageDownloader`](crate::ImageDownloader) while a batch runs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An image made it through the whole pipeline
    ImageProcessed {
        /// Result image id
        image_id: String,
        /// Standardized image path
        clean_path: PathBuf,
        /// Thumbnail path
        thumb_path: PathBuf,
    },

    /// An image failed and was skipped
    ImageFailed {
        /// Result image id
        image_id: String,
        /// Source URL
        url: String,
        /// Failure class
        kind: FailureKind,
        /// Error message
        error: String,
    },

    /// A processed image could not be handed to the callback dispatcher
    CallbackRejected {
        /// Result image id
        image_id: String,
        /// Dispatcher error message
        error: String,
    },

    /// A batch finished (normally or by timeout)
    BatchComplete {
        /// Number of images processed successfully
        processed: usize,
        /// Number of items that failed
        failed: usize,
        /// Whether the batch deadline expired with work outstanding
        timed_out: bool,
    },
}
