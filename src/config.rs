//! Configuration types for imsearch-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for [`ImageDownloader`](crate::ImageDownloader) and
/// [`FetchCoordinator`](crate::FetchCoordinator)
///
/// Every field has a default, so an empty JSON object is a valid configuration.
///
/// # Examples
///
/// ```
/// use imsearch_dl::Config;
///
/// let config = Config::from_json_str(r#"{"pipeline": {"thumbnail": {"width": 128}}}"#).unwrap();
/// assert_eq!(config.pipeline.thumbnail.width, 128);
/// assert_eq!(config.pipeline.thumbnail.height, 90);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Result fetching (pagination, deadline)
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Download timeouts and transport settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Filter, conversion and thumbnail settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Completion callback worker pool
    #[serde(default)]
    pub callbacks: CallbackConfig,
}

impl Config {
    /// Parse a JSON configuration document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Check settings that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key when:
    /// - a filter minimum exceeds its maximum
    /// - thumbnail or conversion bounds are zero
    /// - an output format is empty or cannot be encoded by this build
    /// - the thumbnail would be written over the converted image
    /// - the callback worker count is zero
    pub fn validate(&self) -> Result<()> {
        let filter = &self.pipeline.filter;
        if filter.min_width > filter.max_width {
            return Err(config_error(
                "filter.min_width must not exceed filter.max_width",
                "filter.min_width",
            ));
        }
        if filter.min_height > filter.max_height {
            return Err(config_error(
                "filter.min_height must not exceed filter.max_height",
                "filter.min_height",
            ));
        }

        let conversion = &self.pipeline.conversion;
        if conversion.format.trim().is_empty() {
            return Err(config_error(
                "conversion.format must not be empty",
                "conversion.format",
            ));
        }
        if !can_encode(&conversion.format) {
            return Err(config_error(
                &format!("cannot write conversion.format '{}'", conversion.format),
                "conversion.format",
            ));
        }
        if conversion.max_width == 0 || conversion.max_height == 0 {
            return Err(config_error(
                "conversion bounds must be positive",
                "conversion.max_width",
            ));
        }

        let thumbnail = &self.pipeline.thumbnail;
        if thumbnail.format.trim().is_empty() {
            return Err(config_error(
                "thumbnail.format must not be empty",
                "thumbnail.format",
            ));
        }
        if !can_encode(&thumbnail.format) {
            return Err(config_error(
                &format!("cannot write thumbnail.format '{}'", thumbnail.format),
                "thumbnail.format",
            ));
        }
        if thumbnail.width == 0 || thumbnail.height == 0 {
            return Err(config_error(
                "thumbnail dimensions must be positive",
                "thumbnail.width",
            ));
        }
        // The thumbnail name always carries "-{W}x{H}", so it can only collide
        // with the converted image if the conversion suffix spells the same thing.
        let thumb_tail = format!(
            "{}-{}x{}.{}",
            thumbnail.suffix,
            thumbnail.width,
            thumbnail.height,
            thumbnail.format.to_lowercase()
        );
        let clean_tail = format!("{}.{}", conversion.suffix, conversion.format.to_lowercase());
        if conversion.subdir == thumbnail.subdir && thumb_tail == clean_tail {
            return Err(config_error(
                "thumbnail and converted image would share a filename",
                "thumbnail.suffix",
            ));
        }

        if self.callbacks.worker_count == Some(0) {
            return Err(config_error(
                "callbacks.worker_count must be at least 1",
                "callbacks.worker_count",
            ));
        }

        Ok(())
    }
}

/// Whether `format` names an image format this build can encode
fn can_encode(format: &str) -> bool {
    image::ImageFormat::from_extension(format).is_some_and(|f| f.writing_enabled())
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// How the pages of one query are requested
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// All pages in flight at once (default)
    #[default]
    Concurrent,
    /// One page after another, for engines that reject parallel requests
    Sequential,
}

/// Paginated fetch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Deadline for the whole paginated fetch (default: 5 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Concurrent or sequential page requests
    #[serde(default)]
    pub mode: FetchMode,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            mode: FetchMode::default(),
        }
    }
}

/// Download and batch timing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Deadline for a whole `process_urls` batch (default: 5 seconds)
    #[serde(default = "default_batch_timeout", with = "duration_serde")]
    pub batch_timeout: Duration,

    /// Deadline for one item: download, filter, convert, thumbnail (default: 5 seconds)
    #[serde(default = "default_item_timeout", with = "duration_serde")]
    pub item_timeout: Duration,

    /// Timeout of the HTTP request for one image (default: 1 second)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with image requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            batch_timeout: default_batch_timeout(),
            item_timeout: default_item_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Image pipeline settings, shared read-only by every concurrent invocation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Which downloaded images are kept
    #[serde(default)]
    pub filter: FilterSettings,

    /// How kept images are standardized
    #[serde(default)]
    pub conversion: ConversionSettings,

    /// How thumbnails are produced
    #[serde(default)]
    pub thumbnail: ThumbnailSettings,
}

/// Filter policy applied to every downloaded image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Minimum width in pixels, inclusive (default: 1)
    #[serde(default = "default_min_dim")]
    pub min_width: u32,

    /// Minimum height in pixels, inclusive (default: 1)
    #[serde(default = "default_min_dim")]
    pub min_height: u32,

    /// Maximum width in pixels, inclusive (default: 10000)
    #[serde(default = "default_max_dim")]
    pub max_width: u32,

    /// Maximum height in pixels, inclusive (default: 10000)
    #[serde(default = "default_max_dim")]
    pub max_height: u32,

    /// Maximum estimated decoded size, width * height * channels (default: 8 MiB)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Reject known "image unavailable" placeholders (default: false)
    #[serde(default)]
    pub remove_known_placeholder: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_width: default_min_dim(),
            min_height: default_min_dim(),
            max_width: default_max_dim(),
            max_height: default_max_dim(),
            max_size_bytes: default_max_size_bytes(),
            remove_known_placeholder: false,
        }
    }
}

/// Standardized-image output settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Output format, as a file extension (default: "jpg")
    #[serde(default = "default_format")]
    pub format: String,

    /// Appended to the raw file stem (default: "-clean")
    #[serde(default = "default_clean_suffix")]
    pub suffix: String,

    /// Images wider than this are scaled down (default: 10000)
    #[serde(default = "default_max_dim")]
    pub max_width: u32,

    /// Images taller than this are scaled down (default: 10000)
    #[serde(default = "default_max_dim")]
    pub max_height: u32,

    /// Subdirectory of the output directory (default: none)
    #[serde(default)]
    pub subdir: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: default_format(),
            suffix: default_clean_suffix(),
            max_width: default_max_dim(),
            max_height: default_max_dim(),
            subdir: String::new(),
        }
    }
}

/// Thumbnail output settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSettings {
    /// Output format, as a file extension (default: "jpg")
    #[serde(default = "default_format")]
    pub format: String,

    /// Appended to the raw file stem before the dimensions (default: "-thumb")
    #[serde(default = "default_thumb_suffix")]
    pub suffix: String,

    /// Subdirectory of the output directory (default: none)
    #[serde(default)]
    pub subdir: String,

    /// Thumbnail bounding box width (default: 90)
    #[serde(default = "default_thumb_dim")]
    pub width: u32,

    /// Thumbnail bounding box height (default: 90)
    #[serde(default = "default_thumb_dim")]
    pub height: u32,

    /// Centre the scaled image on a canvas of exactly width x height (default: true)
    #[serde(default = "default_true")]
    pub pad_to_size: bool,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            format: default_format(),
            suffix: default_thumb_suffix(),
            subdir: String::new(),
            width: default_thumb_dim(),
            height: default_thumb_dim(),
            pad_to_size: true,
        }
    }
}

/// Completion callback worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Registered callback to run for every processed image (default: none)
    ///
    /// Resolved through a [`CallbackRegistry`](crate::callbacks::CallbackRegistry).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Worker threads (default: available parallelism)
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// How long `process_urls` waits for outstanding callbacks (default: 60 seconds)
    #[serde(default = "default_join_timeout", with = "duration_serde")]
    pub join_timeout: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            name: None,
            worker_count: None,
            join_timeout: default_join_timeout(),
        }
    }
}

impl CallbackConfig {
    /// Worker count to use when none is requested explicitly
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(default_worker_count)
    }
}

/// Number of worker threads matching the machine's available parallelism
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_item_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_join_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_min_dim() -> u32 {
    1
}

fn default_max_dim() -> u32 {
    10_000
}

fn default_max_size_bytes() -> u64 {
    2 * 4 * 1024 * 1024
}

fn default_format() -> String {
    "jpg".to_string()
}

fn default_clean_suffix() -> String {
    "-clean".to_string()
}

fn default_thumb_suffix() -> String {
    "-thumb".to_string()
}

fn default_thumb_dim() -> u32 {
    90
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
