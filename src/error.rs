//! Error types for imsearch-dl
//!
//! Errors come in two tiers:
//! - [`Error`] is returned from the public entry points (`fetch`, `process_urls`,
//!   dispatcher construction, configuration loading).
//! - [`ItemError`] describes why a single result item failed inside the image
//!   pipeline. Item errors are isolated: they are logged, reported through events
//!   and converted into dispatcher skips, but never abort a batch.

use crate::types::FailureKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for imsearch-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for imsearch-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "thumbnail.width")
        key: Option<String>,
    },

    /// Invalid call input (e.g. an empty batch of result records)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A query option the search engine does not support
    #[error("unsupported {kind} '{value}'")]
    Unsupported {
        /// What kind of option was rejected ("size", "style")
        kind: &'static str,
        /// The rejected value
        value: String,
    },

    /// No completion callback registered under the requested name
    #[error("no completion callback named '{name}' (available: {})", available.join(", "))]
    UnknownCallback {
        /// The requested callback name
        name: String,
        /// Names that are registered
        available: Vec<String>,
    },

    /// Callback dispatcher error
    #[error("callback dispatcher error: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a single result item could not be turned into a [`ProcessedImage`](crate::types::ProcessedImage)
#[derive(Debug, Error)]
pub enum ItemError {
    /// Network or protocol failure while downloading the image
    #[error("transport error for {url}: {reason}")]
    Transport {
        /// The image URL
        url: String,
        /// What went wrong (connection refused, HTTP status, timeout, ...)
        reason: String,
    },

    /// The downloaded image failed the filter policy (raw file removed)
    #[error("filtered out {path}: {reason}")]
    Filtered {
        /// The raw file that was rejected
        path: PathBuf,
        /// Which rule rejected it
        reason: FilterReason,
    },

    /// The downloaded file could not be decoded as an image (raw file removed)
    #[error("corrupt image {path}: {reason}")]
    CorruptImage {
        /// The raw file that could not be decoded
        path: PathBuf,
        /// Decoder error message
        reason: String,
    },

    /// The per-item deadline expired before processing finished
    #[error("processing {url} abandoned after {after:?}")]
    Timeout {
        /// The image URL
        url: String,
        /// The deadline that was exceeded
        after: Duration,
    },

    /// Local filesystem error while writing or converting the image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ItemError {
    /// Classify this error for events and reports
    pub fn kind(&self) -> FailureKind {
        match self {
            ItemError::Transport { .. } => FailureKind::Transport,
            ItemError::Filtered { .. } => FailureKind::Filtered,
            ItemError::CorruptImage { .. } => FailureKind::CorruptImage,
            ItemError::Timeout { .. } => FailureKind::Timeout,
            ItemError::Io(_) => FailureKind::Io,
        }
    }
}

/// Filter rule that rejected an image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterReason {
    /// Narrower than `filter.min_width`
    #[error("width {width} < min_width {min}")]
    TooNarrow {
        /// Image width
        width: u32,
        /// Configured minimum
        min: u32,
    },

    /// Shorter than `filter.min_height`
    #[error("height {height} < min_height {min}")]
    TooShort {
        /// Image height
        height: u32,
        /// Configured minimum
        min: u32,
    },

    /// Wider than `filter.max_width`
    #[error("width {width} > max_width {max}")]
    TooWide {
        /// Image width
        width: u32,
        /// Configured maximum
        max: u32,
    },

    /// Taller than `filter.max_height`
    #[error("height {height} > max_height {max}")]
    TooTall {
        /// Image height
        height: u32,
        /// Configured maximum
        max: u32,
    },

    /// Estimated decoded size exceeds `filter.max_size_bytes`
    #[error("estimated size {bytes} bytes > max_size_bytes {max}")]
    TooLarge {
        /// Estimated in-memory size (width * height * channels)
        bytes: u64,
        /// Configured maximum
        max: u64,
    },

    /// Content hash matches a known "image unavailable" placeholder
    #[error("known placeholder image")]
    Placeholder,
}

/// Callback dispatcher errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The dispatcher no longer accepts work (join requested or terminated)
    #[error("dispatcher is {state}, not accepting tasks")]
    Closed {
        /// Current lifecycle state
        state: crate::callbacks::DispatcherState,
    },

    /// Every slot of the task counter has already been submitted or skipped
    #[error("all {capacity} task slots already accounted for")]
    Exhausted {
        /// Number of tasks the dispatcher was created for
        capacity: usize,
    },

    /// Failed to start a worker thread
    #[error("failed to spawn callback worker: {0}")]
    Spawn(std::io::Error),
}
