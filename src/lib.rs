//! # imsearch-dl
//!
//! Acquisition half of an image search client: fetch result pages from an
//! offset-paginated search engine, download every hit, standardize it into a
//! clean image plus a fixed-size thumbnail, and hand each finished image to a
//! completion callback.
//!
//! ## Overview
//!
//! - [`FetchCoordinator`] turns "N results for this query" into page requests
//!   against any [`OffsetFetcher`], concurrently or one after another, under
//!   a single deadline.
//! - [`ImagePipeline`] downloads, filters, converts and thumbnails one image.
//! - [`ImageDownloader`] runs the pipeline over a batch, feeds a bounded
//!   [`CallbackDispatcher`], and broadcasts [`Event`]s.
//!
//! ## Quick Start
//!
//! ```no_run
//! use imsearch_dl::{Config, ImageDownloader, ProcessOptions, ResultRecord};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = ImageDownloader::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let results = vec![
//!         ResultRecord::fingerprinted("https://example.com/a.jpg", "a.jpg"),
//!         ResultRecord::fingerprinted("https://example.com/b.png", "b.png"),
//!     ];
//!     let options = ProcessOptions::with_callback(Arc::new(
//!         |image: &imsearch_dl::ProcessedImage, _: Option<&serde_json::Value>| -> imsearch_dl::CallbackResult {
//!             println!("ready: {}", image.thumb_path.display());
//!             Ok(())
//!         },
//!     ));
//!
//!     let images = downloader.process_urls(results, "/tmp/images", options).await?;
//!     println!("{} images processed", images.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Completion callbacks and the bounded dispatcher that runs them
pub mod callbacks;
/// Configuration types
pub mod config;
/// Batch processing entry point
pub mod downloader;
/// Error types
pub mod error;
/// Offset-paginated result fetching
pub mod fetch;
/// Per-image download and standardization
pub mod pipeline;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use callbacks::{
    CallbackDispatcher, CallbackRegistry, CallbackResult, CompletionCallback, JoinOutcome,
    JsonLinesLog, ScriptCallback,
};
pub use config::{CallbackConfig, Config, DownloadConfig, FetchConfig, FetchMode};
pub use downloader::{BatchReport, ImageDownloader, ProcessOptions};
pub use error::{DispatcherError, Error, FilterReason, ItemError, Result};
pub use fetch::{EngineProfile, FetchCoordinator, OffsetFetcher, PageParams};
pub use pipeline::ImagePipeline;
pub use types::{
    DownloadTask, Event, FailureKind, ImageSize, ImageStyle, ProcessedImage, QueryOptions,
    ResultRecord,
};
