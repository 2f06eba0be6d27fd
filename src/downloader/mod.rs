//! Acquisition orchestrator
//!
//! [`ImageDownloader`] runs the image pipeline for a whole batch of result
//! records concurrently and feeds successes to the completion callback
//! dispatcher:
//! - `batch` - `process_urls` fan-out/fan-in with the batch deadline

mod batch;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use batch::{BatchReport, ProcessOptions};

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::ImagePipeline;
use crate::types::Event;
use std::sync::Arc;

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Batch image downloader (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ImageDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Per-item pipeline shared by every concurrent invocation
    pub(crate) pipeline: Arc<ImagePipeline>,
}

impl ImageDownloader {
    /// Create a new ImageDownloader
    ///
    /// Validates the configuration and builds the shared HTTP client.
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) for invalid settings,
    /// [`Error::Network`](crate::Error::Network) if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pipeline = ImagePipeline::new(Arc::new(config.pipeline.clone()), &config.download)?;

        tracing::debug!(
            batch_timeout = ?config.download.batch_timeout,
            item_timeout = ?config.download.item_timeout,
            "image downloader initialized"
        );

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        })
    }

    /// Subscribe to batch events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imsearch_dl::{Config, ImageDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = ImageDownloader::new(Config::default())?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "image event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The shared image pipeline
    pub fn pipeline(&self) -> &Arc<ImagePipeline> {
        &self.pipeline
    }

    /// Emit an event to all subscribers
    ///
    /// Events are dropped silently when nobody is subscribed.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
