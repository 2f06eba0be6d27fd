//! Per-item image pipeline
//!
//! [`ImagePipeline::process`] takes one [`DownloadTask`] through four steps:
//! - download the raw file (skipped if present)
//! - filter on header-only properties, deleting rejects
//! - write the standardized image (skipped if present)
//! - write the thumbnail (skipped if present)
//!
//! Every failure is an [`ItemError`] scoped to that item. Decoding and encoding
//! run on the blocking pool so concurrent downloads keep making progress.

mod download;
mod filter;
mod naming;
mod transform;

pub use filter::{
    ImageHeader, KNOWN_PLACEHOLDER_SHA256, check_header, is_known_placeholder, read_header,
    sha256_file,
};
pub use naming::OutputPaths;
pub use transform::{create_thumbnail, downsize_to_fit, fit_within};

use crate::config::{DownloadConfig, PipelineSettings};
use crate::error::{ItemError, Result};
use crate::types::{DownloadTask, ProcessedImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::debug;

type ItemResult<T> = std::result::Result<T, ItemError>;

/// One lock per raw output path currently being processed
type PathLocks = Mutex<HashMap<PathBuf, Weak<tokio::sync::Mutex<()>>>>;

/// Downloads and standardizes single images
///
/// Cheap to share: hold it in an `Arc` and call [`process`](Self::process)
/// from as many tasks as needed. Tasks for the same output files (records
/// sharing an `image_id`) run one after another; the later ones find the
/// finished files and skip the work.
pub struct ImagePipeline {
    client: reqwest::Client,
    settings: Arc<PipelineSettings>,
    item_timeout: Duration,
    in_flight: PathLocks,
}

impl ImagePipeline {
    /// Create a pipeline with its own HTTP client
    ///
    /// The client sends `download.user_agent` and bounds each request by
    /// `download.request_timeout`; `download.item_timeout` bounds each call to
    /// [`process`](Self::process).
    pub fn new(settings: Arc<PipelineSettings>, download: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(download.user_agent.as_str())
            .timeout(download.request_timeout)
            .build()?;
        Ok(Self {
            client,
            settings,
            item_timeout: download.item_timeout,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Settings shared by every invocation
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the whole pipeline for one task, bounded by the item timeout
    pub async fn process(&self, task: DownloadTask) -> ItemResult<ProcessedImage> {
        let url = task.record.url.clone();
        match tokio::time::timeout(self.item_timeout, self.run(task)).await {
            Ok(result) => result,
            Err(_) => Err(ItemError::Timeout {
                url,
                after: self.item_timeout,
            }),
        }
    }

    async fn run(&self, task: DownloadTask) -> ItemResult<ProcessedImage> {
        let paths = OutputPaths::new(&task.output_dir, &task.record, &self.settings);

        // Held until the blocking work below is done, even if this future is dropped
        let guard = Arc::new(self.path_lock(&paths.raw).lock_owned().await);

        download::download_image(&self.client, &task.record.url, &paths.raw).await?;

        let settings = Arc::clone(&self.settings);
        let blocking_paths = paths.clone();
        let blocking_guard = Arc::clone(&guard);
        tokio::task::spawn_blocking(move || {
            let _held = blocking_guard;
            standardize(&blocking_paths, &settings)
        })
        .await
        .map_err(|e| ItemError::Io(std::io::Error::other(format!("image worker failed: {e}"))))??;

        let download_time = task.started.elapsed().as_secs_f64();
        debug!(
            image_id = %task.record.image_id,
            clean = ?paths.clean,
            thumb = ?paths.thumb,
            download_time,
            "image processed"
        );

        Ok(ProcessedImage {
            record: task.record,
            orig_path: paths.raw,
            clean_path: paths.clean,
            thumb_path: paths.thumb,
            download_time: Some(download_time),
        })
    }

    /// Lock shared by every task writing `path`
    fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = locks.get(path).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }
}

/// Filter the raw file, then write whichever derived images are missing
fn standardize(paths: &OutputPaths, settings: &PipelineSettings) -> ItemResult<()> {
    filter::filter_image(&paths.raw, &settings.filter)?;

    let need_clean = !paths.clean.exists();
    let need_thumb = !paths.thumb.exists();
    if !need_clean && !need_thumb {
        debug!(path = ?paths.clean, "derived images already present");
        return Ok(());
    }

    let image = transform::load_rgb(&paths.raw)?;

    if need_clean {
        let conversion = &settings.conversion;
        let clean =
            transform::downsize_to_fit(image.clone(), conversion.max_width, conversion.max_height);
        transform::save_image(&clean, &paths.clean, &conversion.format)?;
    }

    if need_thumb {
        let thumbnail = transform::create_thumbnail(&image, &settings.thumbnail);
        transform::save_image(&thumbnail, &paths.thumb, &settings.thumbnail.format)?;
    }

    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
