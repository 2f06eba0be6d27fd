//! Batch processing: one pipeline invocation per result record

use super::ImageDownloader;
use crate::callbacks::{CallbackDispatcher, CallbackRegistry, CompletionCallback, JoinOutcome};
use crate::config::CallbackConfig;
use crate::error::{Error, Result};
use crate::types::{DownloadTask, Event, FailureKind, ProcessedImage, ResultRecord};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-call options for [`ImageDownloader::process_urls`]
#[derive(Clone, Default)]
pub struct ProcessOptions {
    /// Run for every successfully processed image
    pub callback: Option<Arc<dyn CompletionCallback>>,
    /// Callback worker threads (default: `callbacks.worker_count` from the config)
    pub worker_count: Option<usize>,
    /// Passed unchanged to every callback invocation
    pub extra_params: Option<serde_json::Value>,
}

impl ProcessOptions {
    /// Options running `callback`
    pub fn with_callback(callback: Arc<dyn CompletionCallback>) -> Self {
        Self {
            callback: Some(callback),
            ..Default::default()
        }
    }

    /// Options for the callback named in `config`, looked up in `registry`
    ///
    /// # Errors
    ///
    /// [`Error::UnknownCallback`] if the configured name is not registered.
    pub fn from_registry(registry: &CallbackRegistry, config: &CallbackConfig) -> Result<Self> {
        Ok(Self {
            callback: registry.resolve(config)?,
            worker_count: config.worker_count,
            extra_params: None,
        })
    }

    /// Set the callback worker count
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Set the extra parameters handed to the callback
    pub fn extra_params(mut self, params: serde_json::Value) -> Self {
        self.extra_params = Some(params);
        self
    }
}

impl std::fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("callback", &self.callback.is_some())
            .field("worker_count", &self.worker_count)
            .field("extra_params", &self.extra_params)
            .finish()
    }
}

/// Everything known about a finished batch
#[derive(Clone, Debug)]
pub struct BatchReport {
    /// Successfully processed images, in completion order
    pub images: Vec<ProcessedImage>,
    /// Items whose pipeline failed
    pub failed: usize,
    /// Items still running when the batch deadline expired
    pub abandoned: usize,
    /// Whether the batch deadline expired
    pub timed_out: bool,
    /// How the callback dispatcher finished, if a callback was given
    pub callbacks: Option<JoinOutcome>,
}

impl ImageDownloader {
    /// Download and standardize every result, returning those that succeeded
    ///
    /// Items run concurrently; failures (network, filter, corrupt data, item
    /// timeout) only remove that item from the output. The call returns once
    /// every item finished or `download.batch_timeout` expired, and, when a
    /// callback is given, after the callbacks were joined.
    ///
    /// Output order is completion order.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty `results` list
    /// - [`Error::Io`] if `output_dir` cannot be created
    /// - [`Error::Dispatcher`] if callback workers cannot be started
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imsearch_dl::{Config, ImageDownloader, ProcessOptions, ResultRecord};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let downloader = ImageDownloader::new(Config::default())?;
    /// let results = vec![ResultRecord::fingerprinted("https://example.com/cat.jpg", "cat.jpg")];
    ///
    /// let images = downloader
    ///     .process_urls(results, "/tmp/images", ProcessOptions::default())
    ///     .await?;
    /// for image in images {
    ///     println!("{}", image.thumb_path.display());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process_urls(
        &self,
        results: Vec<ResultRecord>,
        output_dir: impl AsRef<Path>,
        options: ProcessOptions,
    ) -> Result<Vec<ProcessedImage>> {
        Ok(self
            .process_urls_with_report(results, output_dir, options)
            .await?
            .images)
    }

    /// Like [`process_urls`](Self::process_urls), with failure counts and the callback outcome
    pub async fn process_urls_with_report(
        &self,
        results: Vec<ResultRecord>,
        output_dir: impl AsRef<Path>,
        options: ProcessOptions,
    ) -> Result<BatchReport> {
        if results.is_empty() {
            return Err(Error::InvalidInput(
                "no result records to process".to_string(),
            ));
        }

        let output_dir = output_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create output directory '{}': {}",
                    output_dir.display(),
                    e
                ),
            ))
        })?;

        let total = results.len();

        // The dispatcher exists before any item can finish
        let dispatcher = match &options.callback {
            Some(callback) => {
                let workers = options
                    .worker_count
                    .unwrap_or_else(|| self.config.callbacks.effective_worker_count());
                Some(Arc::new(CallbackDispatcher::new(
                    Arc::clone(callback),
                    total,
                    workers,
                )?))
            }
            None => None,
        };

        info!(
            items = total,
            output_dir = ?output_dir,
            callback = dispatcher.is_some(),
            "processing batch"
        );

        let deadline = Instant::now() + self.config.download.batch_timeout;
        let mut set = JoinSet::new();
        for record in results {
            let downloader = self.clone();
            let dispatcher = dispatcher.clone();
            let extra_params = options.extra_params.clone();
            let task = DownloadTask::new(record, output_dir.clone());
            set.spawn(async move {
                downloader
                    .process_item(task, dispatcher.as_deref(), extra_params)
                    .await
            });
        }

        let mut images = Vec::with_capacity(total);
        let mut failed = 0;
        let mut abandoned = 0;
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(Some(image)))) => images.push(image),
                Ok(Some(Ok(None))) => failed += 1,
                Ok(Some(Err(join_err))) => {
                    failed += 1;
                    warn!(error = %join_err, "image task panicked");
                    // The task never reached its own submit/skip
                    if let Some(dispatcher) = &dispatcher
                        && let Err(e) = dispatcher.skip()
                    {
                        warn!(error = %e, "failed to skip callback for panicked task");
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    abandoned = set.len();
                    warn!(
                        outstanding = abandoned,
                        timeout = ?self.config.download.batch_timeout,
                        "batch deadline expired, abandoning remaining images"
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        let callbacks = match &dispatcher {
            Some(dispatcher) if timed_out => {
                dispatcher.terminate();
                Some(JoinOutcome::ForcedTermination {
                    remaining: dispatcher.remaining(),
                })
            }
            Some(dispatcher) => Some(dispatcher.join(self.config.callbacks.join_timeout).await),
            None => None,
        };

        info!(
            processed = images.len(),
            failed,
            abandoned,
            timed_out,
            callbacks = ?callbacks,
            "batch complete"
        );
        self.emit_event(Event::BatchComplete {
            processed: images.len(),
            failed,
            timed_out,
        });

        Ok(BatchReport {
            images,
            failed,
            abandoned,
            timed_out,
            callbacks,
        })
    }

    /// Run the pipeline for one task and account for it with the dispatcher
    async fn process_item(
        &self,
        task: DownloadTask,
        dispatcher: Option<&CallbackDispatcher>,
        extra_params: Option<serde_json::Value>,
    ) -> Option<ProcessedImage> {
        let image_id = task.record.image_id.clone();
        let url = task.record.url.clone();

        match self.pipeline.process(task).await {
            Ok(image) => {
                if let Some(dispatcher) = dispatcher
                    && let Err(e) = dispatcher.submit(image.clone(), extra_params)
                {
                    warn!(image_id = %image_id, error = %e, "could not queue completion callback");
                    self.emit_event(Event::CallbackRejected {
                        image_id: image_id.clone(),
                        error: e.to_string(),
                    });
                }
                self.emit_event(Event::ImageProcessed {
                    image_id,
                    clean_path: image.clean_path.clone(),
                    thumb_path: image.thumb_path.clone(),
                });
                Some(image)
            }
            Err(e) => {
                let kind = e.kind();
                if kind == FailureKind::Filtered {
                    debug!(image_id = %image_id, reason = %e, "image filtered out");
                } else {
                    warn!(image_id = %image_id, url = %url, error = %e, "image failed");
                }
                if let Some(dispatcher) = dispatcher
                    && let Err(skip_err) = dispatcher.skip()
                {
                    warn!(image_id = %image_id, error = %skip_err, "could not skip completion callback");
                }
                self.emit_event(Event::ImageFailed {
                    image_id,
                    url,
                    kind,
                    error: e.to_string(),
                });
                None
            }
        }
    }
}
