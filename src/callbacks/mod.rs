//! Completion callbacks and the worker pool that runs them
//!
//! - [`CompletionCallback`] - what runs for every processed image
//! - [`CallbackDispatcher`] - bounded OS-thread pool with exact-once task accounting
//! - [`CallbackRegistry`] - name → callback lookup for configuration-driven setups
//! - [`JsonLinesLog`], [`ScriptCallback`] - built-in callbacks
//!
//! Callbacks are synchronous and may block; they never run on the async runtime.

mod builtin;
mod dispatcher;
mod registry;

pub use builtin::{JsonLinesLog, ScriptCallback};
pub use dispatcher::{
    CallbackDispatcher, CallbackJob, DispatcherState, DispatcherStats, JoinOutcome,
};
pub use registry::CallbackRegistry;

use crate::types::ProcessedImage;

/// Outcome of one callback invocation
///
/// Errors are logged and counted by the dispatcher; they never reach the batch.
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// User code invoked once per successfully processed image
///
/// Any `Fn(&ProcessedImage, Option<&serde_json::Value>) -> CallbackResult` closure
/// that is `Send + Sync` is a `CompletionCallback`.
///
/// # Examples
///
/// ```
/// use imsearch_dl::callbacks::{CallbackResult, CompletionCallback};
/// use imsearch_dl::ProcessedImage;
/// use std::sync::Arc;
///
/// let print_path = |image: &ProcessedImage, _extra: Option<&serde_json::Value>| -> CallbackResult {
///     println!("{}", image.clean_path.display());
///     Ok(())
/// };
/// let callback: Arc<dyn CompletionCallback> = Arc::new(print_path);
/// ```
pub trait CompletionCallback: Send + Sync {
    /// Handle one processed image
    ///
    /// # Arguments
    ///
    /// * `image` - The enriched record (original fields plus output paths)
    /// * `extra_params` - Opaque caller data passed through `process_urls`
    fn call(&self, image: &ProcessedImage, extra_params: Option<&serde_json::Value>)
    -> CallbackResult;
}

impl<F> CompletionCallback for F
where
    F: Fn(&ProcessedImage, Option<&serde_json::Value>) -> CallbackResult + Send + Sync,
{
    fn call(
        &self,
        image: &ProcessedImage,
        extra_params: Option<&serde_json::Value>,
    ) -> CallbackResult {
        self(image, extra_params)
    }
}
