//! Built-in completion callbacks

use super::{CallbackResult, CompletionCallback};
use crate::types::ProcessedImage;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Appends one JSON object per processed image to a file
///
/// Each line is `{"image": {...}, "extra_params": ...}`. Lines from concurrent
/// workers never interleave.
#[derive(Debug)]
pub struct JsonLinesLog {
    path: PathBuf,
    file: Mutex<File>,
}

#[derive(Serialize)]
struct LogLine<'a> {
    image: &'a ProcessedImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra_params: Option<&'a serde_json::Value>,
}

impl JsonLinesLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// The log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompletionCallback for JsonLinesLog {
    fn call(
        &self,
        image: &ProcessedImage,
        extra_params: Option<&serde_json::Value>,
    ) -> CallbackResult {
        let mut line = serde_json::to_string(&LogLine {
            image,
            extra_params,
        })?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Runs an external program for every processed image
///
/// The program receives the image through environment variables:
///
/// | Variable | Content |
/// |---|---|
/// | `IMSEARCH_IMAGE_ID` | result image id |
/// | `IMSEARCH_URL` | source URL |
/// | `IMSEARCH_ORIG_PATH` | raw download |
/// | `IMSEARCH_CLEAN_PATH` | standardized image |
/// | `IMSEARCH_THUMB_PATH` | thumbnail |
/// | `IMSEARCH_TITLE` | title, when known |
/// | `IMSEARCH_RANK` | rank, when known |
/// | `IMSEARCH_EXTRA_PARAMS` | extra params as JSON, when given |
///
/// A non-zero exit status or exceeding the timeout (the process is killed) is
/// reported as a callback failure.
#[derive(Clone, Debug)]
pub struct ScriptCallback {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

/// Interval between child process status checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl ScriptCallback {
    /// Run `program` with a 30 second timeout
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Pass fixed arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Override the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn env_vars(
        image: &ProcessedImage,
        extra_params: Option<&serde_json::Value>,
    ) -> HashMap<&'static str, String> {
        let mut env = HashMap::new();
        env.insert("IMSEARCH_IMAGE_ID", image.record.image_id.clone());
        env.insert("IMSEARCH_URL", image.record.url.clone());
        env.insert("IMSEARCH_ORIG_PATH", image.orig_path.display().to_string());
        env.insert("IMSEARCH_CLEAN_PATH", image.clean_path.display().to_string());
        env.insert("IMSEARCH_THUMB_PATH", image.thumb_path.display().to_string());
        if let Some(title) = &image.record.title {
            env.insert("IMSEARCH_TITLE", title.clone());
        }
        if let Some(rank) = image.record.rank {
            env.insert("IMSEARCH_RANK", rank.to_string());
        }
        if let Some(extra) = extra_params {
            env.insert("IMSEARCH_EXTRA_PARAMS", extra.to_string());
        }
        env
    }
}

impl CompletionCallback for ScriptCallback {
    fn call(
        &self,
        image: &ProcessedImage,
        extra_params: Option<&serde_json::Value>,
    ) -> CallbackResult {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(Self::env_vars(image, extra_params))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to run {}: {e}", self.program.display()))?;

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(format!("{} exited with {status}", self.program.display()).into());
            }
            if started.elapsed() >= self.timeout {
                child.kill().ok();
                child.wait().ok();
                return Err(format!(
                    "{} timed out after {:?}",
                    self.program.display(),
                    self.timeout
                )
                .into());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
