//! Utility functions for file operations and path manipulation

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Suffix appended to a destination path while it is being written
const PARTIAL_SUFFIX: &str = "part";

/// Extract the file extension (including the leading dot) from a URL path
///
/// Query strings and fragments are ignored. Returns an empty string when the
/// last path segment has no extension or the URL cannot be parsed.
///
/// # Examples
///
/// ```
/// use imsearch_dl::utils::extension_from_url;
///
/// assert_eq!(extension_from_url("https://example.com/img/cat.JPG?w=300"), ".JPG");
/// assert_eq!(extension_from_url("https://example.com/img/cat"), "");
/// ```
pub fn extension_from_url(url: &str) -> String {
    let last_segment = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string)),
        // Not an absolute URL: fall back to the raw text up to any query/fragment
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(str::to_string),
    };

    let Some(segment) = last_segment else {
        return String::new();
    };

    match Path::new(&segment).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

/// Distinguishes concurrent writers of the same destination within this process
static PARTIAL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A file being written under a temporary `{dest}.{pid}-{n}.part` name
///
/// The data only appears under the destination name once [`commit`](Self::commit)
/// renames it into place. Dropping an uncommitted `PartialFile` (on error, or when
/// the owning future is cancelled) removes the temporary file, so readers never
/// observe a truncated destination file. Every instance gets its own temporary
/// name, so two writers of one destination never share a file.
#[derive(Debug)]
pub struct PartialFile {
    part: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl PartialFile {
    /// Prepare to write `dest`
    pub fn new(dest: &Path) -> Self {
        let sequence = PARTIAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut part = dest.as_os_str().to_owned();
        part.push(format!(".{}-{sequence}.{PARTIAL_SUFFIX}", std::process::id()));
        Self {
            part: PathBuf::from(part),
            dest: dest.to_path_buf(),
            committed: false,
        }
    }

    /// Temporary path to write to
    pub fn path(&self) -> &Path {
        &self.part
    }

    /// Final destination path
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Atomically move the finished file to its destination
    pub fn commit(mut self) -> std::io::Result<PathBuf> {
        std::fs::rename(&self.part, &self.dest)?;
        self.committed = true;
        Ok(self.dest.clone())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.part) {
            Ok(()) => tracing::debug!(path = ?self.part, "removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = ?self.part, error = %e, "failed to remove partial file"),
        }
    }
}

/// Remove a file, logging instead of failing
///
/// Used to discard rejected downloads; a failure here must not mask the
/// rejection reason.
pub fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = ?path, error = %e, "failed to remove rejected file");
    }
}
