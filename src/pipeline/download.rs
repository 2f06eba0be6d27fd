//! Raw image download

use crate::error::ItemError;
use crate::utils::PartialFile;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Download `url` to `dest` unless `dest` already exists
///
/// The body is streamed into `{dest}.part` and only renamed into place once
/// complete. On any error, or if the returned future is dropped, the partial
/// file is removed.
///
/// Returns `true` if a download took place, `false` if the file was already present.
pub(crate) async fn download_image(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<bool, ItemError> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        debug!(path = ?dest, "raw image already present, skipping download");
        return Ok(false);
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(url, &e))?;

    let mut response = response
        .error_for_status()
        .map_err(|e| transport_error(url, &e))?;

    let partial = PartialFile::new(dest);
    let mut file = tokio::fs::File::create(partial.path()).await?;
    let mut bytes = 0usize;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| transport_error(url, &e))?
    {
        file.write_all(&chunk).await?;
        bytes += chunk.len();
    }
    file.flush().await?;
    drop(file);

    partial.commit()?;
    debug!(url, path = ?dest, bytes, "image downloaded");
    Ok(true)
}

fn transport_error(url: &str, e: &reqwest::Error) -> ItemError {
    let reason = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else if let Some(status) = e.status() {
        format!("HTTP {status}")
    } else {
        e.to_string()
    };
    ItemError::Transport {
        url: url.to_string(),
        reason,
    }
}
