//! Cancellable streaming downloads
//!
//! A download always overwrites its destination. Cancellation and a dropped
//! connection both resolve to `Ok(None)` after the partial file is deleted;
//! they are the normal "sync cancelled" path, not failures.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Response;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nodesync_core::ports::RemoteError;

async fn discard_partial(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => debug!(path = %destination.display(), "Deleted partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %destination.display(),
            error = %e,
            "Failed to delete partial download"
        ),
    }
}

/// Awaits a request unless `cancel` fires first
pub async fn send_cancellable<F>(
    request: F,
    cancel: &CancellationToken,
) -> Result<Option<Response>, RemoteError>
where
    F: std::future::Future<Output = Result<Response, RemoteError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        response = request => response.map(Some),
    }
}

/// Streams a response body into `destination`
///
/// # Returns
/// The destination path, or `None` if cancelled or the connection dropped
/// mid-body. In both `None` cases the partial file has been removed.
pub async fn stream_to_file(
    response: Response,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<Option<PathBuf>, RemoteError> {
    let mut file = tokio::fs::File::create(destination).await?;
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                drop(file);
                discard_partial(destination).await;
                debug!(path = %destination.display(), written, "Download cancelled");
                return Ok(None);
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                if let Err(e) = file.write_all(&bytes).await {
                    drop(file);
                    discard_partial(destination).await;
                    return Err(e.into());
                }
                written += bytes.len() as u64;
            }
            Some(Err(e)) => {
                drop(file);
                discard_partial(destination).await;
                warn!(
                    path = %destination.display(),
                    written,
                    error = %e,
                    "Connection lost during download"
                );
                return Ok(None);
            }
            None => break,
        }
    }

    file.flush().await?;
    debug!(path = %destination.display(), bytes = written, "Download complete");
    Ok(Some(destination.to_path_buf()))
}
