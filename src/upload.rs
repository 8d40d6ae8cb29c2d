use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::errors::ApiError;

/// Stream `chunks` into a new file at `path`, returning the byte count.
/// Fails with `FileTooLarge` once more than `limit` bytes arrive. On any failure
/// the partially written file is removed before the error is returned.
pub async fn write_stream<S, E>(path: &Path, chunks: S, limit: usize) -> Result<u64, ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ApiError>,
{
    let file = File::create(path).await?;

    match copy_chunks(file, chunks, limit).await {
        Ok(written) => Ok(written),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "Failed to remove partial upload"
                );
            }
            Err(e)
        }
    }
}

async fn copy_chunks<S, E>(mut file: File, chunks: S, limit: usize) -> Result<u64, ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ApiError>,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut written = 0u64;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(Into::into)?;
        written += chunk.len() as u64;
        if written > limit as u64 {
            return Err(ApiError::FileTooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}
