//! Range Fetcher (§4.3): issues one byte-range HTTP GET per chunk, buffers
//! bytes to a per-chunk temporary file, reports progress, and surfaces
//! terminal errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWrite;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EngineError;
use crate::types::{Chunk, ChunkState};

pub const DEFAULT_PER_HOST_CAP: usize = 4;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounds the number of concurrent in-flight range requests per host (§4.3,
/// §5). Workers call [`RangeFetcher::fetch`], which blocks on a semaphore
/// permit until a slot frees — `tokio::sync::Semaphore` wakes waiters in
/// arrival order, giving the FIFO behavior §4.3 asks for.
pub struct RangeFetcher {
    client: Client,
    permits: Arc<Semaphore>,
}

impl RangeFetcher {
    pub fn new(client: Client, per_host_cap: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(per_host_cap.max(1))),
        }
    }

    /// Fetches `chunk`'s byte range of `url` and streams it into `sink`, an
    /// append-only writer the caller owns for the duration of the call.
    /// `on_progress` is awaited after every network read with the chunk's
    /// cumulative downloaded byte count, so a caller can reconcile its own
    /// session state and publish rate-limited progress without the fetcher
    /// knowing about the Orchestrator's session state.
    pub async fn fetch<W, F, Fut>(
        &self,
        url: &str,
        mut chunk: Chunk,
        mut sink: W,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<Chunk, EngineError>
    where
        W: AsyncWrite + Unpin,
        F: FnMut(u64) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        use tokio::io::AsyncWriteExt;

        let _permit = self
            .permits
            .acquire()
            .await
            .expect("semaphore is never closed");

        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        let range_header = format!("bytes={}-{}", chunk.start_byte, chunk.end_byte);
        let requested_len = chunk.size();

        let request = self.client.get(url).header("Range", &range_header);

        let response = tokio::select! {
            result = request.send() => result.map_err(classify_request_error)?,
            () = cancel.cancelled() => return Err(EngineError::Canceled),
        };

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(EngineError::HttpError(status.as_u16()));
        }
        if status == StatusCode::OK {
            let body_len = response.content_length();
            if body_len != Some(requested_len) {
                return Err(EngineError::RangeNotHonored);
            }
        }

        let downloaded = AtomicU64::new(0);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                item = stream.next() => item,
                () = cancel.cancelled() => {
                    sink.flush().await.ok();
                    return Err(EngineError::Canceled);
                }
            };

            let Some(item) = next else { break };
            let bytes = item.map_err(classify_request_error)?;

            sink.write_all(&bytes).await?;
            let total = downloaded.fetch_add(bytes.len() as u64, Ordering::SeqCst) + bytes.len() as u64;
            chunk.downloaded_bytes = total;
            on_progress(total).await;
        }

        sink.flush().await?;

        let final_downloaded = downloaded.load(Ordering::SeqCst);
        if final_downloaded != requested_len {
            return Err(EngineError::Truncated {
                expected: requested_len,
                actual: final_downloaded,
            });
        }

        chunk.downloaded_bytes = final_downloaded;
        chunk.state = ChunkState::Completed;
        debug!(chunk = %chunk.id, bytes = final_downloaded, "chunk fetched");

        Ok(chunk)
    }
}

fn classify_request_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout
    } else if err.is_connect() || err.is_request() {
        EngineError::NetworkLost(err.to_string())
    } else if let Some(status) = err.status() {
        EngineError::HttpError(status.as_u16())
    } else {
        EngineError::NetworkLost(err.to_string())
    }
}
