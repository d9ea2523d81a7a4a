//! Download Orchestrator (§4.4): holds the queue of pending files, schedules
//! chunks under a concurrency cap, applies retry/backoff, merges completed
//! chunks into final files, and enforces preconditions.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as TokioStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use platform::NetworkMonitor;
use storage::{Layout, PersistedChunk, PersistedFile, PersistedSnapshot, PrefsStore, StateStore};

use crate::error::EngineError;
use crate::fetch::{RangeFetcher, DEFAULT_PER_HOST_CAP};
use crate::plan;
use crate::probe;
use crate::types::{
    Chunk, ChunkState, DownloadSession, FileDescriptor, FileDownload, FileState, ModelTier,
    Progress, ProgressEvent,
};
use crate::verify;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub per_host_cap: usize,
    pub max_retries: u32,
    pub probe_timeout: Duration,
    pub batch_probe_timeout: Duration,
    pub progress_interval: Duration,
    pub user_agent: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            per_host_cap: DEFAULT_PER_HOST_CAP,
            max_retries: 3,
            probe_timeout: probe::DEFAULT_PROBE_TIMEOUT,
            batch_probe_timeout: probe::DEFAULT_BATCH_PROBE_TIMEOUT,
            progress_interval: Duration::from_millis(500),
            user_agent: "FluxDM/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Finished,
    Paused,
}

/// Owns the session object graph exclusively; workers exchange immutable
/// `Chunk` values and never reach into this state directly (§5, §9).
pub struct Orchestrator<N: NetworkMonitor> {
    fetcher: RangeFetcher,
    layout: Layout,
    state_store: StateStore,
    prefs_store: PrefsStore,
    network: N,
    config: OrchestratorConfig,
    session: Mutex<Option<DownloadSession>>,
    canceled: Mutex<bool>,
    run_cancel: Mutex<Option<CancellationToken>>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    last_published: Mutex<Instant>,
}

impl<N: NetworkMonitor> Orchestrator<N> {
    pub fn new(layout: Layout, network: N, config: OrchestratorConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to build HTTP client");

        let (progress_tx, _) = broadcast::channel(64);

        Self {
            fetcher: RangeFetcher::new(client, config.per_host_cap),
            state_store: StateStore::new(layout.clone()),
            prefs_store: PrefsStore::new(layout.clone()),
            layout,
            network,
            config,
            session: Mutex::new(None),
            canceled: Mutex::new(false),
            run_cancel: Mutex::new(None),
            progress_tx,
            last_published: Mutex::new(Instant::now() - Duration::from_secs(3600)),
        }
    }

    /// A lazy sequence of progress snapshots, rate-limited to one per
    /// `progress_interval` (§4.4, §6). Each call returns an independent,
    /// restartable subscription — observers never receive a reference into
    /// live state, only owned snapshots (§5, §9).
    pub fn observe(&self) -> impl futures_util::Stream<Item = ProgressEvent> {
        TokioStreamExt::filter_map(BroadcastStream::new(self.progress_tx.subscribe()), |item| {
            item.ok()
        })
    }

    /// Records user consent for metered networks (§6 `grantCellular`),
    /// durably: a restarted process does not re-prompt (SPEC_FULL.md
    /// "grantCellular() persistence").
    pub async fn grant_cellular(&self) -> Result<(), EngineError> {
        self.prefs_store
            .save(storage::Prefs {
                cellular_consent: true,
            })
            .await?;
        Ok(())
    }

    /// Begins (or continues) a session for `tier` (§4.4 pre-flight + §6
    /// `start`).
    pub async fn start(&self, tier: &ModelTier) -> Result<(), EngineError> {
        *self.canceled.lock().await = false;
        self.publish(ProgressEvent::Probing).await;

        self.check_network_precondition().await?;

        let urls: Vec<String> = tier.artifacts.iter().map(|a| a.url.clone()).collect();
        let probed = probe::probe_all(&self.fetcher_client(), &urls, self.config.batch_probe_timeout)
            .await?;

        // A per-url probe failure is a file-terminal condition (§4.4 state
        // machine: "plan ok" is a precondition for Downloading), not an
        // unknown-size-zero-chunks success — carry the error alongside the
        // descriptor so the file below is routed to Failed, never Verified.
        let mut files = Vec::with_capacity(tier.artifacts.len());
        for artifact in &tier.artifacts {
            match probed.get(&artifact.url) {
                Some(Ok(outcome)) => files.push((
                    FileDescriptor {
                        url: outcome.resolved_url.clone(),
                        file_name: artifact.file_name.clone(),
                        total_size: Some(outcome.total_bytes),
                    },
                    None,
                )),
                Some(Err(err)) => files.push((
                    FileDescriptor {
                        url: artifact.url.clone(),
                        file_name: artifact.file_name.clone(),
                        total_size: None,
                    },
                    Some(err.to_string()),
                )),
                None => files.push((
                    FileDescriptor {
                        url: artifact.url.clone(),
                        file_name: artifact.file_name.clone(),
                        total_size: None,
                    },
                    Some(EngineError::FileSizeNotAvailable.to_string()),
                )),
            }
        }

        let total_requested: u64 = files.iter().filter_map(|(f, _)| f.total_size).sum();
        self.check_storage_precondition(total_requested).await?;

        let session_id = format!("{}-{}", tier.tier.as_str(), Utc::now().timestamp());

        let prior = self.state_store.load().await?;
        let mut file_downloads = Vec::with_capacity(files.len());

        for (descriptor, probe_error) in files {
            if let Some(error) = probe_error {
                warn!(file = %descriptor.file_name, error = %error, "size probe failed; file marked failed");
                file_downloads.push(FileDownload {
                    descriptor,
                    chunks: Vec::new(),
                    merged_path: None,
                    state: FileState::Failed,
                    last_error: Some(error),
                });
                continue;
            }

            let existing_complete = self.artifact_already_complete(tier, &descriptor).await?;
            if existing_complete {
                let merged_path = self
                    .layout
                    .artifact_path(&tier.folder_name, &descriptor.file_name);
                file_downloads.push(FileDownload {
                    descriptor,
                    chunks: Vec::new(),
                    merged_path: Some(merged_path),
                    state: FileState::Verified,
                    last_error: None,
                });
                continue;
            }

            let restored_chunks = prior
                .as_ref()
                .filter(|s| s.tier == tier.tier.as_str())
                .and_then(|s| s.files.iter().find(|f| f.file_name == descriptor.file_name))
                .map(|f| restore_chunks(&descriptor.file_name, f));

            let chunks = match restored_chunks {
                Some(chunks) if !chunks.is_empty() => chunks,
                _ => plan::plan(&descriptor),
            };

            let state = if descriptor.total_size == Some(0) || chunks.is_empty() {
                FileState::Verified
            } else {
                FileState::Downloading
            };

            file_downloads.push(FileDownload {
                descriptor,
                chunks,
                merged_path: None,
                state,
                last_error: None,
            });
        }

        let session = DownloadSession {
            session_id,
            tier: tier.tier,
            files: file_downloads,
            started_at: Utc::now(),
            updated_at: Utc::now(),
            terminal: false,
        };

        *self.session.lock().await = Some(session);
        self.persist_snapshot().await?;

        self.run(tier).await
    }

    /// Cooperative halt: stops dispatch and signals in-flight fetches to
    /// abort within one round-trip. Preserves resumability (§5).
    pub async fn pause(&self) {
        if let Some(token) = self.run_cancel.lock().await.as_ref() {
            token.cancel();
        }
    }

    /// Cooperative restart, continuing only the non-Completed chunks of the
    /// loaded session (§4.4 state machine `Failed ──resume()──▶ Downloading`).
    pub async fn resume(&self) -> Result<(), EngineError> {
        if *self.canceled.lock().await {
            return Err(EngineError::Canceled);
        }

        let tier = {
            let guard = self.session.lock().await;
            let session = guard.as_ref().ok_or(EngineError::Canceled)?;
            session.tier
        };

        // Resume re-enters the dispatch loop directly; chunk ranges were
        // already planned by `start()` and are not recomputed (the static
        // sizing tier is mandatory; re-planning only matters for the
        // optional throughput-adaptive variant, which only ever touches
        // not-yet-dispatched chunks regardless of resume).
        self.check_network_precondition().await?;

        // The `ModelTier` used to locate artifact paths is reconstructed
        // from the in-memory session descriptors, since only the tier
        // identity (not the full artifact list) is needed past this point.
        let folder_name = {
            let guard = self.session.lock().await;
            guard.as_ref().unwrap().tier.as_str().to_string()
        };
        let placeholder_tier = ModelTier {
            tier,
            folder_name,
            artifacts: Vec::new(),
        };

        self.run(&placeholder_tier).await
    }

    /// Stops dispatch, preserves Completed chunks on disk, persists a
    /// snapshot marked non-terminal, and marks the session non-resumable in
    /// memory until `reset()` (§4.4, §5).
    pub async fn cancel(&self) {
        *self.canceled.lock().await = true;
        self.pause().await;

        if let Some(session) = self.session.lock().await.as_mut() {
            session.terminal = false;
        }
        let _ = self.persist_snapshot().await;
    }

    /// Deletes merged artifacts, chunk temporaries, and the snapshot (§6).
    pub async fn reset(&self) -> Result<(), EngineError> {
        let session_id = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.session_id.clone());

        if let Some(session_id) = session_id {
            let chunk_dir = self.layout.chunk_dir(&session_id);
            let _ = tokio::fs::remove_dir_all(&chunk_dir).await;
        }

        if let Some(session) = self.session.lock().await.as_ref() {
            for file in &session.files {
                if let Some(path) = &file.merged_path {
                    let _ = tokio::fs::remove_file(path).await;
                }
            }
        }

        self.state_store.clear().await?;
        *self.session.lock().await = None;
        *self.canceled.lock().await = false;
        Ok(())
    }

    // ---- internals ----

    fn fetcher_client(&self) -> Client {
        // Size Prober and Range Fetcher intentionally share one client
        // (and thus one connection pool) — see SPEC_FULL.md component notes.
        Client::builder()
            .user_agent(self.config.user_agent.clone())
            .build()
            .expect("failed to build HTTP client")
    }

    async fn check_network_precondition(&self) -> Result<(), EngineError> {
        if !self.network.is_connected().await {
            return Err(EngineError::NetworkUnavailable);
        }
        if self.network.is_metered() {
            let prefs = self.prefs_store.load().await?;
            if !prefs.cellular_consent {
                return Err(EngineError::CellularConsentRequired);
            }
        }
        Ok(())
    }

    async fn check_storage_precondition(&self, total_requested: u64) -> Result<(), EngineError> {
        let required = platform::required_with_margin(total_requested);
        let available = platform::available_bytes(self.layout.root())
            .await
            .map_err(|_| EngineError::InsufficientStorage {
                required,
                available: 0,
            })?;

        if available < required {
            return Err(EngineError::InsufficientStorage { required, available });
        }
        Ok(())
    }

    async fn artifact_already_complete(
        &self,
        tier: &ModelTier,
        descriptor: &FileDescriptor,
    ) -> Result<bool, EngineError> {
        let Some(expected) = descriptor.total_size else {
            return Ok(false);
        };
        let path = self.layout.artifact_path(&tier.folder_name, &descriptor.file_name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.len() == expected),
            Err(_) => Ok(false),
        }
    }

    /// Runs the dispatch-merge-verify loop until every file is terminal
    /// (Verified or Failed) or the run is paused/canceled.
    async fn run(&self, tier: &ModelTier) -> Result<(), EngineError> {
        let cancel = CancellationToken::new();
        *self.run_cancel.lock().await = Some(cancel.clone());

        let outcome = self.dispatch_all_chunks(&cancel).await;

        match outcome {
            RunOutcome::Paused => {
                self.persist_snapshot().await?;
                return Ok(());
            }
            RunOutcome::Finished => {}
        }

        self.merge_and_verify_ready_files(tier).await?;
        self.persist_snapshot().await?;

        let (terminal, failure) = {
            let guard = self.session.lock().await;
            match guard.as_ref() {
                Some(session) => (
                    session.is_fully_verified(),
                    session
                        .files
                        .iter()
                        .find(|f| f.state == FileState::Failed)
                        .map(|f| {
                            f.last_error.clone().unwrap_or_else(|| {
                                format!("{} failed", f.descriptor.file_name)
                            })
                        }),
                ),
                None => (false, None),
            }
        };

        if terminal {
            if let Some(session) = self.session.lock().await.as_mut() {
                session.terminal = true;
            }
            self.persist_snapshot().await?;
            self.publish(ProgressEvent::Completed).await;
        } else if let Some(message) = failure {
            self.publish(ProgressEvent::Failed(message)).await;
        }

        Ok(())
    }

    /// Builds a round-robin work queue across files (to avoid head-of-line
    /// blocking by any one large file, §4.4) and dispatches every
    /// not-yet-completed chunk concurrently, under the Range Fetcher's
    /// per-host cap.
    async fn dispatch_all_chunks(&self, cancel: &CancellationToken) -> RunOutcome {
        let work_items = self.build_round_robin_queue().await;
        if work_items.is_empty() {
            return RunOutcome::Finished;
        }

        let mut handles = Vec::with_capacity(work_items.len());

        for (file_idx, chunk_idx, url) in work_items {
            let fetcher = &self.fetcher;
            let session_snapshot_path = self.layout.clone();
            let cancel = cancel.clone();
            let max_retries = self.config.max_retries;

            // chunk id / temp path resolved up front so the task is self-contained
            let (chunk, session_id) = {
                let guard = self.session.lock().await;
                let session = guard.as_ref().expect("session set before dispatch");
                (
                    session.files[file_idx].chunks[chunk_idx].clone(),
                    session.session_id.clone(),
                )
            };
            let temp_path = session_snapshot_path.chunk_path(&session_id, &chunk.file_name, chunk_idx);

            let handle = self.run_one_chunk(
                file_idx,
                chunk_idx,
                url,
                chunk,
                temp_path,
                cancel,
                max_retries,
                fetcher,
            );
            handles.push(handle);
        }

        futures_util::future::join_all(handles).await;

        if cancel.is_cancelled() {
            RunOutcome::Paused
        } else {
            RunOutcome::Finished
        }
    }

    async fn build_round_robin_queue(&self) -> Vec<(usize, usize, String)> {
        let guard = self.session.lock().await;
        let session = match guard.as_ref() {
            Some(s) => s,
            None => return Vec::new(),
        };

        let mut per_file: Vec<VecDeque<usize>> = session
            .files
            .iter()
            .map(|f| {
                f.chunks
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.state != ChunkState::Completed)
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        let mut queue = Vec::new();
        loop {
            let mut any = false;
            for (file_idx, pending) in per_file.iter_mut().enumerate() {
                if let Some(chunk_idx) = pending.pop_front() {
                    any = true;
                    queue.push((file_idx, chunk_idx, session.files[file_idx].descriptor.url.clone()));
                }
            }
            if !any {
                break;
            }
        }

        queue
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one_chunk(
        &self,
        file_idx: usize,
        chunk_idx: usize,
        url: String,
        chunk: Chunk,
        temp_path: std::path::PathBuf,
        cancel: CancellationToken,
        max_retries: u32,
        fetcher: &RangeFetcher,
    ) {
        if let Some(parent) = temp_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                self.update_chunk(file_idx, chunk_idx, |c| {
                    c.state = ChunkState::Pending;
                    c.downloaded_bytes = 0;
                })
                .await;
                return;
            }

            self.update_chunk(file_idx, chunk_idx, |c| c.state = ChunkState::InProgress)
                .await;

            let file = match tokio::fs::File::create(&temp_path).await {
                Ok(f) => f,
                Err(e) => {
                    self.update_chunk(file_idx, chunk_idx, |c| {
                        c.state = ChunkState::Failed;
                        c.last_error = Some(e.to_string());
                    })
                    .await;
                    return;
                }
            };

            let fetch_result = fetcher
                .fetch(&url, chunk.clone(), file, &cancel, |downloaded| async move {
                    // live-reconciles the chunk's authoritative downloaded_bytes
                    // as bytes arrive, so throughput/ETA don't freeze for the
                    // duration of a large (up to 50 MiB, §4.2) in-flight chunk
                    self.update_chunk(file_idx, chunk_idx, move |c| c.downloaded_bytes = downloaded)
                        .await;
                    self.maybe_publish_progress().await;
                })
                .await;

            match fetch_result {
                Ok(completed) => {
                    self.update_chunk(file_idx, chunk_idx, |c| *c = completed).await;
                    self.maybe_publish_progress().await;
                    return;
                }
                Err(EngineError::Canceled) => {
                    self.update_chunk(file_idx, chunk_idx, |c| {
                        c.state = ChunkState::Pending;
                        c.downloaded_bytes = 0;
                    })
                    .await;
                    return;
                }
                Err(e) if e.retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    warn!(
                        chunk = %chunk.id,
                        attempt,
                        max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "chunk fetch failed; retrying after backoff"
                    );
                    self.update_chunk(file_idx, chunk_idx, |c| {
                        c.retry_count = attempt;
                        c.last_error = Some(e.to_string());
                    })
                    .await;

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            self.update_chunk(file_idx, chunk_idx, |c| {
                                c.state = ChunkState::Pending;
                                c.downloaded_bytes = 0;
                            })
                            .await;
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(chunk = %chunk.id, error = %e, "chunk failed terminally");
                    self.update_chunk(file_idx, chunk_idx, |c| {
                        c.state = ChunkState::Failed;
                        c.last_error = Some(e.to_string());
                    })
                    .await;
                    return;
                }
            }
        }
    }

    async fn update_chunk(&self, file_idx: usize, chunk_idx: usize, f: impl FnOnce(&mut Chunk)) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_mut() {
            if let Some(file) = session.files.get_mut(file_idx) {
                if let Some(chunk) = file.chunks.get_mut(chunk_idx) {
                    f(chunk);
                }
            }
            session.updated_at = Utc::now();
        }
    }

    async fn merge_and_verify_ready_files(&self, tier: &ModelTier) -> Result<(), EngineError> {
        let (session_id, file_indices): (String, Vec<usize>) = {
            let guard = self.session.lock().await;
            let session = guard.as_ref().expect("session set");
            let ready = session
                .files
                .iter()
                .enumerate()
                .filter(|(_, f)| f.state == FileState::Downloading && f.all_chunks_completed())
                .map(|(i, _)| i)
                .collect();
            (session.session_id.clone(), ready)
        };

        for file_idx in file_indices {
            self.publish(ProgressEvent::Merging).await;

            let (file_name, chunk_count, expected_size) = {
                let guard = self.session.lock().await;
                let file = &guard.as_ref().unwrap().files[file_idx];
                (
                    file.descriptor.file_name.clone(),
                    file.chunks.len(),
                    file.descriptor.total_size.unwrap_or(0),
                )
            };

            let dest_path = self.layout.artifact_path(&tier.folder_name, &file_name);
            let temp_path = self.layout.merge_temp_path(&tier.folder_name, &file_name);

            if let Some(parent) = dest_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            {
                use tokio::io::AsyncWriteExt;
                let mut out = tokio::fs::File::create(&temp_path).await?;
                for chunk_idx in 0..chunk_count {
                    let chunk_path = self.layout.chunk_path(&session_id, &file_name, chunk_idx);
                    let bytes = tokio::fs::read(&chunk_path).await?;
                    out.write_all(&bytes).await?;
                }
                out.flush().await?;
            }

            tokio::fs::rename(&temp_path, &dest_path).await?;

            self.publish(ProgressEvent::Verifying).await;
            let verify_result = verify::verify_length(&dest_path, expected_size).await;

            self.update_file(file_idx, |f| {
                f.merged_path = Some(dest_path.clone());
                f.state = match &verify_result {
                    Ok(()) => FileState::Verified,
                    Err(_) => FileState::Failed,
                };
                f.last_error = verify_result.as_ref().err().map(|e| e.to_string());
            })
            .await;

            for chunk_idx in 0..chunk_count {
                let chunk_path = self.layout.chunk_path(&session_id, &file_name, chunk_idx);
                let _ = tokio::fs::remove_file(&chunk_path).await;
            }

            if let Err(e) = verify_result {
                warn!(file = %file_name, error = %e, "merge verification failed");
            } else {
                info!(file = %file_name, "file merged and verified");
            }
        }

        Ok(())
    }

    async fn update_file(&self, file_idx: usize, f: impl FnOnce(&mut FileDownload)) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_mut() {
            if let Some(file) = session.files.get_mut(file_idx) {
                f(file);
            }
            session.updated_at = Utc::now();
        }
    }

    async fn persist_snapshot(&self) -> Result<(), EngineError> {
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return Ok(());
        };

        let snapshot = to_persisted_snapshot(session);
        self.state_store.save(&snapshot).await?;
        Ok(())
    }

    async fn maybe_publish_progress(&self) {
        let mut last = self.last_published.lock().await;
        if last.elapsed() < self.config.progress_interval {
            return;
        }
        *last = Instant::now();
        drop(last);

        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else { return };

        let total_bytes = session.total_bytes();
        let completed_bytes = session.completed_bytes();
        let elapsed = (Utc::now() - session.started_at).num_milliseconds().max(1) as f64 / 1000.0;
        let bytes_per_second = completed_bytes as f64 / elapsed;
        let remaining = total_bytes.saturating_sub(completed_bytes);
        let eta_seconds = if bytes_per_second > 0.0 {
            Some(remaining as f64 / bytes_per_second)
        } else {
            None
        };

        let total_chunks: usize = session.files.iter().map(|f| f.chunks.len()).sum();
        let completed_chunks: usize = session
            .files
            .iter()
            .flat_map(|f| f.chunks.iter())
            .filter(|c| c.is_complete())
            .count();
        let active_chunks: usize = session
            .files
            .iter()
            .flat_map(|f| f.chunks.iter())
            .filter(|c| c.state == ChunkState::InProgress)
            .count();

        let overall_fraction = if total_bytes > 0 {
            completed_bytes as f64 / total_bytes as f64
        } else {
            1.0
        };

        let error_message = session
            .files
            .iter()
            .find(|f| f.state == FileState::Failed)
            .and_then(|f| f.last_error.clone());

        drop(guard);

        self.publish(ProgressEvent::Downloading(Progress {
            overall_fraction,
            bytes_per_second,
            eta_seconds,
            active_chunks,
            completed_chunks,
            total_chunks,
            error_message,
        }))
        .await;
    }

    async fn publish(&self, event: ProgressEvent) {
        let _ = self.progress_tx.send(event);
    }
}

/// `delay(n) = min(2·2^n seconds + jitter[0,1s], 60s)` (§4.4).
fn backoff_delay(attempt: u32) -> Duration {
    let base = 2.0 * 2f64.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.0..1.0);
    let seconds = (base + jitter).min(60.0);
    Duration::from_secs_f64(seconds)
}

fn restore_chunks(file_name: &str, persisted: &PersistedFile) -> Vec<Chunk> {
    persisted
        .chunks
        .iter()
        .map(|c| Chunk {
            id: c.id.clone(),
            file_name: file_name.to_string(),
            start_byte: c.start_byte,
            end_byte: c.end_byte,
            downloaded_bytes: if c.is_completed { c.downloaded_bytes } else { 0 },
            state: if c.is_completed {
                ChunkState::Completed
            } else {
                ChunkState::Pending
            },
            retry_count: c.retry_count,
            last_error: c.last_error.clone(),
        })
        .collect()
}

fn to_persisted_snapshot(session: &DownloadSession) -> PersistedSnapshot {
    PersistedSnapshot {
        schema_version: storage::CURRENT_SCHEMA_VERSION,
        tier: session.tier.as_str().to_string(),
        total_size: session.total_bytes() as i64,
        completed_size: session.completed_bytes() as i64,
        is_completed: session.terminal,
        last_update_time: session.updated_at,
        files: session
            .files
            .iter()
            .map(|f| PersistedFile {
                url: f.descriptor.url.clone(),
                file_name: f.descriptor.file_name.clone(),
                total_size: f.descriptor.total_size.unwrap_or(0) as i64,
                is_completed: f.state == FileState::Verified,
                chunks: f
                    .chunks
                    .iter()
                    .map(|c| PersistedChunk {
                        id: c.id.clone(),
                        start_byte: c.start_byte,
                        end_byte: c.end_byte,
                        downloaded_bytes: c.downloaded_bytes,
                        is_completed: c.is_complete(),
                        retry_count: c.retry_count,
                        last_error: c.last_error.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::Layout;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::types::{ArtifactSpec, Tier};

    struct FixedNetworkMonitor {
        connected: bool,
        metered: bool,
    }

    impl NetworkMonitor for FixedNetworkMonitor {
        async fn is_connected(&self) -> bool {
            self.connected
        }

        fn is_metered(&self) -> bool {
            self.metered
        }
    }

    fn online() -> FixedNetworkMonitor {
        FixedNetworkMonitor {
            connected: true,
            metered: false,
        }
    }

    async fn single_file_tier(server: &MockServer, body: &[u8]) -> ModelTier {
        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", body.len().to_string()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/model.bin"))
            .and(header("range", format!("bytes=0-{}", body.len() - 1).as_str()))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;

        ModelTier {
            tier: Tier::Low,
            folder_name: "low".to_string(),
            artifacts: vec![ArtifactSpec {
                file_name: "model.bin".to_string(),
                url: format!("{}/model.bin", server.uri()),
            }],
        }
    }

    #[tokio::test]
    async fn start_downloads_merges_and_verifies_a_small_file() {
        let server = MockServer::start().await;
        let body = vec![42u8; 1024];
        let tier = single_file_tier(&server, &body).await;

        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(Layout::new(dir.path()), online(), OrchestratorConfig::default());

        orchestrator.start(&tier).await.unwrap();

        let merged_path = dir.path().join("low").join("model.bin");
        let on_disk = tokio::fs::read(&merged_path).await.unwrap();
        assert_eq!(on_disk, body);

        let session = orchestrator.session.lock().await;
        assert!(session.as_ref().unwrap().is_fully_verified());
    }

    #[tokio::test]
    async fn start_fails_fast_when_network_unavailable() {
        let server = MockServer::start().await;
        let tier = single_file_tier(&server, &[1, 2, 3]).await;

        let dir = tempfile::tempdir().unwrap();
        let offline = FixedNetworkMonitor {
            connected: false,
            metered: false,
        };
        let orchestrator = Orchestrator::new(Layout::new(dir.path()), offline, OrchestratorConfig::default());

        let err = orchestrator.start(&tier).await.unwrap_err();
        assert!(matches!(err, EngineError::NetworkUnavailable));
    }

    #[tokio::test]
    async fn metered_network_requires_consent_then_succeeds_once_granted() {
        let server = MockServer::start().await;
        let body = vec![9u8; 64];
        let tier = single_file_tier(&server, &body).await;

        let dir = tempfile::tempdir().unwrap();
        let metered = FixedNetworkMonitor {
            connected: true,
            metered: true,
        };
        let orchestrator = Orchestrator::new(Layout::new(dir.path()), metered, OrchestratorConfig::default());

        let err = orchestrator.start(&tier).await.unwrap_err();
        assert!(matches!(err, EngineError::CellularConsentRequired));

        orchestrator.grant_cellular().await.unwrap();
        orchestrator.start(&tier).await.unwrap();
    }

    #[tokio::test]
    async fn reset_removes_merged_artifact_and_snapshot() {
        let server = MockServer::start().await;
        let body = vec![5u8; 32];
        let tier = single_file_tier(&server, &body).await;

        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let orchestrator = Orchestrator::new(layout.clone(), online(), OrchestratorConfig::default());

        orchestrator.start(&tier).await.unwrap();
        orchestrator.reset().await.unwrap();

        assert!(tokio::fs::metadata(layout.state_path()).await.is_err());
        assert!(orchestrator.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn start_retries_past_a_transient_503_and_succeeds() {
        let server = MockServer::start().await;
        let body = vec![3u8; 256];

        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", body.len().to_string()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/model.bin"))
            .and(header("range", format!("bytes=0-{}", body.len() - 1).as_str()))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/model.bin"))
            .and(header("range", format!("bytes=0-{}", body.len() - 1).as_str()))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tier = ModelTier {
            tier: Tier::Low,
            folder_name: "low".to_string(),
            artifacts: vec![ArtifactSpec {
                file_name: "model.bin".to_string(),
                url: format!("{}/model.bin", server.uri()),
            }],
        };

        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(Layout::new(dir.path()), online(), OrchestratorConfig::default());

        orchestrator.start(&tier).await.unwrap();

        let merged_path = dir.path().join("low").join("model.bin");
        let on_disk = tokio::fs::read(&merged_path).await.unwrap();
        assert_eq!(on_disk, body);

        let session = orchestrator.session.lock().await;
        assert!(session.as_ref().unwrap().is_fully_verified());
    }

    #[test]
    fn backoff_delay_is_monotonic_and_capped() {
        let d1 = backoff_delay(1);
        let d4 = backoff_delay(4);
        assert!(d1.as_secs_f64() < d4.as_secs_f64());
        assert!(backoff_delay(10).as_secs_f64() <= 60.0);
    }
}
