use serde::{Deserialize, Serialize};

/// A named preset mapping to an ordered list of remote artifacts (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Tier::Low),
            "medium" => Some(Tier::Medium),
            "high" => Some(Tier::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote artifact within a tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub file_name: String,
    pub url: String,
}

/// A named preset mapping to an ordered list of remote artifacts, plus the
/// stable on-disk folder name for the tier (§3). Immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTier {
    pub tier: Tier,
    pub folder_name: String,
    pub artifacts: Vec<ArtifactSpec>,
}

/// `{ url, fileName, totalSize }`. `total_size` is `None` until the Size
/// Prober resolves it; once resolved it is immutable for the lifetime of the
/// download.
///
/// spec.md §3 models the unresolved state as the sentinel `-1`; this
/// implementation uses `Option<u64>` instead, which is the idiomatic Rust
/// shape for "unknown until resolved" and cannot be confused with a real
/// size of `u64::MAX - 1`-ish values. See DESIGN.md for the full rationale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub url: String,
    pub file_name: String,
    pub total_size: Option<u64>,
}

/// `state ∈ {Pending, InProgress, Completed, Failed}` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// `{ id, fileName, startByte, endByte, downloadedBytes, state, retryCount,
/// lastError }`. `id` is `fileName + "#" + chunkIndex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub file_name: String,
    pub start_byte: u64,
    pub end_byte: u64,
    pub downloaded_bytes: u64,
    pub state: ChunkState,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl Chunk {
    pub fn new(file_name: &str, index: usize, start_byte: u64, end_byte: u64) -> Self {
        Self {
            id: format!("{file_name}#{index}"),
            file_name: file_name.to_string(),
            start_byte,
            end_byte,
            downloaded_bytes: 0,
            state: ChunkState::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// `size = endByte − startByte + 1`.
    pub fn size(&self) -> u64 {
        self.end_byte - self.start_byte + 1
    }

    pub fn remaining(&self) -> u64 {
        self.size() - self.downloaded_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.state == ChunkState::Completed
    }
}

/// `state ∈ {Planning, Downloading, Merging, Verified, Failed}` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Planning,
    Downloading,
    Merging,
    Verified,
    Failed,
}

/// `{ descriptor, chunks, mergedPath?, state }`. Invariant:
/// `FileDownload.state == Verified ⇒ mergedPath` points to a file whose byte
/// length equals `descriptor.totalSize`.
///
/// `last_error` is not part of the persisted wire schema (§6) — it exists
/// only so a file that lands in `Failed` (probe failure, merge/verify
/// mismatch) can tell an `observe()` subscriber why.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub descriptor: FileDescriptor,
    pub chunks: Vec<Chunk>,
    pub merged_path: Option<std::path::PathBuf>,
    pub state: FileState,
    pub last_error: Option<String>,
}

impl FileDownload {
    pub fn completed_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.downloaded_bytes).sum()
    }

    pub fn all_chunks_completed(&self) -> bool {
        !self.chunks.is_empty() && self.chunks.iter().all(|c| c.is_complete())
    }
}

/// `{ tier, files, totalBytes, completedBytes, startedAt, updatedAt,
/// terminal }` (§3).
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub session_id: String,
    pub tier: Tier,
    pub files: Vec<FileDownload>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub terminal: bool,
}

impl DownloadSession {
    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|f| f.descriptor.total_size)
            .sum()
    }

    pub fn completed_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.completed_bytes()).sum()
    }

    pub fn is_fully_verified(&self) -> bool {
        self.files.iter().all(|f| f.state == FileState::Verified)
    }
}

/// Rate-limited observable progress (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub overall_fraction: f64,
    pub bytes_per_second: f64,
    pub eta_seconds: Option<f64>,
    pub active_chunks: usize,
    pub completed_chunks: usize,
    pub total_chunks: usize,
    pub error_message: Option<String>,
}

/// Additive phase wrapper around [`Progress`] (SPEC_FULL.md "Structured
/// progress events"): lets an observer render phase-aware UI without polling
/// `FileDownload::state` on the side.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Probing,
    Downloading(Progress),
    Merging,
    Verifying,
    Completed,
    Failed(String),
}
