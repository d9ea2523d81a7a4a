//! Chunked, resumable download engine: probes remote file sizes, plans byte
//! ranges, fetches them concurrently under a per-host cap, merges and
//! verifies the result, and persists enough state to resume after a crash.

mod error;
mod fetch;
mod orchestrator;
mod plan;
mod probe;
mod types;
mod verify;

pub use error::EngineError;
pub use fetch::{RangeFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_PER_HOST_CAP};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use plan::{adapt_chunk_size, plan, replan_pending};
pub use probe::{probe, probe_all, ProbeOutcome, DEFAULT_BATCH_PROBE_TIMEOUT, DEFAULT_PROBE_TIMEOUT};
pub use types::{
    ArtifactSpec, Chunk, ChunkState, DownloadSession, FileDescriptor, FileDownload, FileState,
    ModelTier, Progress, ProgressEvent, Tier,
};
pub use verify::{compute_hash, verify_length};
