use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The schema version this build writes and fully understands.
///
/// Snapshots with a newer `schema_version` are treated as "no prior state"
/// (§4.5 schema evolution); older versions are migrated forward in [`migrate`].
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The serializable subset of a download session, matching the
/// `download_state.json` wire schema exactly (field names are camelCase on
/// the wire, snake_case in Rust).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedSnapshot {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tier: String,
    #[serde(rename = "totalSize")]
    pub total_size: i64,
    #[serde(rename = "completedSize")]
    pub completed_size: i64,
    #[serde(rename = "isCompleted")]
    pub is_completed: bool,
    #[serde(rename = "lastUpdateTime")]
    pub last_update_time: DateTime<Utc>,
    pub files: Vec<PersistedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedFile {
    pub url: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "totalSize")]
    pub total_size: i64,
    #[serde(rename = "isCompleted")]
    pub is_completed: bool,
    pub chunks: Vec<PersistedChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedChunk {
    pub id: String,
    #[serde(rename = "startByte")]
    pub start_byte: u64,
    #[serde(rename = "endByte")]
    pub end_byte: u64,
    #[serde(rename = "downloadedBytes")]
    pub downloaded_bytes: u64,
    #[serde(rename = "isCompleted")]
    pub is_completed: bool,
    #[serde(rename = "retryCount")]
    pub retry_count: u32,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

impl PersistedSnapshot {
    /// `true` if `self` is writable/readable as-is by this build. A snapshot
    /// from a newer, unrecognized schema version must be ignored rather than
    /// partially trusted.
    pub fn is_recognized(&self) -> bool {
        self.schema_version <= CURRENT_SCHEMA_VERSION
    }
}

/// Migrates a snapshot forward to [`CURRENT_SCHEMA_VERSION`] in memory.
///
/// There is only one schema version today, so this is the identity function
/// for version 1 and a no-op placeholder for the migration chain future
/// versions will extend.
pub fn migrate(snapshot: PersistedSnapshot) -> PersistedSnapshot {
    snapshot
}
