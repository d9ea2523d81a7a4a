use std::path::{Path, PathBuf};

/// On-disk layout under the application's persistent data directory (§6):
///
/// ```text
/// <root>/
///   <tierFolderName>/
///     model.safetensors
///     config.json
///     tokenizer.json
///   chunks-<sessionId>/
///     <fileName>.<chunkIndex>.part
///   download_state.json
///   prefs.json
/// ```
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination directory for a tier's merged artifacts.
    pub fn tier_dir(&self, tier_folder_name: &str) -> PathBuf {
        self.root.join(tier_folder_name)
    }

    /// Final merged artifact path for one file in a tier.
    pub fn artifact_path(&self, tier_folder_name: &str, file_name: &str) -> PathBuf {
        self.tier_dir(tier_folder_name).join(file_name)
    }

    /// Session-scoped directory holding raw chunk temporaries.
    pub fn chunk_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("chunks-{session_id}"))
    }

    /// Temp path for one chunk's raw bytes.
    pub fn chunk_path(&self, session_id: &str, file_name: &str, chunk_index: usize) -> PathBuf {
        self.chunk_dir(session_id)
            .join(format!("{file_name}.{chunk_index}.part"))
    }

    /// The sibling temp path a merge writes to before its atomic rename.
    pub fn merge_temp_path(&self, tier_folder_name: &str, file_name: &str) -> PathBuf {
        self.tier_dir(tier_folder_name)
            .join(format!("{file_name}.merging"))
    }

    /// Single well-known snapshot path (§4.5).
    pub fn state_path(&self) -> PathBuf {
        self.root.join("download_state.json")
    }

    /// Sibling temp path the snapshot is written to before its atomic rename.
    pub fn state_temp_path(&self) -> PathBuf {
        self.root.join("download_state.json.tmp")
    }

    /// Path a malformed snapshot is moved aside to for diagnostics, rather
    /// than being deleted outright (§4.5).
    pub fn state_quarantine_path(&self) -> PathBuf {
        self.root.join("download_state.json.corrupt")
    }

    /// Tier-independent preferences (e.g. cellular consent) that outlive any
    /// one session's snapshot.
    pub fn prefs_path(&self) -> PathBuf {
        self.root.join("prefs.json")
    }
}
