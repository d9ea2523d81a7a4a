use std::path::Path;

use tracing::warn;

use crate::{
    error::StorageError,
    layout::Layout,
    snapshot::{migrate, PersistedSnapshot},
};

/// Persists a whole-session [`PersistedSnapshot`] to the single well-known
/// path under the application's data directory (§4.5). Snapshots are
/// whole-session; there is no incremental delta format.
pub struct StateStore {
    layout: Layout,
}

impl StateStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Writes `snapshot`, replacing any prior one. The write is atomic:
    /// serialize to a temp path, fsync, rename over the target.
    pub async fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StorageError> {
        let path = self.layout.state_path();
        let tmp_path = self.layout.state_temp_path();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let body = serde_json::to_vec_pretty(snapshot).expect("snapshot is always serializable");

        write_atomic(&tmp_path, &path, &body).await?;
        Ok(())
    }

    /// Loads the persisted snapshot, if any. A missing file is "no prior
    /// state"; a malformed file is moved aside for diagnostics (not deleted)
    /// and also reported as "no prior state". A snapshot whose
    /// `schemaVersion` is newer than this build understands is likewise
    /// treated as absent.
    pub async fn load(&self) -> Result<Option<PersistedSnapshot>, StorageError> {
        let path = self.layout.state_path();

        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Read { path, source }),
        };

        let snapshot: PersistedSnapshot = match serde_json::from_slice(&body) {
            Ok(snapshot) => snapshot,
            Err(source) => {
                warn!(?path, %source, "snapshot is malformed, quarantining");
                self.quarantine(&path).await?;
                return Ok(None);
            }
        };

        if !snapshot.is_recognized() {
            warn!(
                schema_version = snapshot.schema_version,
                "snapshot schema is newer than this build understands, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(migrate(snapshot)))
    }

    /// Deletes the snapshot file. Chunk temporaries and merged artifacts are
    /// not touched here — callers clear those explicitly via [`Layout`].
    pub async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.layout.state_path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Write {
                path: self.layout.state_path(),
                source,
            }),
        }
    }

    async fn quarantine(&self, path: &Path) -> Result<(), StorageError> {
        let dest = self.layout.state_quarantine_path();
        match tokio::fs::rename(path, &dest).await {
            Ok(()) | Err(_) => Ok(()), // best-effort: a failed quarantine is not itself fatal
        }
    }
}

/// Writes `body` to `tmp_path`, fsyncs it, then renames it onto `path`.
pub(crate) async fn write_atomic(
    tmp_path: &Path,
    path: &Path,
    body: &[u8],
) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(tmp_path)
        .await
        .map_err(|source| StorageError::Write {
            path: tmp_path.to_path_buf(),
            source,
        })?;

    use tokio::io::AsyncWriteExt;
    file.write_all(body)
        .await
        .map_err(|source| StorageError::Write {
            path: tmp_path.to_path_buf(),
            source,
        })?;
    file.sync_all().await.map_err(|source| StorageError::Write {
        path: tmp_path.to_path_buf(),
        source,
    })?;
    drop(file);

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        })
}
