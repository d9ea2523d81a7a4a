//! Persists a download session's progress so an interrupted download can
//! resume, and records the on-disk layout both the engine and its callers
//! rely on (§4.5, §6).

mod error;
mod layout;
mod prefs;
mod snapshot;
mod state_store;

pub use error::StorageError;
pub use layout::Layout;
pub use prefs::{Prefs, PrefsStore};
pub use snapshot::{migrate, PersistedChunk, PersistedFile, PersistedSnapshot, CURRENT_SCHEMA_VERSION};
pub use state_store::StateStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_snapshot() -> PersistedSnapshot {
        PersistedSnapshot {
            schema_version: CURRENT_SCHEMA_VERSION,
            tier: "low".to_string(),
            total_size: 1000,
            completed_size: 400,
            is_completed: false,
            last_update_time: Utc::now(),
            files: vec![PersistedFile {
                url: "https://example.com/model.bin".to_string(),
                file_name: "model.bin".to_string(),
                total_size: 1000,
                is_completed: false,
                chunks: vec![PersistedChunk {
                    id: "model.bin#0".to_string(),
                    start_byte: 0,
                    end_byte: 499,
                    downloaded_bytes: 400,
                    is_completed: false,
                    retry_count: 1,
                    last_error: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(Layout::new(dir.path()));

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().expect("snapshot should exist");
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn load_with_no_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(Layout::new(dir.path()));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_with_malformed_file_quarantines_and_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(layout.state_path(), b"not json")
            .await
            .unwrap();

        let store = StateStore::new(layout.clone());
        assert!(store.load().await.unwrap().is_none());

        assert!(tokio::fs::metadata(layout.state_quarantine_path())
            .await
            .is_ok());
        assert!(tokio::fs::metadata(layout.state_path()).await.is_err());
    }

    #[tokio::test]
    async fn unrecognized_future_schema_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let mut snapshot = sample_snapshot();
        snapshot.schema_version = CURRENT_SCHEMA_VERSION + 1;

        let store = StateStore::new(layout);
        store.save(&snapshot).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(Layout::new(dir.path()));
        store.save(&sample_snapshot()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // clearing an already-absent snapshot is not an error
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn prefs_round_trip_and_default_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let prefs_store = PrefsStore::new(layout);

        assert_eq!(prefs_store.load().await.unwrap(), Prefs::default());

        prefs_store
            .save(Prefs {
                cellular_consent: true,
            })
            .await
            .unwrap();
        assert!(prefs_store.load().await.unwrap().cellular_consent);
    }
}
