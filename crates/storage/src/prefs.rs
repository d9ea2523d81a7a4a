use serde::{Deserialize, Serialize};

use crate::{error::StorageError, layout::Layout, state_store::write_atomic};

/// Tier-independent preferences that outlive any one session's snapshot.
///
/// Today this is just the metered-network consent flag (§6 `grantCellular`):
/// without persisting it, every process restart would re-prompt the user
/// even though they already granted consent in a prior run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prefs {
    #[serde(rename = "cellularConsent")]
    pub cellular_consent: bool,
}

pub struct PrefsStore {
    layout: Layout,
}

impl PrefsStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub async fn load(&self) -> Result<Prefs, StorageError> {
        let path = self.layout.prefs_path();
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(serde_json::from_slice(&body).unwrap_or_default()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Prefs::default()),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    pub async fn save(&self, prefs: Prefs) -> Result<(), StorageError> {
        let path = self.layout.prefs_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let body = serde_json::to_vec_pretty(&prefs).expect("prefs are always serializable");
        let tmp = path.with_extension("json.tmp");
        write_atomic(&tmp, &path, &body).await
    }
}
