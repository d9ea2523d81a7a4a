use std::path::PathBuf;

use crate::error::PlatformError;

/// Resolves the application's persistent data directory, the root the
/// on-disk layout in §6 is built under.
pub fn persistent_data_dir() -> Result<PathBuf, PlatformError> {
    dirs::data_dir()
        .map(|dir| dir.join("fluxdm"))
        .ok_or(PlatformError::NoDataDir)
}
