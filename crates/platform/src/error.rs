use std::path::PathBuf;

/// Precondition and environment errors (§7): network reachability, metered
/// consent, storage capacity, and data-directory resolution.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("no persistent data directory is available on this platform")]
    NoDataDir,

    #[error("failed to inspect free space at {path:?}: {source}")]
    DiskStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network is unavailable")]
    NetworkUnavailable,

    #[error("connection is metered and the user has not granted consent")]
    CellularConsentRequired,
}
