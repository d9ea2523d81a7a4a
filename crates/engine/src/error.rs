/// Error kinds, propagated as a tagged enum rather than exceptions-for-
/// control-flow (§7). `retryable()` implements the classification §4.4 uses
/// to decide backoff-and-retry vs. escalate-to-terminal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    // --- preconditions (§7: user-surfaced, session-terminal until remedied)
    #[error("network is unavailable")]
    NetworkUnavailable,
    #[error("connection is metered and the user has not granted consent")]
    CellularConsentRequired,
    #[error("insufficient storage: need {required} bytes, have {available} bytes")]
    InsufficientStorage { required: u64, available: u64 },

    // --- per-request (§4.1, §4.3, §7)
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    HttpError(u16),
    #[error("could not determine file size from response headers")]
    FileSizeNotAvailable,
    #[error("server did not honor the range request")]
    RangeNotHonored,
    #[error("transfer truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error("request timed out")]
    Timeout,
    #[error("network connection lost: {0}")]
    NetworkLost(String),

    // --- post-merge (§7: file-terminal, session continues for siblings)
    #[error("integrity mismatch: expected {expected} bytes, got {actual}")]
    IntegrityMismatch { expected: u64, actual: u64 },

    // --- filesystem
    #[error("filesystem error: {0}")]
    Io(String),

    // --- user-initiated (§7: not an error to report, but stops propagation)
    #[error("canceled")]
    Canceled,
}

impl EngineError {
    /// Classifies an error as retryable per §4.4: network drops, timeouts,
    /// 5xx, and connection resets are retried with backoff; everything else
    /// (4xx other than 408/429, a `RangeNotHonored` after the server already
    /// returned 200 once, precondition failures) is terminal for the chunk.
    pub fn retryable(&self) -> bool {
        match self {
            EngineError::NetworkLost(_) | EngineError::Timeout => true,
            EngineError::HttpError(code) => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<storage::StorageError> for EngineError {
    fn from(err: storage::StorageError) -> Self {
        EngineError::Io(err.to_string())
    }
}
