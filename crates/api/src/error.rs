/// Errors the CLI boundary can surface, mapped to the exit codes spec.md §6
/// assigns: `2` precondition failure, `3` non-retryable server/storage
/// error, `4` integrity mismatch, `5` canceled.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    #[error(transparent)]
    Platform(#[from] platform::PlatformError),

    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    #[error("unknown tier '{0}'")]
    UnknownTier(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(e) => engine_exit_code(e),
            CliError::Platform(_) => 2,
            CliError::Storage(_) => 3,
            CliError::UnknownTier(_) => 2,
        }
    }
}

fn engine_exit_code(err: &engine::EngineError) -> i32 {
    use engine::EngineError::*;
    match err {
        NetworkUnavailable | CellularConsentRequired | InsufficientStorage { .. } => 2,
        IntegrityMismatch { .. } => 4,
        Canceled => 5,
        _ => 3,
    }
}
