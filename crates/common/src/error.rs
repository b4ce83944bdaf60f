use std::path::PathBuf;

/// Alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the planning state core.
///
/// `InvalidState` marks a structural precondition the caller broke (refining
/// a refined node, coarsening a leaf) and is meant to propagate. `NotFound`
/// is a recoverable lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An operation was invoked in a state that does not permit it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A session, scenario, or node lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// An argument was malformed or out of range.
    #[error("validation error: {0}")]
    Validation(String),

    /// A keyed entry with the same key is already registered.
    #[error("already exists: {0}")]
    Duplicate(String),

    /// Reading an external resource failed.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Whether the caller is expected to recover (fall back, retry, ask the
    /// user) rather than treat the error as a bug.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidState(_))
    }
}
