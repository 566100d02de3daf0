use thiserror::Error;

/// Errors from a [`GameStore`](crate::GameStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the write.
    #[error("failed to save snapshot: {0}")]
    SaveFailed(String),

    /// The backend failed to read.
    #[error("failed to load snapshot: {0}")]
    LoadFailed(String),

    /// The backend is unreachable or not accepting requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
