use thiserror::Error;

/// Failures of the remote note store.
///
/// Cloneable so an editor can hold on to the last failed save and show it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("not logged in or session expired")]
    Unauthorized,
    #[error("note not found: {0}")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("request task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
