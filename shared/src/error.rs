use thiserror::Error;

/// Errors surfaced to whoever edits the endpoint list. Probe failures never
/// show up here: they become offline snapshots instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("invalid endpoint: {0}")]
    InvalidInput(String),
}

impl MonitorError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        MonitorError::InvalidInput(reason.into())
    }
}
