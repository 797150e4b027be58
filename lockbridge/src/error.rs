//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] lockbridge_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] lockbridge_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] lockbridge_types::Error),

    #[error("Remote unlock already in progress")]
    UnlockInProgress,

    #[error("Clear data already in progress")]
    ClearInProgress,

    #[error("Outbound queue closed")]
    QueueClosed,

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Rejections caused by an operation already running
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::UnlockInProgress | Error::ClearInProgress)
    }
}
