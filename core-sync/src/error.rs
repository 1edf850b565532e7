use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A manual action was given an empty or oversized selection.
    #[error("Invalid selection: {reason}")]
    InvalidSelection { reason: String },

    #[error("{failed} of {total} items failed: {message}")]
    BatchFailed {
        failed: usize,
        total: usize,
        message: String,
    },

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Worker task failed: {0}")]
    TaskFailed(String),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Remote error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Settings error: {0}")]
    Settings(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
