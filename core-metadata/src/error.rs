use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Remote account not configured: {0}")]
    NotConfigured(String),

    #[error("Remote API error {code}: {message}")]
    RemoteApi { code: i32, message: String },

    #[error("Failed to parse remote response: {0}")]
    JsonParse(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
