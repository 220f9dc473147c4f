use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Message too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("Transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("Inbound queue closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
