use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Every connected peer's outbound queue is at its high-water mark.
    #[error("send would block")]
    WouldBlock,

    #[error("connection closed by peer")]
    Closed,

    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start transport thread: {0}")]
    Thread(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
