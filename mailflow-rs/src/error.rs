use crate::monitoring::{Protocol, TransactionStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailflowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("{protocol} transport error: {source}")]
    Transport {
        protocol: Protocol,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Polling cancelled")]
    Cancelled,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MailflowError {
    /// Wrap an error raised by a Sender or Receiver implementation
    pub fn transport<E>(protocol: Protocol, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        MailflowError::Transport {
            protocol,
            source: error.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MailflowError>;
