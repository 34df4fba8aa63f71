use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status}: {body}")]
    Status { status: String, body: String },
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("OAuth error: {0}")]
    OAuth(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Notification failed: {0}")]
    Notify(String),
}

pub type Result<T> = std::result::Result<T, ReminderError>;
