use thiserror::Error;

/// Error types for the classroom client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unauthorized: credential rejected by server")]
    Unauthorized {
        /// Whether this response was the one that cleared the stored token
        credential_cleared: bool,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Credential errors
    #[error("No auth token available")]
    MissingToken,

    /// Real-time channel errors
    #[error("Real-time connection failed: {0}")]
    Connection(String),

    #[error("Real-time channel is not connected")]
    NotConnected,

    #[error("Connection manager has been shut down")]
    ShutDown,

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Helper to create real-time connection errors
    pub fn connection(msg: impl Into<String>) -> Self {
        ClientError::Connection(msg.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}
