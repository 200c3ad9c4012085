use reqwest::StatusCode;
use tutor_core::assessment::AssessmentError;

/// Failure to obtain a credential for the tutor service.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No credential is available: {0}")]
    Unavailable(String),
    #[error("Failed to read credential file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("The service rejected the credential ({0})")]
    Unauthorized(StatusCode),
    #[error("The service returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("Unexpected response body: {0}")]
    Decode(String),
    #[error("The session stream failed: {0}")]
    Stream(String),
    #[error("The message could not be delivered: {0}")]
    SendFailed(String),
    #[error("Still waiting for the tutor to answer the previous message")]
    Busy,
    #[error("A message must not be empty")]
    EmptyMessage,
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error("Could not reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("The session has been closed")]
    Closed,
}

impl ClientError {
    /// Whether a user-triggered retry of the same operation can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Stream(_) | ClientError::SendFailed(_) => true,
            ClientError::Http { status, .. } => status.is_server_error(),
            ClientError::ReconnectExhausted { .. } => true,
            _ => false,
        }
    }
}
