/// Errors returned by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the trimmed response body.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl ClientError {
    /// HTTP status of a rejected request, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            ClientError::Invalid(_) => None,
        }
    }
}
