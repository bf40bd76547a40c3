//! Error types for the wallet analysis client

use thiserror::Error;

/// Wallet analysis client error
///
/// Every variant renders a message suitable for direct display. Messages that
/// originate from the backend are carried verbatim.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// Network/connectivity failure or a non-2xx status without a usable body
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend returned a well-formed error (message passed through verbatim)
    #[error("{0}")]
    ServerRejected(String),

    /// Response envelope present but missing or mistyping required fields
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Report requested before the job completed
    #[error("Report unavailable: {0}")]
    ReportUnavailable(String),

    /// Requested artifact encoding is not supported
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Report data violates a structural invariant
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// Wallet list failed validation before submission
    #[error("Invalid wallet list: {0}")]
    InvalidWalletList(String),

    /// Local filesystem error while handling an artifact
    #[error("I/O error: {0}")]
    Io(String),

    /// Status poller task ended without reaching a terminal state
    #[error("Status poller aborted: {0}")]
    PollerAborted(String),

    /// Client configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Whether the failure came from the transport layer rather than the backend
    pub fn is_transport(&self) -> bool {
        matches!(self, AnalysisError::Transport(_))
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AnalysisError::MalformedResponse(err.to_string())
        } else {
            AnalysisError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::MalformedResponse(err.to_string())
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::Io(err.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
