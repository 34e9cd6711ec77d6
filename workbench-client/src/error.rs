//! Errors from talking to the Spec & Validation Provider
//!
//! A failed call is never retried, so each variant says what the caller can
//! still do: try again later, fix the request, or report a broken provider.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Status the provider answers with for a model it does not know
const UNKNOWN_MODEL_STATUS: u16 = 404;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No answer: connection refused, reset or timed out
    #[error("Provider unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The provider answered `endpoint` with a non-success status
    #[error("Provider rejected {endpoint} (status {status}): {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The answer was not the document `endpoint` is expected to return
    #[error("Unexpected reply from {endpoint}: {reason}")]
    UnexpectedReply { endpoint: String, reason: String },

    /// The argument map could not be encoded for validation
    #[error("Cannot encode arguments for validation: {0}")]
    EncodeArgs(#[source] serde_json::Error),
}

impl ClientError {
    /// True when the provider does not know the requested model
    pub fn is_unknown_model(&self) -> bool {
        matches!(
            self,
            Self::Rejected { status, .. } if *status == UNKNOWN_MODEL_STATUS
        )
    }
}
