//! Core backend trait and error types.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use thiserror::Error;

/// Raw response body of a streaming exchange, chunked at arbitrary boundaries.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Errors that can occur during client operations.
///
/// Every variant displays as a human-readable message suitable for showing
/// to a user as-is.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The call could not be made or the connection broke mid-body.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{message}")]
    BadStatus { status: StatusCode, message: String },

    /// A body was received but could not be understood.
    #[error("Malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    /// The stream carried a `[STREAM ERROR]` frame.
    #[error("{0}")]
    ServerReported(String),

    /// The body ended before `[DONE]` or `[STREAM ERROR]` arrived.
    #[error("stream ended without termination signal")]
    IncompleteStream,

    /// The caller cancelled the request.
    #[error("aborted by user")]
    Aborted,

    /// Another request is already active and the policy rejects a second one.
    #[error("a request is already in progress")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Field-less discriminant of [`ClientError`].
///
/// Lets status displays tell a user-initiated stop apart from a failure
/// without holding on to the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    BadStatus,
    MalformedBody,
    ServerReported,
    IncompleteStream,
    Aborted,
    Busy,
    Config,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::BadStatus { .. } => ErrorKind::BadStatus,
            ClientError::MalformedBody(_) => ErrorKind::MalformedBody,
            ClientError::ServerReported(_) => ErrorKind::ServerReported,
            ClientError::IncompleteStream => ErrorKind::IncompleteStream,
            ClientError::Aborted => ErrorKind::Aborted,
            ClientError::Busy => ErrorKind::Busy,
            ClientError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this error is the result of a caller-requested cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }
}

/// Transport seam between the streaming core and the inference service.
///
/// [`HttpBackend`](crate::http::HttpBackend) is the production
/// implementation. The session and state machine only ever see this trait,
/// so any byte source can drive them.
///
/// # Required Methods
/// - `ask`: one complete single-shot exchange
/// - `open_stream`: start a streaming exchange and hand back its raw body
/// - `health`: liveness check
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send `prompt` and wait for the complete answer text.
    async fn ask(&self, prompt: &str) -> Result<String, ClientError>;

    /// Send `question` to the streaming endpoint.
    ///
    /// Resolves once the response head has been accepted. Failing statuses
    /// are reported here, never through the returned stream.
    async fn open_stream(&self, question: &str) -> Result<ByteStream, ClientError>;

    /// Returns `true` when the service reports itself healthy.
    async fn health(&self) -> Result<bool, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_user_facing_message() {
        let err = ClientError::BadStatus {
            status: StatusCode::BAD_REQUEST,
            message: "bad prompt".to_string(),
        };
        assert_eq!(err.to_string(), "bad prompt");
        assert_eq!(
            ClientError::ServerReported("model overloaded".into()).to_string(),
            "model overloaded"
        );
        assert_eq!(ClientError::Aborted.to_string(), "aborted by user");
    }

    #[test]
    fn test_aborted_is_distinguishable() {
        assert!(ClientError::Aborted.is_aborted());
        assert_eq!(ClientError::Aborted.kind(), ErrorKind::Aborted);
        assert!(!ClientError::ServerReported("x".into()).is_aborted());
        assert!(!ClientError::IncompleteStream.is_aborted());
        assert_eq!(
            ClientError::IncompleteStream.kind(),
            ErrorKind::IncompleteStream
        );
    }

    #[test]
    fn test_json_errors_map_to_malformed_body() {
        let err: ClientError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::MalformedBody);
    }
}
