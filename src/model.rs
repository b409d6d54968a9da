//! JSON bodies exchanged with the inference service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback message when a failing single-shot response carries no usable `detail`.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Single-shot request body.
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub prompt: &'a str,
}

/// Single-shot success body. A missing `response` reads as empty text.
#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub response: String,
}

/// Streaming request body.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRequest<'a> {
    pub question: &'a str,
}

/// Error body of a failing response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorDetail {
    /// Extract the message from a raw error body, or [`UNKNOWN_ERROR`].
    ///
    /// # Example
    /// ```
    /// use agent_stream::model::ErrorDetail;
    ///
    /// assert_eq!(ErrorDetail::message_from(r#"{"detail":"bad prompt"}"#), "bad prompt");
    /// assert_eq!(ErrorDetail::message_from("<html>oops</html>"), "Unknown error");
    /// ```
    pub fn message_from(body: &str) -> String {
        serde_json::from_str::<ErrorDetail>(body)
            .ok()
            .and_then(|e| e.detail)
            .and_then(|detail| match detail {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
    }
}

/// Health check body.
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub ok: bool,
}
