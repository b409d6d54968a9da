//! Classification of decoded frames into stream events.

/// Payload that ends a stream successfully.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Payload prefix that ends a stream with a server-side failure.
pub const STREAM_ERROR_PREFIX: &str = "[STREAM ERROR]";

const DATA_PREFIX: &str = "data: ";
const COMMENT_PREFIX: char = ':';

/// One application-level event carried by a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A fragment of generated text, verbatim.
    Token(String),
    /// Keep-alive comment; carries nothing.
    Heartbeat,
    /// Successful end of stream.
    Done,
    /// Server-reported failure with its message.
    StreamError(String),
}

/// Classify a complete frame. Blank frames carry no event.
///
/// # Example
/// ```
/// use agent_stream::event::{classify, Event};
///
/// assert_eq!(classify("data: hello"), Some(Event::Token("hello".into())));
/// assert_eq!(classify(": ping"), Some(Event::Heartbeat));
/// assert_eq!(classify("data: [DONE]"), Some(Event::Done));
/// assert_eq!(classify("  "), None);
/// ```
pub fn classify(frame: &str) -> Option<Event> {
    let frame = frame.trim();
    if frame.is_empty() {
        return None;
    }
    if frame.starts_with(COMMENT_PREFIX) {
        return Some(Event::Heartbeat);
    }

    let payload = strip_data_prefix(frame);
    if is_done_marker(payload) {
        return Some(Event::Done);
    }
    if let Some(message) = payload.strip_prefix(STREAM_ERROR_PREFIX) {
        return Some(Event::StreamError(message.trim().to_string()));
    }
    Some(Event::Token(payload.to_string()))
}

/// Remove a leading `data: ` field name, if present.
///
/// Unlike a general SSE parser, the payload is not trimmed: tokens are
/// passed through exactly as sent.
///
/// # Example
/// ```
/// use agent_stream::event::strip_data_prefix;
///
/// assert_eq!(strip_data_prefix("data: {\"k\": 1}"), "{\"k\": 1}");
/// assert_eq!(strip_data_prefix("data:  two spaces"), " two spaces");
/// assert_eq!(strip_data_prefix("bare"), "bare");
/// ```
pub fn strip_data_prefix(frame: &str) -> &str {
    frame.strip_prefix(DATA_PREFIX).unwrap_or(frame)
}

/// Check if a payload is the end-of-stream marker.
///
/// # Example
/// ```
/// use agent_stream::event::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker(" [DONE]"));
/// ```
pub fn is_done_marker(payload: &str) -> bool {
    payload == DONE_SENTINEL
}
