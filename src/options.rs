//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_ASK_PATH: &str = "/ask";
pub const DEFAULT_STREAM_PATH: &str = "/ask_sse_post";
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Environment variable holding the service base URL.
pub const ENV_API_BASE: &str = "AGENT_API_BASE";
/// Environment variable holding the single-shot timeout, in whole seconds.
pub const ENV_TIMEOUT_SECS: &str = "AGENT_TIMEOUT_SECS";
/// Environment variable holding an HTTP proxy URL.
pub const ENV_PROXY: &str = "AGENT_PROXY";

/// Where the inference service lives and how to reach it.
///
/// # Example
/// ```rust
/// use agent_stream::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new("http://127.0.0.1:9000")
///     .with_timeout(Duration::from_secs(30))
///     .with_header("X-Client".to_string(), "demo".to_string());
///
/// assert_eq!(options.endpoint(&options.ask_path), "http://127.0.0.1:9000/ask");
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Scheme, host and port of the service, without a trailing path
    pub base_url: String,

    /// Single-shot endpoint path
    pub ask_path: String,

    /// Streaming endpoint path
    pub stream_path: String,

    /// Liveness endpoint path
    pub health_path: String,

    /// Whole-request timeout for single-shot and health calls.
    /// Streams are never bounded by it.
    pub timeout: Option<Duration>,

    /// Connection establishment timeout (applies to every call)
    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientOptions {
    /// Create options for the service at `base_url` with default paths.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ask_path: DEFAULT_ASK_PATH.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            timeout: None,
            connect_timeout: None,
            proxy: None,
            extra_headers: None,
        }
    }

    /// Build options from `AGENT_API_BASE`, `AGENT_TIMEOUT_SECS` and `AGENT_PROXY`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_API_BASE)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut options = Self::new(base_url);

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("{ENV_TIMEOUT_SECS} must be whole seconds, got {raw:?}"))
            })?;
            options.timeout = Some(Duration::from_secs(secs));
        }

        options.proxy = lookup(ENV_PROXY).filter(|s| !s.trim().is_empty());
        Ok(options)
    }

    /// Absolute URL for an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Set the single-shot timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Override the streaming endpoint path.
    pub fn with_stream_path(mut self, path: String) -> Self {
        self.stream_path = path;
        self
    }

    /// Override the single-shot endpoint path.
    pub fn with_ask_path(mut self, path: String) -> Self {
        self.ask_path = path;
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}
