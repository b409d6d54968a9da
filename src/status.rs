//! Request state machine shared by single-shot and streaming requests.
//!
//! ```text
//! Idle ──ask_once──▶ Loading ───▶ Idle | Error
//! Idle ─ask_stream─▶ Streaming ─▶ Idle | Error   (stop ⇒ Error{Aborted})
//! ```
//!
//! At most one request is active. What happens when a second one is
//! started is decided by [`ConcurrencyPolicy`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::client::{Backend, ClientError, ErrorKind};
use crate::stream::{CancelHandle, StreamHandle, StreamSession};

/// Externally visible status of an [`Agent`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Idle,
    /// A single-shot request is in flight.
    Loading,
    /// A streaming session is in flight.
    Streaming,
    /// The last request failed or was stopped; `kind` tells which.
    Error { kind: ErrorKind, message: String },
}

impl RequestStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, RequestStatus::Loading | RequestStatus::Streaming)
    }

    /// Whether the last request was stopped by the caller rather than failing.
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            RequestStatus::Error {
                kind: ErrorKind::Aborted,
                ..
            }
        )
    }

    fn settled(error: Option<&ClientError>) -> Self {
        match error {
            None => RequestStatus::Idle,
            Some(e) => RequestStatus::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Idle => f.write_str("idle"),
            RequestStatus::Loading => f.write_str("waiting for response"),
            RequestStatus::Streaming => f.write_str("streaming"),
            RequestStatus::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

/// What to do when a request starts while another is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// Fail the new request with [`ClientError::Busy`].
    #[default]
    Reject,
    /// Cancel the active request and let the new one take over.
    Replace,
}

#[derive(Debug, Default)]
struct Inner {
    status: RequestStatus,
    response: String,
    /// Bumped by every accepted request; stale requests compare unequal.
    generation: u64,
    active: Option<CancelHandle>,
}

impl Inner {
    fn begin(
        &mut self,
        policy: ConcurrencyPolicy,
        status: RequestStatus,
        cancel: CancelHandle,
    ) -> Result<u64, ClientError> {
        if self.status.is_busy() {
            match policy {
                ConcurrencyPolicy::Reject => return Err(ClientError::Busy),
                ConcurrencyPolicy::Replace => {
                    if let Some(previous) = self.active.take() {
                        debug!(generation = self.generation, "replacing active request");
                        previous.cancel();
                    }
                }
            }
        }
        self.generation += 1;
        self.status = status;
        self.response.clear();
        self.active = Some(cancel);
        Ok(self.generation)
    }

    fn finish(&mut self, generation: u64, error: Option<&ClientError>) {
        if generation != self.generation {
            return;
        }
        self.status = RequestStatus::settled(error);
        self.active = None;
    }
}

/// Front end that tracks status and the accumulated answer text.
///
/// Cloning yields another handle to the same state.
///
/// # Example
/// ```no_run
/// use agent_stream::http::HttpBackend;
/// use agent_stream::options::ClientOptions;
/// use agent_stream::status::Agent;
///
/// # async fn demo() -> Result<(), agent_stream::ClientError> {
/// let agent = Agent::new(HttpBackend::new(ClientOptions::from_env()?)?);
/// let handle = agent.ask_stream("Tell me a joke", |token| print!("{token}"))?;
/// let outcome = handle.join().await;
/// println!("{} -> {}", agent.status(), agent.response());
/// # outcome
/// # }
/// ```
pub struct Agent<B: ?Sized> {
    backend: Arc<B>,
    policy: ConcurrencyPolicy,
    inner: Arc<Mutex<Inner>>,
}

impl<B: ?Sized> Clone for Agent<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            policy: self.policy,
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> Agent<B> {
    pub fn new(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }
}

impl<B: Backend + ?Sized> Agent<B> {
    pub fn from_arc(backend: Arc<B>) -> Self {
        Self {
            backend,
            policy: ConcurrencyPolicy::default(),
            inner: Arc::default(),
        }
    }

    /// Set the policy for overlapping requests.
    pub fn with_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn status(&self) -> RequestStatus {
        self.inner.lock().status.clone()
    }

    /// Answer text of the current (or last) request, as received so far.
    pub fn response(&self) -> String {
        self.inner.lock().response.clone()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Stop the active request, if any.
    pub fn stop(&self) {
        if let Some(active) = &self.inner.lock().active {
            active.cancel();
        }
    }

    /// Run one single-shot exchange, moving through `Loading`.
    pub async fn ask_once(&self, prompt: &str) -> Result<String, ClientError> {
        let cancel = CancelHandle::new();
        let generation = self
            .inner
            .lock()
            .begin(self.policy, RequestStatus::Loading, cancel.clone())?;

        let mut pending = Pending {
            inner: &self.inner,
            generation,
            armed: true,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.token().cancelled() => Err(ClientError::Aborted),
            answer = self.backend.ask(prompt) => answer,
        };

        pending.armed = false;
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            if let Ok(answer) = &result {
                inner.response = answer.clone();
            }
        }
        inner.finish(generation, result.as_ref().err());
        result
    }
}

impl<B: Backend + ?Sized + 'static> Agent<B> {
    /// Start a streaming exchange in the background, moving through
    /// `Streaming`.
    ///
    /// Each token is appended to [`response`](Self::response) and then
    /// passed to `on_token`, in arrival order. Tokens of a request that has
    /// been replaced reach neither. Fails with [`ClientError::Config`] when
    /// called outside a tokio runtime.
    pub fn ask_stream<F>(&self, question: &str, mut on_token: F) -> Result<StreamHandle, ClientError>
    where
        F: FnMut(String) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::Config("streaming requires a tokio runtime".to_string()))?;

        let session = StreamSession::new(self.backend.clone(), question);
        let cancel = session.cancel_handle();
        let generation =
            self.inner
                .lock()
                .begin(self.policy, RequestStatus::Streaming, cancel.clone())?;

        let shared = self.inner.clone();
        let sink = {
            let shared = self.inner.clone();
            move |token: String| {
                {
                    let mut inner = shared.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.response.push_str(&token);
                }
                on_token(token);
            }
        };

        let task = runtime.spawn(async move {
            let outcome = session.run(sink).await;
            shared.lock().finish(generation, outcome.as_ref().err());
            outcome
        });
        Ok(StreamHandle::new(cancel, task))
    }
}

/// Settles a single-shot request as aborted if its future is dropped
/// before completing.
struct Pending<'a> {
    inner: &'a Mutex<Inner>,
    generation: u64,
    armed: bool,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(generation = self.generation, "single-shot request dropped");
            self.inner
                .lock()
                .finish(self.generation, Some(&ClientError::Aborted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ask_once_success() {
        let agent = Agent::new(FakeBackend::answering("forty-two"));
        assert_eq!(agent.status(), RequestStatus::Idle);

        let answer = agent.ask_once("meaning?").await.unwrap();
        assert_eq!(answer, "forty-two");
        assert_eq!(agent.response(), "forty-two");
        assert_eq!(agent.status(), RequestStatus::Idle);
    }

    #[tokio::test]
    async fn test_stream_accumulates_and_returns_to_idle() {
        let agent = Agent::new(FakeBackend::streaming(&[
            b"data: hello\n\n",
            b"data:  world\n\ndata: [DONE]\n\n",
        ]));
        let handle = agent.ask_stream("q", |_| {}).unwrap();
        assert_eq!(agent.status(), RequestStatus::Streaming);

        handle.join().await.unwrap();
        assert_eq!(agent.response(), "hello world");
        assert_eq!(agent.status(), RequestStatus::Idle);
    }

    #[tokio::test]
    async fn test_server_error_keeps_partial_response() {
        let agent = Agent::new(FakeBackend::streaming(&[
            b"data: part\n\ndata: [STREAM ERROR] model overloaded\n\n",
        ]));
        let err = agent.ask_stream("q", |_| {}).unwrap().join().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServerReported);
        assert_eq!(agent.response(), "part");
        assert_eq!(
            agent.status(),
            RequestStatus::Error {
                kind: ErrorKind::ServerReported,
                message: "model overloaded".into()
            }
        );
        assert!(!agent.status().is_aborted());
    }

    #[tokio::test]
    async fn test_stop_maps_to_aborted_status() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: a\n\n"]).hanging());
        let handle = agent.ask_stream("q", |_| {}).unwrap();
        tokio::task::yield_now().await;

        agent.stop();
        assert!(handle.join().await.unwrap_err().is_aborted());

        let status = agent.status();
        assert!(status.is_aborted());
        assert_eq!(status.to_string(), "error: aborted by user");

        // stopping again once finished changes nothing
        agent.stop();
        assert_eq!(agent.status(), status);
    }

    #[tokio::test]
    async fn test_new_request_clears_previous_response() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: one\n\ndata: [DONE]\n\n"]));
        agent.ask_stream("q", |_| {}).unwrap().join().await.unwrap();
        assert_eq!(agent.response(), "one");

        let handle = agent.ask_stream("q", |_| {}).unwrap();
        assert_eq!(agent.response(), "");
        handle.join().await.unwrap();
        assert_eq!(agent.response(), "one");
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_overlap() {
        let agent = Agent::new(FakeBackend::streaming(&[]).hanging());
        let handle = agent.ask_stream("first", |_| {}).unwrap();

        assert!(matches!(agent.ask_stream("second", |_| {}), Err(ClientError::Busy)));
        assert!(matches!(agent.ask_once("third").await, Err(ClientError::Busy)));
        assert_eq!(agent.status(), RequestStatus::Streaming);
        assert!(!handle.is_finished());

        handle.cancel();
        assert!(handle.join().await.unwrap_err().is_aborted());
        assert!(agent.status().is_aborted());
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_stream_while_loading() {
        let agent = Agent::new(FakeBackend::streaming(&[]));
        let loading = tokio::spawn({
            let agent = agent.clone();
            async move { agent.ask_once("slow").await }
        });
        tokio::task::yield_now().await;
        assert_eq!(agent.status(), RequestStatus::Loading);

        assert!(matches!(agent.ask_stream("q", |_| {}), Err(ClientError::Busy)));

        agent.stop();
        assert!(loading.await.unwrap().unwrap_err().is_aborted());
        assert!(agent.status().is_aborted());
    }

    #[tokio::test]
    async fn test_replace_policy_cancels_previous() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: new\n\ndata: [DONE]\n\n"]))
            .with_policy(ConcurrencyPolicy::Replace);

        let first = agent.ask_stream("first", |_| {}).unwrap();
        let second = agent.ask_stream("second", |_| {}).unwrap();
        assert_eq!(agent.status(), RequestStatus::Streaming);

        let (first, second) = tokio::join!(first.join(), second.join());
        assert!(first.unwrap_err().is_aborted());
        assert!(second.is_ok());
        assert_eq!(agent.status(), RequestStatus::Idle);
        assert_eq!(agent.response(), "new");
    }

    #[tokio::test]
    async fn test_replace_policy_cancels_loading() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: [DONE]\n\n"]))
            .with_policy(ConcurrencyPolicy::Replace);
        let loading = tokio::spawn({
            let agent = agent.clone();
            async move { agent.ask_once("slow").await }
        });
        tokio::task::yield_now().await;
        assert_eq!(agent.status(), RequestStatus::Loading);

        agent.ask_stream("q", |_| {}).unwrap().join().await.unwrap();
        assert!(loading.await.unwrap().unwrap_err().is_aborted());
        assert_eq!(agent.status(), RequestStatus::Idle);
    }

    #[tokio::test]
    async fn test_dropped_single_shot_settles_as_aborted() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: ok\n\ndata: [DONE]\n\n"]));
        let slow = tokio::time::timeout(Duration::from_millis(20), agent.ask_once("slow"));
        assert!(slow.await.is_err());

        assert!(agent.status().is_aborted());
        assert!(agent.inner.lock().active.is_none());

        agent.ask_stream("q", |_| {}).unwrap().join().await.unwrap();
        assert_eq!(agent.status(), RequestStatus::Idle);
        assert_eq!(agent.response(), "ok");
    }

    #[tokio::test]
    async fn test_stream_callback_sees_tokens_in_order() {
        let agent = Agent::new(FakeBackend::streaming(&[
            b"data: one\n\n: hb\n\ndata: two\n",
            b"\ndata: three\n\ndata: [DONE]\n\n",
        ]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let response_at_callback = Arc::new(Mutex::new(Vec::new()));
        let snapshots = response_at_callback.clone();
        let observer = agent.clone();

        agent
            .ask_stream("q", move |token| {
                snapshots.lock().push(observer.response());
                sink.lock().push(token);
            })
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec!["one", "two", "three"]);
        assert_eq!(*response_at_callback.lock(), vec!["one", "onetwo", "onetwothree"]);
    }

    #[tokio::test]
    async fn test_replaced_stream_callback_goes_quiet() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: a\n\n"]).hanging())
            .with_policy(ConcurrencyPolicy::Replace);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let first = agent.ask_stream("first", move |t| sink.lock().push(t)).unwrap();
        while seen.lock().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(*seen.lock(), vec!["a"]);

        let second = agent.ask_stream("second", |_| {}).unwrap();
        assert!(first.join().await.unwrap_err().is_aborted());
        second.cancel();
        assert!(second.join().await.unwrap_err().is_aborted());
        assert_eq!(*seen.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_cancel_after_error_is_noop() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: [STREAM ERROR] x\n\n"]));
        let handle = agent.ask_stream("q", |_| {}).unwrap();
        let stop = handle.cancel_handle();

        let err = handle.join().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerReported);
        let expected = RequestStatus::Error {
            kind: ErrorKind::ServerReported,
            message: "x".into(),
        };
        assert_eq!(agent.status(), expected);

        stop.cancel();
        agent.stop();
        assert_eq!(agent.status(), expected);
        assert!(!agent.status().is_aborted());
    }

    #[test]
    fn test_stream_outside_runtime_leaves_status_idle() {
        let agent = Agent::new(FakeBackend::streaming(&[b"data: [DONE]\n\n"]));
        let err = agent.ask_stream("q", |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(agent.status(), RequestStatus::Idle);
        assert!(agent.inner.lock().active.is_none());
    }

    #[test]
    fn test_stale_request_does_not_touch_state() {
        let agent = Agent::new(FakeBackend::answering("late")).with_policy(ConcurrencyPolicy::Replace);
        let mut inner = agent.inner.lock();
        let stale = inner
            .begin(ConcurrencyPolicy::Replace, RequestStatus::Loading, CancelHandle::new())
            .unwrap();
        let current = inner
            .begin(ConcurrencyPolicy::Replace, RequestStatus::Streaming, CancelHandle::new())
            .unwrap();

        inner.finish(stale, Some(&ClientError::Aborted));
        assert_eq!(inner.status, RequestStatus::Streaming);

        inner.finish(current, None);
        assert_eq!(inner.status, RequestStatus::Idle);
    }
}
