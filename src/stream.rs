//! Streaming sessions: one cancellable exchange with the streaming endpoint.
//!
//! A [`StreamSession`] opens the request, feeds the body through a
//! [`FrameDecoder`], classifies each frame and hands tokens to the caller's
//! sink, in arrival order, until exactly one terminal outcome is reached:
//!
//! | outcome                    | result                               |
//! |----------------------------|--------------------------------------|
//! | cancelled                  | `Err(ClientError::Aborted)`          |
//! | `[DONE]`                   | `Ok(())`                             |
//! | `[STREAM ERROR] msg`       | `Err(ClientError::ServerReported)`   |
//! | body ends without either   | `Err(ClientError::IncompleteStream)` |
//! | request could not start    | `Err(Transport / BadStatus / ...)`   |
//!
//! Tokens delivered before a failure stay delivered.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::client::{Backend, ClientError};
use crate::event::{classify, Event};
use crate::sse::FrameDecoder;

/// Owned handle that stops one request.
///
/// Cheap to clone; every clone controls the same request. Cancelling after
/// the request has finished does nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next read or frame.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.0
    }
}

/// One streaming exchange, not yet started.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use agent_stream::http::HttpBackend;
/// use agent_stream::options::ClientOptions;
/// use agent_stream::stream::StreamSession;
///
/// # async fn demo() -> Result<(), agent_stream::ClientError> {
/// let backend = Arc::new(HttpBackend::new(ClientOptions::default())?);
/// let session = StreamSession::new(backend, "What is Rust?");
/// let stop = session.cancel_handle();
///
/// let mut answer = String::new();
/// session.run(|token| answer.push_str(&token)).await?;
/// # drop(stop);
/// # Ok(())
/// # }
/// ```
pub struct StreamSession<B: ?Sized> {
    backend: Arc<B>,
    question: String,
    cancel: CancelHandle,
}

impl<B: Backend + ?Sized> StreamSession<B> {
    pub fn new(backend: Arc<B>, question: impl Into<String>) -> Self {
        Self {
            backend,
            question: question.into(),
            cancel: CancelHandle::new(),
        }
    }

    /// Handle that cancels this session. Can be taken before `run`.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drive the session to its terminal outcome, calling `on_token` for
    /// every token in arrival order.
    pub async fn run<F>(self, on_token: F) -> Result<(), ClientError>
    where
        F: FnMut(String),
    {
        let cancel = self.cancel.token().clone();
        debug!(question_len = self.question.len(), "opening stream");

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Aborted),
            opened = self.backend.open_stream(&self.question) => opened,
        };

        let outcome = match body {
            Ok(body) => drive(body, &cancel, on_token).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => debug!("stream completed"),
            Err(e) => debug!(kind = ?e.kind(), error = %e, "stream terminated"),
        }
        outcome
    }
}

impl<B: Backend + ?Sized + 'static> StreamSession<B> {
    /// Run the session on the tokio runtime.
    pub fn spawn<F>(self, on_token: F) -> StreamHandle
    where
        F: FnMut(String) + Send + 'static,
    {
        let cancel = self.cancel_handle();
        let task = tokio::spawn(self.run(on_token));
        StreamHandle::new(cancel, task)
    }
}

/// A session running in the background.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancelHandle,
    task: JoinHandle<Result<(), ClientError>>,
}

impl StreamHandle {
    pub(crate) fn new(cancel: CancelHandle, task: JoinHandle<Result<(), ClientError>>) -> Self {
        Self { cancel, task }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn join(self) -> Result<(), ClientError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ClientError::Aborted),
        }
    }
}

/// Consume a response body until a terminal event, end of body or
/// cancellation, whichever comes first.
///
/// Cancellation is checked before every read and before every frame, so a
/// sink that cancels stops the next token from being delivered.
pub async fn drive<S, F>(
    body: S,
    cancel: &CancellationToken,
    mut on_token: F,
) -> Result<(), ClientError>
where
    S: Stream<Item = Result<Bytes, ClientError>>,
    F: FnMut(String),
{
    futures::pin_mut!(body);
    let mut decoder = FrameDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Aborted),
            next = body.next() => next,
        };

        let Some(chunk) = next else {
            if let Some(tail) = decoder.finish() {
                debug!(tail_len = tail.len(), "discarding undelimited tail");
            }
            warn!("stream ended without termination signal");
            return Err(ClientError::IncompleteStream);
        };
        let chunk = chunk?;
        trace!(len = chunk.len(), "chunk");

        for frame in decoder.feed(&chunk) {
            if cancel.is_cancelled() {
                return Err(ClientError::Aborted);
            }
            match classify(&frame) {
                None | Some(Event::Heartbeat) => trace!("skipping frame"),
                Some(Event::Token(token)) => {
                    trace!(len = token.len(), "token");
                    on_token(token);
                }
                Some(Event::Done) => return Ok(()),
                Some(Event::StreamError(message)) => {
                    warn!(%message, "server reported stream error");
                    return Err(ClientError::ServerReported(message));
                }
            }
        }
    }
}
