//! Scripted in-memory backend for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::client::{Backend, ByteStream, ClientError};

#[derive(Default)]
pub(crate) struct FakeBackend {
    chunks: Vec<&'static [u8]>,
    hang: bool,
    answer: Option<String>,
    opened: AtomicUsize,
}

impl FakeBackend {
    /// A stream that yields `chunks` and then ends.
    pub fn streaming(chunks: &[&'static [u8]]) -> Self {
        Self {
            chunks: chunks.to_vec(),
            ..Self::default()
        }
    }

    /// A single-shot call that answers immediately.
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            ..Self::default()
        }
    }

    /// Never end the stream after the scripted chunks.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn ask(&self, _prompt: &str) -> Result<String, ClientError> {
        match &self.answer {
            Some(answer) => Ok(answer.clone()),
            None => futures::future::pending().await,
        }
    }

    async fn open_stream(&self, _question: &str) -> Result<ByteStream, ClientError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let body = stream::iter(self.chunks.clone()).map(|c| Ok(Bytes::from_static(c)));
        if self.hang {
            Ok(body.chain(stream::pending()).boxed())
        } else {
            Ok(body.boxed())
        }
    }

    async fn health(&self) -> Result<bool, ClientError> {
        Ok(true)
    }
}
