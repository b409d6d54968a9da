//! # agent-stream - client for a question-answering inference service
//!
//! A small async library for asking a remote agent a question and getting
//! the answer either in one piece or as a cancellable stream of text
//! fragments delivered over Server-Sent Events.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary-proof SSE framing with incremental UTF-8 decoding
//! - Owned cancellation handles instead of shared global state
//! - Status tracking with an explicit policy for overlapping requests
//!
//! ## Architecture
//!
//! Bytes flow through three layers, leaves first:
//!
//! 1. **[`sse::FrameDecoder`]** reassembles blank-line delimited frames
//! 2. **[`event::classify`]** turns a frame into a token, heartbeat or sentinel
//! 3. **[`stream::StreamSession`]** drives both and reports one outcome
//!
//! [`status::Agent`] sits on top and keeps the externally visible
//! [`RequestStatus`] plus the accumulated answer. Anything implementing
//! [`Backend`] can feed it; [`http::HttpBackend`] is the reqwest one.
//!
//! ## Example
//! ```no_run
//! use agent_stream::http::HttpBackend;
//! use agent_stream::options::ClientOptions;
//! use agent_stream::status::Agent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = HttpBackend::new(ClientOptions::new("http://localhost:8000"))?;
//!     let agent = Agent::new(backend);
//!
//!     let answer = agent.ask_once("What is a monad?").await?;
//!     println!("{answer}");
//!
//!     let handle = agent.ask_stream("Explain it again, slowly", |token| print!("{token}"))?;
//!     // handle.cancel() stops it early
//!     handle.join().await?;
//!     assert!(!agent.response().is_empty());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod event;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod status;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use client::{Backend, ClientError, ErrorKind};
pub use event::Event;
pub use status::{Agent, ConcurrencyPolicy, RequestStatus};
pub use stream::{CancelHandle, StreamHandle, StreamSession};
