//! Ask the agent a question from the command line.
//!
//! Run with:
//! ```bash
//! export AGENT_API_BASE="http://localhost:8000"
//! cargo run --example ask -- "Why is the sky blue?"
//! cargo run --example ask -- --once "Why is the sky blue?"
//! ```
//!
//! Press Ctrl-C while streaming to stop the answer early.

use std::io::Write;

use agent_stream::http::HttpBackend;
use agent_stream::options::ClientOptions;
use agent_stream::{Agent, Backend};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut once = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            _ => words.push(arg),
        }
    }
    let question = words.join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: ask [--once] <question>");
        std::process::exit(2);
    }

    let agent = Agent::new(HttpBackend::new(ClientOptions::from_env()?)?);
    if !agent.backend().health().await.unwrap_or(false) {
        eprintln!("warning: service health check failed");
    }

    if once {
        println!("{}", agent.ask_once(&question).await?);
        return Ok(());
    }

    let handle = agent.ask_stream(&question, |token| {
        print!("{token}");
        let _ = std::io::stdout().flush();
    })?;
    let stop = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let outcome = handle.join().await;
    println!();

    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_aborted() => {
            eprintln!("\n(stopped by user)");
            Ok(())
        }
        Err(e) => {
            eprintln!("\nError: {e}");
            Err(e.into())
        }
    }
}
