//! HTTP backend for the inference service.
//!
//! This module provides reqwest client construction, request building and
//! the [`HttpBackend`] implementation of [`Backend`].

use std::collections::HashMap;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::client::{Backend, ByteStream, ClientError};
use crate::model::{AskRequest, AskResponse, ErrorDetail, Health, QuestionRequest};
use crate::options::ClientOptions;

/// Message used when a failing stream response has no readable body.
pub const STREAM_FAILED: &str = "Stream failed";

/// Build a configured HTTP client from client options.
///
/// Only the connect timeout is set here; the whole-request timeout is
/// applied per call so that streams stay unbounded.
pub fn build_http_client(options: &ClientOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url:?}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Add extra headers to a request if specified in the options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// [`Backend`] speaking JSON and SSE over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    options: ClientOptions,
}

impl HttpBackend {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        match self.options.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn ask(&self, prompt: &str) -> Result<String, ClientError> {
        let url = self.options.endpoint(&self.options.ask_path);
        debug!(%url, "single-shot request");

        let req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&AskRequest { prompt });
        let req = add_extra_headers(self.bounded(req), &self.options.extra_headers);

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::BadStatus {
                status,
                message: ErrorDetail::message_from(&body),
            });
        }

        let body = response.text().await?;
        let parsed: AskResponse = serde_json::from_str(&body)?;
        Ok(parsed.response)
    }

    async fn open_stream(&self, question: &str) -> Result<ByteStream, ClientError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ClientError::Config("empty question".to_string()));
        }

        let url = self.options.endpoint(&self.options.stream_path);
        debug!(%url, "streaming request");

        let req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&QuestionRequest { question });
        let req = add_extra_headers(req, &self.options.extra_headers);

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match body.trim() {
                "" => STREAM_FAILED.to_string(),
                text => text.to_string(),
            };
            return Err(ClientError::BadStatus { status, message });
        }

        Ok(response.bytes_stream().map_err(ClientError::from).boxed())
    }

    async fn health(&self) -> Result<bool, ClientError> {
        let url = self.options.endpoint(&self.options.health_path);
        let req = add_extra_headers(self.bounded(self.http.get(&url)), &self.options.extra_headers);

        let response = req.send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let health: Health = serde_json::from_str(&response.text().await?)?;
        Ok(health.ok)
    }
}
