// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport for the generation backend.
//!
//! [`HttpTransport`] posts JSON requests with `reqwest`. Failed requests are
//! not retried: every failure is terminal for the generation that issued it.

use std::time::Duration;

use async_trait::async_trait;
use codeplan_config::model::BackendConfig;
use codeplan_core::CodeplanError;
use codeplan_core::traits::{ByteStream, GenerationTransport};
use codeplan_core::types::{GenerationRequest, GenerationResult};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::debug;

const COMPLETE_PATH: &str = "/generate";
const STREAM_PATH: &str = "/generate/stream";

/// `reqwest`-backed [`GenerationTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds a transport from the backend configuration.
    pub fn new(config: &BackendConfig) -> Result<Self, CodeplanError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CodeplanError::transport(format!("failed to build HTTP client: {e}"), e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        path: &str,
        request: &GenerationRequest,
        accept: &'static str,
    ) -> Result<reqwest::Response, CodeplanError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, accept)
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        debug!(%status, %url, "generation response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CodeplanError::Transport {
            message: format!("backend returned {status}: {body}"),
            source: None,
        })
    }
}

fn request_error(e: reqwest::Error) -> CodeplanError {
    let message = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("could not reach backend: {e}")
    } else {
        format!("HTTP request failed: {e}")
    };
    CodeplanError::transport(message, e)
}

#[async_trait]
impl GenerationTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, CodeplanError> {
        let response = self
            .post(COMPLETE_PATH, &request, "application/json")
            .await?;
        let body = response.text().await.map_err(request_error)?;
        serde_json::from_str(&body).map_err(|e| CodeplanError::Protocol {
            message: format!("failed to parse generation result: {e}"),
        })
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ByteStream, CodeplanError> {
        let response = self
            .post(STREAM_PATH, &request, "text/event-stream")
            .await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(request_error));
        Ok(Box::pin(body))
    }
}
