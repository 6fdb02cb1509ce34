//! Reasoning backends.
//!
//! Enum dispatch over the concrete backends, since async methods are not
//! usable through trait objects. The HTTP backend talks to the reasoning
//! service; the scripted backend replays canned replies for offline runs and
//! tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ReasoningConfig;

use super::{ReasoningError, ReasoningRequest};

pub enum ReasoningBackend {
    Http(HttpBackend),
    Scripted(ScriptedBackend),
}

impl ReasoningBackend {
    /// HTTP backend for the configured endpoint
    pub fn http(config: &ReasoningConfig) -> Self {
        Self::Http(HttpBackend::new(config))
    }

    /// Send one request and return the raw response body.
    pub async fn generate(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        match self {
            Self::Http(backend) => backend.generate(request).await,
            Self::Scripted(backend) => backend.generate(request).await,
        }
    }

    /// Human-readable name for logging
    pub const fn name(&self) -> &str {
        match self {
            Self::Http(_) => "http",
            Self::Scripted(_) => "scripted",
        }
    }
}

/// Posts requests to `{endpoint}/generate`
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpBackend {
    pub fn new(config: &ReasoningConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn url(&self) -> String {
        format!("{}/generate", self.endpoint)
    }

    async fn generate(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let body = serde_json::json!({
            "agent": request,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ReasoningError::Unavailable(e.to_string())
                } else {
                    ReasoningError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ReasoningError::Unavailable("model not loaded".to_string()));
        }
        if !status.is_success() {
            return Err(ReasoningError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ReasoningError::Http(format!("failed to read response body: {e}")))
    }
}

/// One canned reply
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail with an unavailable error
    Fail,
    /// Sleep, then answer with the text
    Delay(Duration, String),
}

/// Replays replies in order, then repeats the fallback reply
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    calls: Mutex<u64>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>, fallback: ScriptedReply) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback,
            calls: Mutex::new(0),
        }
    }

    /// Always answer with the same text
    pub fn constant(text: impl Into<String>) -> Self {
        Self::new(Vec::new(), ScriptedReply::Text(text.into()))
    }

    pub fn calls(&self) -> u64 {
        self.calls.lock().map_or(0, |c| *c)
    }

    fn next_reply(&self) -> ScriptedReply {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn generate(&self, _request: &ReasoningRequest) -> Result<String, ReasoningError> {
        match self.next_reply() {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Fail => Err(ReasoningError::Unavailable("scripted failure".to_string())),
            ScriptedReply::Delay(wait, text) => {
                tokio::time::sleep(wait).await;
                Ok(text)
            }
        }
    }
}
