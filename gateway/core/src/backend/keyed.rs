//! Keyed backend (AI Studio)
//!
//! Clients are built per call from one pool credential. They are cheap:
//! every client shares the factory's `reqwest::Client` and its connection
//! pool, so only the key and slot differ.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    BackendError, BackendHandle, GenerateRequest, GenerativeBackend, KeyedClientFactory,
    RawResponse,
};
use super::wire;
use crate::credentials::Credential;

/// Default AI Studio API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// AI Studio client bound to one credential
pub struct KeyedBackend {
    base_url: String,
    credential: Credential,
    total: usize,
    http: reqwest::Client,
    timeout_override: Option<Duration>,
}

impl KeyedBackend {
    /// Full `generateContent` URL for a model
    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!(
            "{}/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerativeBackend for KeyedBackend {
    fn handle(&self) -> BackendHandle {
        BackendHandle::Keyed {
            slot: self.credential.slot,
            total: self.total,
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
        let body = wire::build_body(request);
        let timeout = wire::timeout_for(request, self.timeout_override);

        let builder = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", self.credential.secret());
        wire::send(builder, &body, timeout).await
    }
}

/// Builds [`KeyedBackend`] clients that share one HTTP connection pool
#[derive(Clone)]
pub struct StudioClientFactory {
    base_url: String,
    http: reqwest::Client,
    timeout_override: Option<Duration>,
}

impl StudioClientFactory {
    /// Create a factory for the given API root
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
            timeout_override: None,
        }
    }

    /// Use a fixed per-call timeout instead of the latency class
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_override = timeout;
        self
    }

    fn build(&self, credential: &Credential, total: usize) -> KeyedBackend {
        KeyedBackend {
            base_url: self.base_url.clone(),
            credential: credential.clone(),
            total,
            http: self.http.clone(),
            timeout_override: self.timeout_override,
        }
    }
}

impl KeyedClientFactory for StudioClientFactory {
    fn client_for(&self, credential: &Credential, total: usize) -> Box<dyn GenerativeBackend> {
        Box::new(self.build(credential, total))
    }
}
