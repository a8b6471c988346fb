//! Test Utilities
//!
//! Scripted backends for exercising the dispatcher without network access.
//! Each mock replays a queue of outcomes and records every request it saw,
//! so tests can assert on attempt order and on exactly what a backend
//! received.
//!
//! # Usage
//!
//! ```ignore
//! use gateway_core::test_utils::{ok_response, quota_error, ScriptedKeyedFactory};
//!
//! let factory = Arc::new(ScriptedKeyedFactory::new());
//! factory.push_err(quota_error());
//! factory.push_ok(ok_response("hello"));
//!
//! // After the test, check which credential slots were used
//! assert_eq!(factory.slots(), vec![0, 1]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::backend::{
    BackendError, BackendHandle, GenerateRequest, GenerativeBackend, KeyedClientFactory,
    RawResponse,
};
use crate::credentials::Credential;

/// Minimal successful `generateContent` body
#[must_use]
pub fn ok_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "totalTokenCount": 12 }
    })
}

/// Successful body carrying search grounding
#[must_use]
pub fn grounded_response(text: &str, query: &str, uri: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }] },
            "groundingMetadata": {
                "webSearchQueries": [query],
                "groundingChunks": [{ "web": { "uri": uri, "title": "Source" } }]
            }
        }],
        "usageMetadata": { "totalTokenCount": 30, "thoughtsTokenCount": 8 }
    })
}

/// Upstream quota rejection as the keyed endpoint reports it
#[must_use]
pub fn quota_error() -> BackendError {
    BackendError::Http {
        status: 429,
        message: "RESOURCE_EXHAUSTED: Quota exceeded for quota metric 'Generate Content API requests'"
            .into(),
    }
}

/// Non-retryable upstream rejection
#[must_use]
pub fn fatal_error() -> BackendError {
    BackendError::Http {
        status: 400,
        message: "INVALID_ARGUMENT: Request contains an invalid argument.".into(),
    }
}

type Script = Mutex<VecDeque<Result<RawResponse, BackendError>>>;

fn next_outcome(script: &Script) -> Result<RawResponse, BackendError> {
    script
        .lock()
        .pop_front()
        .unwrap_or_else(|| Ok(ok_response("ok")))
}

// ============================================================================
// Scripted managed backend
// ============================================================================

/// A single shared backend replaying scripted outcomes
///
/// Returns a plain success once the script runs out.
pub struct ScriptedBackend {
    handle: BackendHandle,
    script: Script,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    /// Scripted backend with an arbitrary handle
    #[must_use]
    pub fn new(handle: BackendHandle) -> Arc<Self> {
        Arc::new(Self {
            handle,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Scripted managed backend for a region
    #[must_use]
    pub fn managed(region: &str) -> Arc<Self> {
        Self::new(BackendHandle::Managed {
            region: region.to_string(),
        })
    }

    /// Queue a success
    pub fn push_ok(&self, body: Value) {
        self.script.lock().push_back(Ok(body));
    }

    /// Queue a failure
    pub fn push_err(&self, error: BackendError) {
        self.script.lock().push_back(Err(error));
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn handle(&self) -> BackendHandle {
        self.handle.clone()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
        self.requests.lock().push(request.clone());
        next_outcome(&self.script)
    }
}

// ============================================================================
// Scripted keyed factory
// ============================================================================

/// One call seen by a keyed client
#[derive(Clone, Debug)]
pub struct KeyedCall {
    /// Credential slot used
    pub slot: usize,
    /// Credential secret used
    pub secret: String,
    /// Request received
    pub request: GenerateRequest,
}

#[derive(Default)]
struct FactoryState {
    script: Script,
    calls: Mutex<Vec<KeyedCall>>,
}

/// Keyed client factory whose clients share one outcome script
///
/// Outcomes are consumed in call order regardless of which credential the
/// client was built from; the slot of each call is recorded.
#[derive(Default)]
pub struct ScriptedKeyedFactory {
    state: Arc<FactoryState>,
}

impl ScriptedKeyedFactory {
    /// Factory with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a success
    pub fn push_ok(&self, body: Value) {
        self.state.script.lock().push_back(Ok(body));
    }

    /// Queue a failure
    pub fn push_err(&self, error: BackendError) {
        self.state.script.lock().push_back(Err(error));
    }

    /// All calls made through clients of this factory
    #[must_use]
    pub fn calls(&self) -> Vec<KeyedCall> {
        self.state.calls.lock().clone()
    }

    /// Credential slots used, in call order
    #[must_use]
    pub fn slots(&self) -> Vec<usize> {
        self.state.calls.lock().iter().map(|c| c.slot).collect()
    }

    /// Number of calls made
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.calls.lock().len()
    }
}

struct ScriptedKeyedClient {
    credential: Credential,
    total: usize,
    state: Arc<FactoryState>,
}

#[async_trait]
impl GenerativeBackend for ScriptedKeyedClient {
    fn handle(&self) -> BackendHandle {
        BackendHandle::Keyed {
            slot: self.credential.slot,
            total: self.total,
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
        self.state.calls.lock().push(KeyedCall {
            slot: self.credential.slot,
            secret: self.credential.secret().to_string(),
            request: request.clone(),
        });
        next_outcome(&self.state.script)
    }
}

impl KeyedClientFactory for ScriptedKeyedFactory {
    fn client_for(&self, credential: &Credential, total: usize) -> Box<dyn GenerativeBackend> {
        Box::new(ScriptedKeyedClient {
            credential: credential.clone(),
            total,
            state: Arc::clone(&self.state),
        })
    }
}
