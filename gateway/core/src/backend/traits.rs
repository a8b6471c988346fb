//! Backend Traits
//!
//! The uniform interface every upstream client implements. The dispatcher
//! only ever talks to [`GenerativeBackend`]; transport, auth and endpoint
//! differences stay behind it.
//!
//! # Contract
//!
//! - one `generate` call performs exactly one outbound request
//! - no retries inside a backend; retry policy belongs to the dispatcher
//! - generation options a model cannot honour are dropped from the wire
//!   request, never turned into an error

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::credentials::Credential;

/// Raw, backend-specific response body handed to the normalizer
pub type RawResponse = Value;

// ============================================================================
// Request
// ============================================================================

/// Requested reasoning depth
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThinkingLevel {
    /// Smallest reasoning effort the model allows
    None,
    /// Light reasoning
    Low,
    /// Moderate reasoning
    Medium,
    /// Deep reasoning
    High,
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

impl FromStr for ThinkingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "unknown thinking level '{other}' (expected none, low, medium or high)"
            )),
        }
    }
}

/// Generation options shared by every backend kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Let the model consult web search while generating
    pub grounding: bool,
    /// Reasoning depth; `None` leaves the model default in place
    pub thinking: Option<ThinkingLevel>,
}

/// One generation request as seen by a backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Model identifier
    pub model: String,
    /// Final prompt text (context already composed in)
    pub prompt: String,
    /// Generation options
    pub config: GenerationConfig,
}

impl GenerateRequest {
    /// Create a request with default generation options
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            config: GenerationConfig::default(),
        }
    }

    /// Toggle search grounding
    #[must_use]
    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.config.grounding = grounding;
        self
    }

    /// Set reasoning depth
    #[must_use]
    pub fn with_thinking(mut self, thinking: Option<ThinkingLevel>) -> Self {
        self.config.thinking = thinking;
        self
    }
}

// ============================================================================
// Backend identity
// ============================================================================

/// The two upstream backend kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Managed-identity cloud endpoint (Vertex AI)
    Managed,
    /// Credential-keyed endpoint (AI Studio)
    Keyed,
}

impl BackendKind {
    /// The other kind, used for fallback
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Managed => Self::Keyed,
            Self::Keyed => Self::Managed,
        }
    }

    /// Product name shown to users
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Managed => "Vertex AI",
            Self::Keyed => "AI Studio",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Keyed => write!(f, "keyed"),
        }
    }
}

/// Which concrete client served (or failed) a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendHandle {
    /// A managed client bound to one region
    Managed {
        /// Region of the client
        region: String,
    },
    /// A keyed client built from one pool slot
    Keyed {
        /// Zero-based credential slot
        slot: usize,
        /// Pool size at call time
        total: usize,
    },
}

impl BackendHandle {
    /// Backend kind of this handle
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Managed { .. } => BackendKind::Managed,
            Self::Keyed { .. } => BackendKind::Keyed,
        }
    }
}

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed { region } => write!(f, "Vertex AI ({region})"),
            Self::Keyed { slot, total } => write!(f, "AI Studio (key {}/{total})", slot + 1),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single outbound call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Upstream answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Numeric HTTP status
        status: u16,
        /// Upstream error text
        message: String,
    },

    /// Call exceeded its latency budget
    #[error("request timed out after {}s", after.as_secs())]
    Timeout {
        /// The timeout that elapsed
        after: Duration,
    },

    /// Transport failure before a response arrived
    #[error("network error: {0}")]
    Network(String),

    /// Ambient identity could not produce a token
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Response body was not valid JSON
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl BackendError {
    /// HTTP status, when the upstream answered at all
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A client for one upstream generation endpoint
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Identity of this client, attached to responses and failures
    fn handle(&self) -> BackendHandle;

    /// Backend kind
    fn kind(&self) -> BackendKind {
        self.handle().kind()
    }

    /// Perform exactly one generation call
    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError>;
}

/// Builds keyed clients on demand from a pool credential
pub trait KeyedClientFactory: Send + Sync {
    /// A client bound to `credential`; `total` is the pool size for display
    fn client_for(&self, credential: &Credential, total: usize) -> Box<dyn GenerativeBackend>;
}
