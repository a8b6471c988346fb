//! Managed-identity backend (Vertex AI)
//!
//! One client per (project, region) pair, built at startup. Construction
//! never touches the network: if the ambient identity is missing the
//! failure shows up as [`BackendError::Auth`] on the first call.
//!
//! # Token acquisition
//!
//! ```text
//! GOOGLE_OAUTH_ACCESS_TOKEN ──> GCE metadata server ──> gcloud ADC
//!        (explicit)               (on Google Cloud)       (workstation)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::traits::{
    BackendError, BackendHandle, GenerateRequest, GenerativeBackend, RawResponse,
};
use super::wire;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// Token sources
// ============================================================================

/// Supplies OAuth bearer tokens for the managed endpoint
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token
    async fn token(&self) -> Result<String, BackendError>;
}

/// A fixed token, for pre-authenticated environments and tests
#[derive(Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String, BackendError> {
        if self.token.trim().is_empty() {
            return Err(BackendError::Auth("empty access token".into()));
        }
        Ok(self.token.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Token source backed by the ambient platform identity
///
/// Tokens are cached until shortly before expiry. Concurrent callers that
/// miss the cache wait on one refresh instead of each spawning their own.
pub struct AmbientTokenSource {
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl AmbientTokenSource {
    /// Create a source sharing the given HTTP client
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    fn fresh_cached(&self) -> Option<String> {
        self.cached
            .read()
            .as_ref()
            .filter(|t| t.expires_at > Instant::now() + EXPIRY_MARGIN)
            .map(|t| t.value.clone())
    }

    async fn acquire(&self) -> Result<CachedToken, BackendError> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                debug!(source = "env", "Using access token from environment");
                return Ok(CachedToken {
                    value: token,
                    expires_at: Instant::now() + Duration::from_secs(300),
                });
            }
        }

        match self.token_from_metadata().await {
            Ok(token) => {
                debug!(source = "metadata", "Acquired access token");
                return Ok(token);
            }
            Err(e) => debug!(error = %e, "Metadata server unavailable"),
        }

        let token = self.token_from_gcloud().await?;
        debug!(source = "gcloud", "Acquired access token");
        Ok(token)
    }

    async fn token_from_metadata(&self) -> Result<CachedToken, BackendError> {
        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| BackendError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Auth(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| BackendError::Auth(e.to_string()))?;
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn token_from_gcloud(&self) -> Result<CachedToken, BackendError> {
        let output = Command::new("gcloud")
            .args(["auth", "application-default", "print-access-token"])
            .output()
            .await
            .map_err(|e| BackendError::Auth(format!("gcloud not available: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Auth(format!(
                "gcloud auth failed: {}",
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(BackendError::Auth("gcloud returned an empty token".into()));
        }
        Ok(CachedToken {
            value: token,
            expires_at: Instant::now() + Duration::from_secs(45 * 60),
        })
    }
}

#[async_trait]
impl TokenSource for AmbientTokenSource {
    async fn token(&self) -> Result<String, BackendError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        match self.acquire().await {
            Ok(token) => {
                let value = token.value.clone();
                *self.cached.write() = Some(token);
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "No ambient identity for managed backend");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Vertex AI client bound to one project and region
pub struct ManagedBackend {
    project: String,
    region: String,
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    timeout_override: Option<Duration>,
}

impl ManagedBackend {
    /// Create a client; performs no I/O
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            http,
            tokens,
            timeout_override: None,
        }
    }

    /// Use a fixed per-call timeout instead of the latency class
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_override = timeout;
        self
    }

    /// Region this client targets
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Full `generateContent` URL for a model
    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        let host = if self.region == "global" {
            "aiplatform.googleapis.com".to_string()
        } else {
            format!("{}-aiplatform.googleapis.com", self.region)
        };
        format!(
            "https://{host}/v1/projects/{}/locations/{}/publishers/google/models/{model}:generateContent",
            self.project, self.region
        )
    }
}

#[async_trait]
impl GenerativeBackend for ManagedBackend {
    fn handle(&self) -> BackendHandle {
        BackendHandle::Managed {
            region: self.region.clone(),
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
        let token = self.tokens.token().await?;
        let body = wire::build_body(request);
        let timeout = wire::timeout_for(request, self.timeout_override);

        let builder = self
            .http
            .post(self.endpoint(&request.model))
            .bearer_auth(token);
        wire::send(builder, &body, timeout).await
    }
}
