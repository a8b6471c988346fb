//! Request Dispatcher
//!
//! Picks a backend for each call, retries across credentials when the keyed
//! backend runs out of quota, and falls back to the other backend kind once
//! for models that either kind can serve.
//!
//! # State machine
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │  SELECT_BACKEND  │  registry affinity
//!                 └────────┬─────────┘
//!                          v
//!   ┌────────────────> ATTEMPT ───────────── ok ──────> SUCCESS (normalize)
//!   │                      │
//!   │                   failure -> classify
//!   │                      │
//!   ├── ROTATE_AND_RETRY <─┤  quota + keyed + rotate() + budget left
//!   │                      │
//!   └── FALLBACK_BACKEND <─┤  affinity either + first kind + other kind exists
//!                          │
//!                          └─> EXHAUSTED (error built from attempt record)
//! ```
//!
//! Attempts are bounded by `max(pool size, 1)` keyed attempts per keyed
//! phase plus a single backend-kind switch, so the loop always terminates.
//! Nothing here sleeps; rotation is immediate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{
    AmbientTokenSource, BackendHandle, BackendKind, GenerateRequest, GenerationConfig,
    GenerativeBackend, KeyedClientFactory, ManagedBackend, StudioClientFactory, TokenSource,
};
use crate::classify::{DefaultClassifier, ErrorClass, ErrorClassifier};
use crate::config::{GatewayConfig, DEFAULT_MODEL};
use crate::credentials::CredentialPool;
use crate::error::GatewayError;
use crate::normalize::{normalize, ResponseEnvelope};
use crate::registry::{canonical_model, Affinity, ModelRegistry};

/// Delimiter between caller context and the prompt
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Prepend optional context to the prompt
#[must_use]
pub fn compose_prompt(prompt: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{context}{CONTEXT_DELIMITER}{prompt}"),
        None => prompt.to_string(),
    }
}

// ============================================================================
// Request / Result
// ============================================================================

/// One call into the dispatcher
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Prompt text
    pub prompt: String,
    /// Model identifier; the gateway default when absent
    pub model: Option<String>,
    /// Caller context, placed before the prompt
    pub context: Option<String>,
    /// Generation options
    pub config: GenerationConfig,
}

impl DispatchRequest {
    /// Create a request for the default model
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set caller context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set generation options
    #[must_use]
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }
}

/// A successful dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatched {
    /// Model that served the call
    pub model: String,
    /// Attempts made, including the successful one
    pub attempts: usize,
    /// Normalized response
    pub envelope: ResponseEnvelope,
}

// ============================================================================
// Attempt Record
// ============================================================================

/// One failed attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// Client that was tried
    pub handle: BackendHandle,
    /// How the failure was classified
    pub class: ErrorClass,
    /// Failure text
    pub message: String,
}

/// Failed attempts of one dispatch, in order
#[derive(Clone, Debug, Default)]
pub struct AttemptRecord {
    attempts: Vec<Attempt>,
}

impl AttemptRecord {
    fn push(&mut self, handle: BackendHandle, class: ErrorClass, message: String) {
        self.attempts.push(Attempt {
            handle,
            class,
            message,
        });
    }

    /// Number of recorded attempts
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Whether no attempt was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Recorded attempts
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Terminal error summarizing the last attempt
    fn into_error(self, model: &str, pool_size: usize) -> GatewayError {
        let attempts = self.attempts.len();
        let Some(last) = self.attempts.last() else {
            return GatewayError::Configuration(format!("no attempt was made for model {model}"));
        };
        let model = model.to_string();
        let backend = last.handle.kind();
        let last_error = last.message.clone();

        match last.class {
            ErrorClass::QuotaExhausted => GatewayError::QuotaExhausted {
                model,
                backend,
                credentials: match backend {
                    BackendKind::Keyed => pool_size.max(1),
                    BackendKind::Managed => 1,
                },
                attempts,
                last_error,
            },
            ErrorClass::Transient => GatewayError::TransientNetwork {
                model,
                backend,
                attempts,
                last_error,
            },
            ErrorClass::Fatal => GatewayError::Backend {
                model,
                backend,
                attempts,
                last_error,
            },
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Dispatch context: registry, credentials, clients and policy
///
/// Owns all state a call needs. Several gateways can coexist in one process;
/// none of them touch globals.
pub struct Gateway {
    registry: ModelRegistry,
    pool: Arc<CredentialPool>,
    managed: HashMap<String, Arc<dyn GenerativeBackend>>,
    managed_region: String,
    model_regions: HashMap<String, String>,
    keyed: Option<Arc<dyn KeyedClientFactory>>,
    classifier: Arc<dyn ErrorClassifier>,
    default_model: String,
}

impl Gateway {
    /// Start building a gateway
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Build the production gateway from resolved configuration
    ///
    /// Never fails on a missing ambient identity; managed clients report
    /// that on their first call.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gemini-gateway/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let mut builder = Self::builder()
            .registry(ModelRegistry::from_entries(
                config.affinity.iter().map(|(m, a)| (m.as_str(), *a)),
            ))
            .default_model(config.default_model.clone())
            .managed_region(config.region.clone());

        for (model, region) in &config.model_regions {
            builder = builder.model_region(model.clone(), region.clone());
        }

        if config.mode.builds_managed() {
            if let Some(ref project) = config.project {
                let tokens: Arc<dyn TokenSource> = Arc::new(AmbientTokenSource::new(http.clone()));
                let mut regions = vec![config.region.clone()];
                for region in config.model_regions.values() {
                    if !regions.contains(region) {
                        regions.push(region.clone());
                    }
                }
                for region in regions {
                    let client = ManagedBackend::new(
                        project.clone(),
                        region.clone(),
                        http.clone(),
                        Arc::clone(&tokens),
                    )
                    .with_timeout(config.request_timeout);
                    builder = builder.managed_client(region, Arc::new(client));
                }
            }
        }

        if config.mode.builds_keyed() {
            let factory = StudioClientFactory::new(config.base_url.clone(), http)
                .with_timeout(config.request_timeout);
            builder = builder
                .credentials(CredentialPool::new(&config.api_keys))
                .keyed_factory(Arc::new(factory));
        }

        let gateway = builder.build();
        info!(
            mode = %config.mode,
            managed_regions = gateway.managed.len(),
            credentials = gateway.pool.len(),
            default_model = %gateway.default_model,
            "Gateway configured"
        );
        gateway
    }

    /// Model used when a call names none
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// The credential pool
    #[must_use]
    pub fn credentials(&self) -> &CredentialPool {
        &self.pool
    }

    /// The model registry
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Whether a backend kind was configured and can be used
    #[must_use]
    pub fn has_backend(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Managed => !self.managed.is_empty(),
            BackendKind::Keyed => self.keyed.is_some() && !self.pool.is_empty(),
        }
    }

    /// Resolve the model a request will use
    #[must_use]
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    /// First backend kind for a model
    ///
    /// # Errors
    ///
    /// [`GatewayError::Configuration`] when no configured backend can serve
    /// the model's affinity.
    pub fn select_backend(&self, model: &str) -> Result<BackendKind, GatewayError> {
        let affinity = self.registry.affinity(model);
        let managed = self.has_backend(BackendKind::Managed);
        let keyed = self.has_backend(BackendKind::Keyed);

        match affinity {
            Affinity::Managed if managed => Ok(BackendKind::Managed),
            Affinity::Managed => Err(GatewayError::Configuration(format!(
                "model {model} requires the managed backend, which is not configured \
                 (set GEMINI_PROJECT and a managed or auto backend mode)"
            ))),
            Affinity::Keyed if keyed => Ok(BackendKind::Keyed),
            Affinity::Keyed => Err(GatewayError::Configuration(format!(
                "model {model} requires the keyed backend, but no API keys are configured \
                 (set GEMINI_API_KEYS or GEMINI_API_KEY)"
            ))),
            Affinity::Either if managed => Ok(BackendKind::Managed),
            Affinity::Either if keyed => Ok(BackendKind::Keyed),
            Affinity::Either => Err(GatewayError::Configuration(format!(
                "no backend configured for model {model} \
                 (set GEMINI_PROJECT for the managed backend or GEMINI_API_KEYS for the keyed backend)"
            ))),
        }
    }

    fn managed_client(&self, model: &str) -> Option<Arc<dyn GenerativeBackend>> {
        let region = self
            .model_regions
            .get(&canonical_model(model))
            .unwrap_or(&self.managed_region);
        self.managed
            .get(region)
            .or_else(|| self.managed.get(&self.managed_region))
            .or_else(|| self.managed.values().next())
            .cloned()
    }

    fn keyed_client(&self) -> Option<Box<dyn GenerativeBackend>> {
        let factory = self.keyed.as_ref()?;
        let credential = self.pool.current()?;
        Some(factory.client_for(&credential, self.pool.len()))
    }

    /// Run one request through the state machine
    ///
    /// # Errors
    ///
    /// Returns the terminal [`GatewayError`] once the attempt budget is
    /// spent or a failure cannot be retried.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<Dispatched, GatewayError> {
        let model = self.resolve_model(request.model.as_deref());
        let affinity = self.registry.affinity(&model);
        let first = self.select_backend(&model)?;

        debug!(model = %model, affinity = %affinity, backend = %first, "Selected backend");

        let outgoing = GenerateRequest {
            model: model.clone(),
            prompt: compose_prompt(&request.prompt, request.context.as_deref()),
            config: request.config,
        };

        let rotation_budget = self.pool.len().max(1);
        let mut record = AttemptRecord::default();
        let mut kind = first;
        let mut fell_back = false;
        let mut keyed_attempts = 0usize;

        loop {
            let client: Option<Arc<dyn GenerativeBackend>> = match kind {
                BackendKind::Managed => self.managed_client(&model),
                BackendKind::Keyed => self.keyed_client().map(Arc::from),
            };
            let Some(client) = client else {
                return Err(record.into_error(&model, self.pool.len()));
            };
            if kind == BackendKind::Keyed {
                keyed_attempts += 1;
            }

            let handle = client.handle();
            let attempt = record.len() + 1;
            debug!(model = %model, backend = %handle, attempt, "Attempting generation");

            let error = match client.generate(&outgoing).await {
                Ok(raw) => {
                    let envelope = normalize(&raw, &handle);
                    info!(
                        model = %model,
                        backend = %handle,
                        attempts = attempt,
                        total_tokens = envelope.usage.map(|u| u.total),
                        thinking_tokens = envelope.usage.and_then(|u| u.thinking),
                        "Generation succeeded"
                    );
                    return Ok(Dispatched {
                        model,
                        attempts: attempt,
                        envelope,
                    });
                }
                Err(error) => error,
            };

            let class = self.classifier.classify(&error);
            debug!(model = %model, backend = %handle, attempt, class = %class, error = %error, "Attempt failed");
            record.push(handle.clone(), class, error.to_string());

            if class == ErrorClass::QuotaExhausted
                && kind == BackendKind::Keyed
                && keyed_attempts < rotation_budget
                && self.pool.rotate()
            {
                let to = self.pool.current().map(|c| c.slot + 1);
                info!(
                    model = %model,
                    from = %handle,
                    to_slot = to,
                    attempt,
                    "Quota exhausted, rotating credential"
                );
                continue;
            }

            if affinity == Affinity::Either && !fell_back && self.has_backend(kind.other()) {
                warn!(
                    model = %model,
                    from = %kind,
                    to = %kind.other(),
                    class = %class,
                    "Falling back to alternate backend"
                );
                fell_back = true;
                kind = kind.other();
                keyed_attempts = 0;
                continue;
            }

            let error = record.into_error(&model, self.pool.len());
            warn!(model = %model, attempts = attempt, error = %error, "Dispatch exhausted");
            return Err(error);
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    registry: ModelRegistry,
    pool: CredentialPool,
    managed: HashMap<String, Arc<dyn GenerativeBackend>>,
    managed_region: Option<String>,
    model_regions: HashMap<String, String>,
    keyed: Option<Arc<dyn KeyedClientFactory>>,
    classifier: Arc<dyn ErrorClassifier>,
    default_model: String,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            registry: ModelRegistry::with_builtin(),
            pool: CredentialPool::empty(),
            managed: HashMap::new(),
            managed_region: None,
            model_regions: HashMap::new(),
            keyed: None,
            classifier: Arc::new(DefaultClassifier),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl GatewayBuilder {
    /// Use this registry
    #[must_use]
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use this credential pool
    #[must_use]
    pub fn credentials(mut self, pool: CredentialPool) -> Self {
        self.pool = pool;
        self
    }

    /// Add a managed client for a region
    ///
    /// The first region added becomes the default unless
    /// [`managed_region`](Self::managed_region) says otherwise.
    #[must_use]
    pub fn managed_client(
        mut self,
        region: impl Into<String>,
        client: Arc<dyn GenerativeBackend>,
    ) -> Self {
        let region = region.into();
        if self.managed_region.is_none() {
            self.managed_region = Some(region.clone());
        }
        self.managed.insert(region, client);
        self
    }

    /// Default managed region
    #[must_use]
    pub fn managed_region(mut self, region: impl Into<String>) -> Self {
        self.managed_region = Some(region.into());
        self
    }

    /// Pin a model to a managed region
    #[must_use]
    pub fn model_region(mut self, model: impl Into<String>, region: impl Into<String>) -> Self {
        self.model_regions
            .insert(canonical_model(&model.into()), region.into());
        self
    }

    /// Factory for keyed clients
    #[must_use]
    pub fn keyed_factory(mut self, factory: Arc<dyn KeyedClientFactory>) -> Self {
        self.keyed = Some(factory);
        self
    }

    /// Replace the error classifier
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Model used when a call names none
    #[must_use]
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Gateway {
        Gateway {
            registry: self.registry,
            pool: Arc::new(self.pool),
            managed: self.managed,
            managed_region: self
                .managed_region
                .unwrap_or_else(|| crate::config::DEFAULT_REGION.to_string()),
            model_regions: self.model_regions,
            keyed: self.keyed,
            classifier: self.classifier,
            default_model: self.default_model,
        }
    }
}
