//! Gateway error taxonomy
//!
//! Every variant names the model and the backend kind involved so an
//! operator can tell "add more credentials" from "this model needs
//! different configuration" without reading logs.

use thiserror::Error;

use crate::backend::BackendKind;

/// Terminal failure of one dispatch
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No usable backend for the model; never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every attempt was rejected for quota
    #[error(
        "{model} on {backend} backend: all {credentials} credentials exhausted \
         after {attempts} attempt(s): {last_error}"
    )]
    QuotaExhausted {
        /// Model identifier
        model: String,
        /// Last backend kind tried
        backend: BackendKind,
        /// Number of credentials in the pool
        credentials: usize,
        /// Attempts made
        attempts: usize,
        /// Text of the last failure
        last_error: String,
    },

    /// Timeout or transport failure
    #[error("{model} on {backend} backend: network failure after {attempts} attempt(s): {last_error}")]
    TransientNetwork {
        /// Model identifier
        model: String,
        /// Last backend kind tried
        backend: BackendKind,
        /// Attempts made
        attempts: usize,
        /// Text of the last failure
        last_error: String,
    },

    /// Upstream rejected the call for any other reason
    #[error("{model} on {backend} backend: request failed after {attempts} attempt(s): {last_error}")]
    Backend {
        /// Model identifier
        model: String,
        /// Last backend kind tried
        backend: BackendKind,
        /// Attempts made
        attempts: usize,
        /// Text of the last failure
        last_error: String,
    },

    /// Tool name does not match the exposed tool
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl GatewayError {
    /// Backend kind of the last attempt, when one was made
    #[must_use]
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::QuotaExhausted { backend, .. }
            | Self::TransientNetwork { backend, .. }
            | Self::Backend { backend, .. } => Some(*backend),
            Self::Configuration(_) | Self::UnknownTool(_) => None,
        }
    }
}
