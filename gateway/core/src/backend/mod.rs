//! Backend Client Abstraction
//!
//! Uniform access to the two upstream endpoint kinds through
//! [`GenerativeBackend`].
//!
//! # Available Backends
//!
//! - **Managed** (Vertex AI): ambient identity, one client per region
//! - **Keyed** (AI Studio): API key from the credential pool, built per call
//!
//! # Usage
//!
//! ```ignore
//! use gateway_core::backend::{GenerateRequest, GenerativeBackend, StudioClientFactory};
//!
//! let factory = StudioClientFactory::new(DEFAULT_BASE_URL, reqwest::Client::new());
//! let client = factory.client_for(&credential, pool.len());
//! let raw = client.generate(&GenerateRequest::new("gemini-2.5-flash", "Hello")).await?;
//! ```

mod keyed;
mod managed;
mod traits;
pub mod wire;

pub use keyed::{KeyedBackend, StudioClientFactory, DEFAULT_BASE_URL};
pub use managed::{AmbientTokenSource, ManagedBackend, StaticTokenSource, TokenSource};
pub use traits::{
    BackendError, BackendHandle, BackendKind, GenerateRequest, GenerationConfig,
    GenerativeBackend, KeyedClientFactory, RawResponse, ThinkingLevel,
};
