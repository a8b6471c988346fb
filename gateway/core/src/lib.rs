//! Gateway Core - Backend Dispatch and Resilience for Gemini Tool Calls
//!
//! This crate turns one uniform tool call (`ask_gemini`) into a request
//! against whichever upstream Gemini endpoint can serve the model, rotating
//! through API keys when quota runs out and falling back between endpoint
//! kinds when a model allows it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   Tool framing layer (external)                   │
//! │               ToolCall (in)          ToolResult (out)             │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                         GATEWAY CORE                              │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                    Gateway (dispatcher)                     │  │
//! │  │  ┌──────────┐  ┌─────────────┐  ┌────────────┐  ┌────────┐ │  │
//! │  │  │ Registry │  │ Credential  │  │ Classifier │  │ Normal-│ │  │
//! │  │  │ affinity │  │ Pool/cursor │  │ quota/fatal│  │  izer  │ │  │
//! │  │  └──────────┘  └─────────────┘  └────────────┘  └────────┘ │  │
//! │  └────────────────────────────┬───────────────────────────────┘  │
//! │                 GenerativeBackend (one call, no retry)            │
//! │          ┌────────────────────┴─────────────────────┐             │
//! │   ┌──────┴────────┐                         ┌───────┴───────┐     │
//! │   │ ManagedBackend│                         │ KeyedBackend  │     │
//! │   │  (Vertex AI)  │                         │  (AI Studio)  │     │
//! │   └───────────────┘                         └───────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Gateway`]: dispatch context; owns every piece of per-process state
//! - [`ModelRegistry`]: model to backend affinity
//! - [`CredentialPool`]: API keys plus the shared rotation cursor
//! - [`GenerativeBackend`]: one upstream client
//! - [`ErrorClassifier`]: decides whether a failure is worth rotating on
//! - [`ResponseEnvelope`]: normalized response
//!
//! # Quick Start
//!
//! ```ignore
//! use gateway_core::{load_config, Gateway, ToolCall, TOOL_NAME};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let gateway = Gateway::from_config(&config);
//!
//!     let result = gateway
//!         .call_tool(&ToolCall::new(TOOL_NAME, json!({ "prompt": "Hello" })))
//!         .await;
//!     println!("{}", result.text);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod classify;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod test_utils;
pub mod tool;

pub use backend::{
    BackendError, BackendHandle, BackendKind, GenerateRequest, GenerationConfig,
    GenerativeBackend, KeyedClientFactory, ThinkingLevel,
};
pub use classify::{DefaultClassifier, ErrorClass, ErrorClassifier};
pub use config::{
    default_config_path, load_config, load_config_from_path, BackendMode, ConfigError,
    ConfigOverrides, ConfigSource, GatewayConfig,
};
pub use credentials::{Credential, CredentialPool};
pub use dispatch::{compose_prompt, DispatchRequest, Dispatched, Gateway, GatewayBuilder};
pub use error::GatewayError;
pub use normalize::{normalize, ResponseEnvelope, Usage};
pub use registry::{Affinity, ModelCapabilities, ModelRegistry};
pub use tool::{ToolCall, ToolResult, TOOL_NAME};
