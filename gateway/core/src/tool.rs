//! Tool-invocation boundary
//!
//! The single `ask_gemini` tool as the framing layer sees it: JSON
//! arguments in, `{text, isError}` out. Every failure becomes an
//! error-flagged result here; nothing escapes as a fault.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{GenerationConfig, ThinkingLevel};
use crate::dispatch::{DispatchRequest, Dispatched, Gateway};
use crate::error::GatewayError;
use crate::normalize::ResponseEnvelope;

/// Name of the one exposed tool
pub const TOOL_NAME: &str = "ask_gemini";

/// A tool call handed over by the framing layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// JSON arguments
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Create a call
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A tool result for the framing layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable output
    pub text: String,
    /// Marks the call as failed
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn error(text: String) -> Self {
        Self {
            text,
            is_error: true,
        }
    }
}

/// Arguments accepted by `ask_gemini`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct AskArgs {
    prompt: Option<String>,
    model: Option<String>,
    context: Option<String>,
    grounding: Option<bool>,
    thinking: Option<String>,
}

impl AskArgs {
    fn into_request(self) -> Result<DispatchRequest, String> {
        let prompt = self
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| "missing required argument 'prompt'".to_string())?;

        let thinking = self
            .thinking
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.parse::<ThinkingLevel>())
            .transpose()?;

        Ok(DispatchRequest {
            prompt,
            model: self.model,
            context: self.context,
            config: GenerationConfig {
                grounding: self.grounding.unwrap_or(false),
                thinking,
            },
        })
    }
}

impl Gateway {
    /// Handle one tool call; never fails
    pub async fn call_tool(&self, call: &ToolCall) -> ToolResult {
        if call.name != TOOL_NAME {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::error(GatewayError::UnknownTool(call.name.clone()).to_string());
        }

        let args: AskArgs = if call.arguments.is_null() {
            AskArgs::default()
        } else {
            match serde_json::from_value(call.arguments.clone()) {
                Ok(args) => args,
                Err(e) => return ToolResult::error(format!("Invalid arguments: {e}")),
            }
        };

        let model = self.resolve_model(args.model.as_deref());
        let request = match args.into_request() {
            Ok(request) => request,
            Err(e) => return ToolResult::error(format!("[{model}] Invalid arguments: {e}")),
        };

        debug!(model = %model, grounding = request.config.grounding, "Handling tool call");
        self.ask(&request).await
    }

    /// Dispatch a request and render the result for display
    pub async fn ask(&self, request: &DispatchRequest) -> ToolResult {
        match self.dispatch(request).await {
            Ok(dispatched) => ToolResult::ok(render_success(&dispatched)),
            Err(error) => {
                let model = self.resolve_model(request.model.as_deref());
                ToolResult::error(render_failure(&model, &error))
            }
        }
    }
}

/// Header line naming the model and the client that served it
#[must_use]
pub fn header(model: &str, backend: &str) -> String {
    format!("[{model} | {backend}]")
}

fn render_success(dispatched: &Dispatched) -> String {
    let envelope = &dispatched.envelope;
    let mut out = header(&dispatched.model, &envelope.handle.to_string());
    out.push_str("\n\n");

    if envelope.text.is_empty() {
        match envelope.block_reason {
            Some(ref reason) => {
                let _ = write!(out, "(no text returned; prompt blocked: {reason})");
            }
            None => out.push_str("(no text returned)"),
        }
    } else {
        out.push_str(&envelope.text);
    }

    append_grounding(&mut out, envelope);

    if let Some(usage) = envelope.usage {
        let _ = write!(out, "\n\nTokens: {}", usage.total);
        if let Some(thinking) = usage.thinking {
            let _ = write!(out, " ({thinking} thinking)");
        }
    }
    out
}

fn append_grounding(out: &mut String, envelope: &ResponseEnvelope) {
    let Some(ref grounding) = envelope.grounding else {
        return;
    };
    out.push_str("\n\n---\nGrounded with Google Search");
    if !grounding.queries.is_empty() {
        let _ = write!(out, "\nQueries: {}", grounding.queries.join(", "));
    }
    if !grounding.sources.is_empty() {
        out.push_str("\nSources:");
        for source in &grounding.sources {
            match source.title {
                Some(ref title) => {
                    let _ = write!(out, "\n- {title}: {}", source.uri);
                }
                None => {
                    let _ = write!(out, "\n- {}", source.uri);
                }
            }
        }
    }
}

fn render_failure(model: &str, error: &GatewayError) -> String {
    let backend = error.backend().map_or("no backend", |kind| kind.label());
    format!("{}\n\nError: {error}", header(model, backend))
}
