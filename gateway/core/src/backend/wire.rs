//! `generateContent` wire format
//!
//! Both backend kinds accept the same JSON body; only the URL and the auth
//! header differ. Capability filtering happens here so neither client has to
//! know which model families understand which options.

use std::time::Duration;

use serde_json::{json, Map, Value};

use super::traits::{BackendError, GenerateRequest, RawResponse, ThinkingLevel};
use crate::registry::{LatencyClass, ModelCapabilities, ThinkingStyle};

/// Budget (tokens) per level for budget-style models
fn thinking_budget(level: ThinkingLevel, min_budget: u32) -> u32 {
    match level {
        ThinkingLevel::None => min_budget,
        ThinkingLevel::Low => 1024,
        ThinkingLevel::Medium => 8192,
        ThinkingLevel::High => 24576,
    }
}

/// Level name for level-style models; they cannot switch thinking off
fn thinking_level_name(level: ThinkingLevel) -> &'static str {
    match level {
        ThinkingLevel::None | ThinkingLevel::Low => "low",
        ThinkingLevel::Medium => "medium",
        ThinkingLevel::High => "high",
    }
}

/// Build the request body, omitting anything the model does not support
#[must_use]
pub fn build_body(request: &GenerateRequest) -> Value {
    let caps = ModelCapabilities::for_model(&request.model);

    let mut body = Map::new();
    body.insert(
        "contents".into(),
        json!([{ "role": "user", "parts": [{ "text": request.prompt }] }]),
    );

    if request.config.grounding && caps.grounding {
        body.insert("tools".into(), json!([{ "googleSearch": {} }]));
    }

    if let Some(level) = request.config.thinking {
        let thinking_config = match caps.thinking {
            ThinkingStyle::Level => Some(json!({ "thinkingLevel": thinking_level_name(level) })),
            ThinkingStyle::Budget { min_budget } => {
                Some(json!({ "thinkingBudget": thinking_budget(level, min_budget) }))
            }
            ThinkingStyle::Unsupported => None,
        };
        if let Some(thinking_config) = thinking_config {
            body.insert(
                "generationConfig".into(),
                json!({ "thinkingConfig": thinking_config }),
            );
        }
    }

    Value::Object(body)
}

/// Per-call timeout: configured override, else the latency class
#[must_use]
pub fn timeout_for(request: &GenerateRequest, override_timeout: Option<Duration>) -> Duration {
    if let Some(timeout) = override_timeout {
        return timeout;
    }
    let class = if request.config.thinking == Some(ThinkingLevel::High) {
        LatencyClass::Deep
    } else {
        ModelCapabilities::for_model(&request.model).latency
    };
    class.timeout()
}

/// Send one prepared request and decode the JSON answer
///
/// Exactly one network round trip; the caller owns retry policy.
pub(crate) async fn send(
    builder: reqwest::RequestBuilder,
    body: &Value,
    timeout: Duration,
) -> Result<RawResponse, BackendError> {
    let response = builder
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(&e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(BackendError::Http {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(&e, timeout))?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout { after: timeout }
    } else {
        BackendError::Network(err.to_string())
    }
}

/// Extract `status: message` from a Google API error body
///
/// Falls back to the raw text when the body is not the usual envelope.
#[must_use]
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let error = &value["error"];
    let message = error["message"].as_str().unwrap_or_default();
    match error["status"].as_str() {
        Some(status) if !message.is_empty() => format!("{status}: {message}"),
        Some(status) => status.to_string(),
        None if !message.is_empty() => message.to_string(),
        None => body.trim().to_string(),
    }
}
