//! Response Normalizer
//!
//! Turns a raw `generateContent` body into a [`ResponseEnvelope`]. Never
//! fails: a malformed or partial body degrades to whatever could be read,
//! with missing fields absent or zero.

use serde_json::Value;

use crate::backend::{BackendHandle, RawResponse};

/// One web source the model consulted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroundingSource {
    /// Page title, when reported
    pub title: Option<String>,
    /// Page URI
    pub uri: String,
}

/// Search grounding details
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grounding {
    /// Queries the model issued
    pub queries: Vec<String>,
    /// Sources it drew from
    pub sources: Vec<GroundingSource>,
}

/// Token accounting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    /// Total tokens billed for the call
    pub total: u64,
    /// Reasoning tokens, when the backend reports them
    pub thinking: Option<u64>,
}

/// Uniform result of one successful dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// Generated text; may be empty
    pub text: String,
    /// Client that produced the response
    pub handle: BackendHandle,
    /// Present when the backend consulted search while generating
    pub grounding: Option<Grounding>,
    /// Present when the backend reported usage
    pub usage: Option<Usage>,
    /// Candidate finish reason
    pub finish_reason: Option<String>,
    /// Prompt-level block reason, set when the prompt itself was refused
    pub block_reason: Option<String>,
}

impl ResponseEnvelope {
    /// Whether search grounding was used
    #[must_use]
    pub fn grounded(&self) -> bool {
        self.grounding.is_some()
    }
}

/// Build an envelope from a raw response body
#[must_use]
pub fn normalize(raw: &RawResponse, handle: &BackendHandle) -> ResponseEnvelope {
    let candidate = &raw["candidates"][0];

    ResponseEnvelope {
        text: extract_text(candidate),
        handle: handle.clone(),
        grounding: extract_grounding(candidate),
        usage: extract_usage(raw),
        finish_reason: candidate["finishReason"].as_str().map(str::to_string),
        block_reason: raw["promptFeedback"]["blockReason"]
            .as_str()
            .map(str::to_string),
    }
}

fn extract_text(candidate: &Value) -> String {
    let Some(parts) = candidate["content"]["parts"].as_array() else {
        return String::new();
    };
    parts
        .iter()
        .filter(|part| !part["thought"].as_bool().unwrap_or(false))
        .filter_map(|part| part["text"].as_str())
        .collect()
}

fn extract_grounding(candidate: &Value) -> Option<Grounding> {
    let metadata = candidate.get("groundingMetadata").filter(|m| m.is_object())?;

    let queries = metadata["webSearchQueries"]
        .as_array()
        .map(|qs| {
            qs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let sources = metadata["groundingChunks"]
        .as_array()
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| {
                    let web = &chunk["web"];
                    let uri = web["uri"].as_str()?;
                    Some(GroundingSource {
                        title: web["title"].as_str().map(str::to_string),
                        uri: uri.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Grounding { queries, sources })
}

fn extract_usage(raw: &Value) -> Option<Usage> {
    let usage = raw.get("usageMetadata").filter(|u| u.is_object())?;
    let count = |key: &str| usage[key].as_u64();

    let total = count("totalTokenCount").unwrap_or_else(|| {
        count("promptTokenCount")
            .unwrap_or(0)
            .saturating_add(count("candidatesTokenCount").unwrap_or(0))
    });

    Some(Usage {
        total,
        thinking: count("thoughtsTokenCount"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn keyed() -> BackendHandle {
        BackendHandle::Keyed { slot: 0, total: 1 }
    }

    #[test]
    fn test_full_response() {
        let raw = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "planning...", "thought": true },
                    { "text": "Hello " },
                    { "text": "world" }
                ]},
                "finishReason": "STOP",
                "groundingMetadata": {
                    "webSearchQueries": ["rust async"],
                    "groundingChunks": [
                        { "web": { "uri": "https://tokio.rs", "title": "Tokio" } },
                        { "retrievedContext": {} }
                    ]
                }
            }],
            "usageMetadata": { "totalTokenCount": 42, "thoughtsTokenCount": 7 }
        });

        let envelope = normalize(&raw, &keyed());
        assert_eq!(envelope.text, "Hello world");
        assert_eq!(envelope.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(
            envelope.usage,
            Some(Usage {
                total: 42,
                thinking: Some(7)
            })
        );
        assert!(envelope.grounded());
        assert_eq!(
            envelope.grounding,
            Some(Grounding {
                queries: vec!["rust async".into()],
                sources: vec![GroundingSource {
                    title: Some("Tokio".into()),
                    uri: "https://tokio.rs".into()
                }],
            })
        );
    }

    #[test]
    fn test_malformed_degrades() {
        for raw in [json!(null), json!("oops"), json!({ "candidates": "nope" }), json!({})] {
            let envelope = normalize(&raw, &keyed());
            assert_eq!(envelope.text, "");
            assert!(!envelope.grounded());
            assert!(envelope.usage.is_none());
        }
    }

    #[test]
    fn test_usage_without_total() {
        let raw = json!({
            "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 5 }
        });
        assert_eq!(
            normalize(&raw, &keyed()).usage,
            Some(Usage {
                total: 15,
                thinking: None
            })
        );
    }

    #[test]
    fn test_oversized_usage_saturates() {
        let raw = json!({
            "usageMetadata": { "promptTokenCount": u64::MAX, "candidatesTokenCount": 1 }
        });
        assert_eq!(normalize(&raw, &keyed()).usage.map(|u| u.total), Some(u64::MAX));
    }

    #[test]
    fn test_blocked_prompt() {
        let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let envelope = normalize(&raw, &keyed());
        assert_eq!(envelope.text, "");
        assert_eq!(envelope.block_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = json!({
            "candidates": [{ "content": { "parts": [{ "text": "same" }] } }],
            "usageMetadata": { "totalTokenCount": 3 }
        });
        let handle = BackendHandle::Managed {
            region: "global".into(),
        };
        let first = normalize(&raw, &handle);
        let second = normalize(&raw, &handle);
        assert_eq!(first, second);
    }
}
