//! Model Capability Registry
//!
//! Static classification of which upstream backend kind can serve a model,
//! plus the per-model capability table the wire layer consults before it
//! builds a request.
//!
//! # Affinity
//!
//! ```text
//! "gemini-robotics-er-1.5-preview" ──> Keyed    (only on the keyed endpoint)
//! "gemini-2.5-pro"                 ──> Managed  (pinned by configuration)
//! "gemini-4-ultra-next"            ──> Either   (unknown: managed first, then keyed)
//! ```
//!
//! Unknown models never fail lookup. A newly released model stays callable
//! without a redeploy because it lands on [`Affinity::Either`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Affinity
// ============================================================================

/// Routing preference recorded for a model identifier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    /// Served only by the managed-identity endpoint
    Managed,
    /// Served only by the credential-keyed endpoint
    Keyed,
    /// Either backend; managed is preferred when one is configured
    #[default]
    Either,
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Keyed => write!(f, "keyed"),
            Self::Either => write!(f, "either"),
        }
    }
}

impl FromStr for Affinity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" | "vertex" => Ok(Self::Managed),
            "keyed" | "studio" => Ok(Self::Keyed),
            "either" | "auto" => Ok(Self::Either),
            other => Err(format!("unknown affinity '{other}'")),
        }
    }
}

/// Preview models that the managed endpoint does not serve yet
const BUILTIN_KEYED_MODELS: &[&str] = &[
    "gemini-robotics-er-1.5-preview",
    "gemini-2.5-computer-use-preview-10-2025",
    "gemini-2.5-flash-native-audio-preview-12-2025",
];

// ============================================================================
// Registry
// ============================================================================

/// Read-only mapping from model identifier to [`Affinity`]
///
/// Built once at startup; lookups are pure.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    entries: HashMap<String, Affinity>,
}

impl ModelRegistry {
    /// Create an empty registry (every model resolves to `Either`)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the built-in keyed-only preview models
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for model in BUILTIN_KEYED_MODELS {
            registry.insert(*model, Affinity::Keyed);
        }
        registry
    }

    /// Build a registry from configured entries layered over the built-ins
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Affinity)>,
        S: AsRef<str>,
    {
        let mut registry = Self::with_builtin();
        for (model, affinity) in entries {
            registry.insert(model.as_ref(), affinity);
        }
        registry
    }

    fn insert(&mut self, model: &str, affinity: Affinity) {
        self.entries.insert(canonical_model(model), affinity);
    }

    /// Affinity for a model; `Either` when the model has no entry
    #[must_use]
    pub fn affinity(&self, model: &str) -> Affinity {
        self.entries
            .get(&canonical_model(model))
            .copied()
            .unwrap_or_default()
    }

    /// Number of explicit entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no explicit entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize a model identifier for lookup
///
/// The keyed API names models as `models/{id}`; both spellings map to the
/// same entry.
#[must_use]
pub fn canonical_model(model: &str) -> String {
    let trimmed = model.trim();
    trimmed
        .strip_prefix("models/")
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

// ============================================================================
// Capabilities
// ============================================================================

/// How a model family accepts a reasoning-depth request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThinkingStyle {
    /// Named level (`thinkingLevel`)
    Level,
    /// Token budget (`thinkingBudget`); `min_budget` is the smallest value
    /// the family accepts, 0 when thinking can be switched off
    Budget {
        /// Smallest accepted budget
        min_budget: u32,
    },
    /// No reasoning control; the parameter is omitted
    Unsupported,
}

/// Expected response latency, used to size the per-call timeout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatencyClass {
    /// Lite models
    Fast,
    /// Flash-class models
    Standard,
    /// Pro-class models and deep reasoning requests
    Deep,
}

impl LatencyClass {
    /// Timeout for one outbound call in this class
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Fast => Duration::from_secs(60),
            Self::Standard => Duration::from_secs(120),
            Self::Deep => Duration::from_secs(300),
        }
    }
}

/// What the wire layer may send to a given model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Reasoning control style
    pub thinking: ThinkingStyle,
    /// Whether search grounding may be requested
    pub grounding: bool,
    /// Latency class
    pub latency: LatencyClass,
}

impl ModelCapabilities {
    /// Derive capabilities from the model identifier
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let id = canonical_model(model);
        let special = id.contains("computer-use") || id.contains("native-audio");

        let thinking = if special || id.contains("robotics") {
            ThinkingStyle::Unsupported
        } else if id.starts_with("gemini-3") {
            ThinkingStyle::Level
        } else if id.starts_with("gemini-2.5") {
            let min_budget = if id.contains("pro") { 128 } else { 0 };
            ThinkingStyle::Budget { min_budget }
        } else {
            ThinkingStyle::Unsupported
        };

        let latency = if id.contains("lite") {
            LatencyClass::Fast
        } else if id.contains("pro") {
            LatencyClass::Deep
        } else {
            LatencyClass::Standard
        };

        Self {
            thinking,
            grounding: !special,
            latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_either() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.affinity("gemini-9-hyper"), Affinity::Either);
        assert_eq!(registry.affinity(""), Affinity::Either);
        assert_eq!(registry.affinity("   "), Affinity::Either);
    }

    #[test]
    fn test_builtin_preview_models_are_keyed() {
        let registry = ModelRegistry::with_builtin();
        assert_eq!(
            registry.affinity("gemini-robotics-er-1.5-preview"),
            Affinity::Keyed
        );
        assert_eq!(
            registry.affinity("models/gemini-2.5-computer-use-preview-10-2025"),
            Affinity::Keyed
        );
        assert_eq!(registry.affinity("gemini-2.5-flash"), Affinity::Either);
    }

    #[test]
    fn test_configured_entries_override_builtin() {
        let registry = ModelRegistry::from_entries([
            ("gemini-robotics-er-1.5-preview", Affinity::Managed),
            ("Gemini-2.5-Pro", Affinity::Managed),
        ]);
        assert_eq!(
            registry.affinity("gemini-robotics-er-1.5-preview"),
            Affinity::Managed
        );
        assert_eq!(registry.affinity("gemini-2.5-pro"), Affinity::Managed);
    }

    #[test]
    fn test_affinity_parse() {
        assert_eq!("managed".parse::<Affinity>(), Ok(Affinity::Managed));
        assert_eq!(" Keyed ".parse::<Affinity>(), Ok(Affinity::Keyed));
        assert_eq!("studio".parse::<Affinity>(), Ok(Affinity::Keyed));
        assert_eq!("auto".parse::<Affinity>(), Ok(Affinity::Either));
        assert!("sometimes".parse::<Affinity>().is_err());
    }

    #[test]
    fn test_thinking_style_by_family() {
        assert_eq!(
            ModelCapabilities::for_model("gemini-3-pro-preview").thinking,
            ThinkingStyle::Level
        );
        assert_eq!(
            ModelCapabilities::for_model("gemini-2.5-flash").thinking,
            ThinkingStyle::Budget { min_budget: 0 }
        );
        assert_eq!(
            ModelCapabilities::for_model("gemini-2.5-pro").thinking,
            ThinkingStyle::Budget { min_budget: 128 }
        );
        assert_eq!(
            ModelCapabilities::for_model("gemini-2.0-flash").thinking,
            ThinkingStyle::Unsupported
        );
        assert_eq!(
            ModelCapabilities::for_model("gemini-2.5-computer-use-preview-10-2025").thinking,
            ThinkingStyle::Unsupported
        );
    }

    #[test]
    fn test_grounding_and_latency() {
        let audio = ModelCapabilities::for_model("gemini-2.5-flash-native-audio-preview-12-2025");
        assert!(!audio.grounding);

        let lite = ModelCapabilities::for_model("gemini-2.5-flash-lite");
        assert!(lite.grounding);
        assert_eq!(lite.latency, LatencyClass::Fast);
        assert_eq!(lite.latency.timeout(), Duration::from_secs(60));

        let pro = ModelCapabilities::for_model("gemini-2.5-pro");
        assert_eq!(pro.latency, LatencyClass::Deep);
    }
}
