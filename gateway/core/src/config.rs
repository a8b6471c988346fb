//! TOML Configuration File Support
//!
//! Centralized configuration loading for the gateway, supporting a TOML file
//! at `~/.config/gemini-gateway/gateway.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! mode = "auto"
//! default_model = "gemini-2.5-flash"
//! request_timeout_secs = 120
//!
//! [managed]
//! project = "my-project"
//! region = "global"
//! model_regions = { "gemini-2.5-pro" = "us-central1" }
//!
//! [keyed]
//! api_keys = ["key-one", "key-two"]
//!
//! [models]
//! affinity = { "gemini-robotics-er-1.5-preview" = "keyed" }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DEFAULT_BASE_URL;
use crate::registry::{canonical_model, Affinity};

/// Model used when a call names none
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Managed region used when none is configured
pub const DEFAULT_REGION: &str = "global";

/// Every environment variable the loader reads
pub const ENV_VARS: &[&str] = &[
    "GEMINI_BACKEND",
    "GEMINI_USE_VERTEX",
    "GEMINI_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
    "GEMINI_LOCATION",
    "GEMINI_MODEL",
    "GEMINI_API_KEYS",
    "GEMINI_API_KEY",
    "GEMINI_MODEL_AFFINITY",
    "GEMINI_MODEL_REGIONS",
    "GATEWAY_REQUEST_TIMEOUT_SECS",
];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Backend Mode
// =============================================================================

/// Which backend kinds the process constructs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Managed clients only
    Managed,
    /// Keyed factory and credential pool only
    Keyed,
    /// Both; managed only when a project is configured
    #[default]
    Auto,
}

impl BackendMode {
    /// Whether managed clients are built in this mode
    #[must_use]
    pub fn builds_managed(self) -> bool {
        matches!(self, Self::Managed | Self::Auto)
    }

    /// Whether the keyed factory is built in this mode
    #[must_use]
    pub fn builds_keyed(self) -> bool {
        matches!(self, Self::Keyed | Self::Auto)
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Keyed => write!(f, "keyed"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" | "vertex" => Ok(Self::Managed),
            "keyed" | "studio" => Ok(Self::Keyed),
            "auto" | "either" => Ok(Self::Auto),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend mode '{other}' (expected managed, keyed or auto)"
            ))),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Routing mode: managed, keyed or auto
    pub mode: Option<String>,

    /// Model used when a call names none
    pub default_model: Option<String>,

    /// Fixed per-call timeout, overriding the latency class
    pub request_timeout_secs: Option<u64>,
}

/// Managed-identity section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedToml {
    /// Cloud project
    pub project: Option<String>,

    /// Default region
    pub region: Option<String>,

    /// Per-model region pins
    pub model_regions: HashMap<String, String>,
}

/// Keyed-backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyedToml {
    /// Credential pool, in rotation order
    pub api_keys: Vec<String>,

    /// API root
    pub base_url: Option<String>,
}

/// Model section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsToml {
    /// Per-model backend affinity
    pub affinity: HashMap<String, String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// Backend section
    pub backend: BackendToml,

    /// Managed section
    pub managed: ManagedToml,

    /// Keyed section
    pub keyed: KeyedToml,

    /// Models section
    pub models: ModelsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved gateway configuration
#[derive(Clone)]
pub struct GatewayConfig {
    /// Which backend kinds to construct
    pub mode: BackendMode,

    /// Model used when a call names none
    pub default_model: String,

    /// Fixed per-call timeout; `None` uses the latency class
    pub request_timeout: Option<Duration>,

    /// Managed project
    pub project: Option<String>,

    /// Default managed region
    pub region: String,

    /// Per-model managed region pins, keyed by canonical model id
    pub model_regions: HashMap<String, String>,

    /// Keyed credentials, in rotation order
    pub api_keys: Vec<String>,

    /// Keyed API root
    pub base_url: String,

    /// Per-model affinity entries layered over the built-ins
    pub affinity: HashMap<String, Affinity>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Auto,
            default_model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
            project: None,
            region: DEFAULT_REGION.to_string(),
            model_regions: HashMap::new(),
            api_keys: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            affinity: HashMap::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("mode", &self.mode)
            .field("default_model", &self.default_model)
            .field("request_timeout", &self.request_timeout)
            .field("project", &self.project)
            .field("region", &self.region)
            .field("model_regions", &self.model_regions)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("base_url", &self.base_url)
            .field("affinity", &self.affinity)
            .field("config_file_path", &self.config_file_path)
            .field("source", &self.source)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Region for a model: its pin if any, else the default region
    #[must_use]
    pub fn region_for(&self, model: &str) -> &str {
        self.model_regions
            .get(&canonical_model(model))
            .map_or(self.region.as_str(), String::as_str)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] when managed mode has no
    /// project or the request timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == BackendMode::Managed && self.project.is_none() {
            return Err(ConfigError::ValidationError(
                "managed mode requires a project (GEMINI_PROJECT or [managed] project)".into(),
            ));
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationError(
                "request timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/gemini-gateway/gateway.toml` or
/// `~/.config/gemini-gateway/gateway.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gemini-gateway").join("gateway.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// value fails validation. A missing config file is not an error.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path plus the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if a value fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<GatewayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = GatewayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: GatewayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, &env)?;
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut GatewayConfig, toml: &GatewayToml) -> Result<(), ConfigError> {
    if let Some(ref mode) = toml.backend.mode {
        config.mode = mode.parse()?;
    }
    if let Some(ref model) = toml.backend.default_model {
        config.default_model = model.trim().to_string();
    }
    if let Some(secs) = toml.backend.request_timeout_secs {
        config.request_timeout = Some(Duration::from_secs(secs));
    }

    if let Some(ref project) = toml.managed.project {
        config.project = non_empty(project);
    }
    if let Some(ref region) = toml.managed.region {
        config.region = region.trim().to_string();
    }
    for (model, region) in &toml.managed.model_regions {
        config
            .model_regions
            .insert(canonical_model(model), region.trim().to_string());
    }

    if !toml.keyed.api_keys.is_empty() {
        config.api_keys.clone_from(&toml.keyed.api_keys);
    }
    if let Some(ref base_url) = toml.keyed.base_url {
        config.base_url = base_url.trim().to_string();
    }

    for (model, affinity) in &toml.models.affinity {
        config
            .affinity
            .insert(canonical_model(model), parse_affinity(model, affinity)?);
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut GatewayConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).and_then(|v| non_empty(&v));

    if let Some(mode) = var("GEMINI_BACKEND") {
        config.mode = mode.parse()?;
        config.source = ConfigSource::Env;
    } else if let Some(flag) = var("GEMINI_USE_VERTEX") {
        config.mode = if is_truthy(&flag) {
            BackendMode::Managed
        } else {
            BackendMode::Keyed
        };
        config.source = ConfigSource::Env;
    }

    if let Some(project) = var("GEMINI_PROJECT").or_else(|| var("GOOGLE_CLOUD_PROJECT")) {
        config.project = Some(project);
        config.source = ConfigSource::Env;
    }
    if let Some(region) = var("GEMINI_LOCATION") {
        config.region = region;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = var("GEMINI_MODEL") {
        config.default_model = model;
        config.source = ConfigSource::Env;
    }

    // The single key is used when the list is absent or has no usable entry.
    let listed: Option<Vec<String>> =
        var("GEMINI_API_KEYS").map(|keys| keys.split(',').filter_map(non_empty).collect());
    let single = var("GEMINI_API_KEY").and_then(|key| non_empty(&key));
    let keys = match (listed, single) {
        (Some(keys), _) if !keys.is_empty() => Some(keys),
        (_, Some(key)) => Some(vec![key]),
        (listed, None) => listed,
    };
    if let Some(keys) = keys {
        config.api_keys = keys;
        config.source = ConfigSource::Env;
    }

    if let Some(pairs) = var("GEMINI_MODEL_AFFINITY") {
        for (model, affinity) in parse_pairs("GEMINI_MODEL_AFFINITY", &pairs)? {
            let affinity = parse_affinity(&model, &affinity)?;
            config.affinity.insert(canonical_model(&model), affinity);
        }
        config.source = ConfigSource::Env;
    }
    if let Some(pairs) = var("GEMINI_MODEL_REGIONS") {
        for (model, region) in parse_pairs("GEMINI_MODEL_REGIONS", &pairs)? {
            config.model_regions.insert(canonical_model(&model), region);
        }
        config.source = ConfigSource::Env;
    }

    if let Some(timeout) = var("GATEWAY_REQUEST_TIMEOUT_SECS") {
        let secs = timeout.parse::<u64>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "GATEWAY_REQUEST_TIMEOUT_SECS must be a number of seconds, got '{timeout}'"
            ))
        })?;
        config.request_timeout = Some(Duration::from_secs(secs));
        config.source = ConfigSource::Env;
    }

    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_affinity(model: &str, value: &str) -> Result<Affinity, ConfigError> {
    value.parse().map_err(|e: String| {
        ConfigError::ValidationError(format!("affinity for model '{model}': {e}"))
    })
}

/// Parse `model=value,model=value`
fn parse_pairs(var: &str, raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (model, value) = entry.split_once('=').ok_or_else(|| {
                ConfigError::ValidationError(format!("{var}: expected model=value, got '{entry}'"))
            })?;
            let (model, value) = (model.trim(), value.trim());
            if model.is_empty() || value.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{var}: expected model=value, got '{entry}'"
                )));
            }
            Ok((model.to_string(), value.to_string()))
        })
        .collect()
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend mode override
    pub mode: Option<BackendMode>,

    /// Default model override
    pub default_model: Option<String>,

    /// Project override
    pub project: Option<String>,

    /// Region override
    pub region: Option<String>,

    /// Request timeout override (seconds)
    pub request_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend mode override
    #[must_use]
    pub fn with_mode(mut self, mode: BackendMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set project override
    #[must_use]
    pub fn with_project(mut self, project: String) -> Self {
        self.project = Some(project);
        self
    }

    /// Set region override
    #[must_use]
    pub fn with_region(mut self, region: String) -> Self {
        self.region = Some(region);
        self
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut GatewayConfig) {
        if self.mode.is_some()
            || self.default_model.is_some()
            || self.project.is_some()
            || self.region.is_some()
            || self.request_timeout_secs.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(ref model) = self.default_model {
            config.default_model = model.clone();
        }
        if let Some(ref project) = self.project {
            config.project = Some(project.clone());
        }
        if let Some(ref region) = self.region {
            config.region = region.clone();
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Some(Duration::from_secs(secs));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();

        assert_eq!(config.mode, BackendMode::Auto);
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.region, "global");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.project.is_none());
        assert!(config.api_keys.is_empty());
        assert!(config.request_timeout.is_none());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("gemini-gateway/gateway.toml"));
        }
    }

    // =========================================================================
    // File Loading Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[backend]
mode = "auto"
default_model = "gemini-2.5-pro"
request_timeout_secs = 90

[managed]
project = "lab"
region = "us-central1"
model_regions = { "gemini-3-pro-preview" = "global" }

[keyed]
api_keys = ["k1", "k2"]
base_url = "http://localhost:9999/v1beta"

[models]
affinity = { "Gemini-2.5-Pro" = "managed" }
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.project.as_deref(), Some("lab"));
        assert_eq!(config.region, "us-central1");
        assert_eq!(config.region_for("gemini-3-pro-preview"), "global");
        assert_eq!(config.region_for("gemini-2.5-flash"), "us-central1");
        assert_eq!(config.api_keys, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(config.base_url, "http://localhost:9999/v1beta");
        assert_eq!(config.affinity.get("gemini-2.5-pro"), Some(&Affinity::Managed));
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_empty_toml() {
        let file = write_toml("");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/gemini-gateway/gateway.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[backend\nmode = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_mode_is_validation_error() {
        let file = write_toml("[backend]\nmode = \"hybrid\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_affinity_is_validation_error() {
        let file = write_toml("[models]\naffinity = { \"gemini-x\" = \"somewhere\" }\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_managed_mode_requires_project() {
        let file = write_toml("[backend]\nmode = \"managed\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    // =========================================================================
    // Environment Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml(
            r#"
[backend]
default_model = "from-file"

[keyed]
api_keys = ["file-key"]
"#,
        );

        let env = env_from(&[
            ("GEMINI_MODEL", "from-env"),
            ("GEMINI_API_KEYS", "e1, e2,,e3"),
            ("GEMINI_API_KEY", "ignored"),
        ]);
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.default_model, "from-env");
        assert_eq!(
            config.api_keys,
            vec!["e1".to_string(), "e2".to_string(), "e3".to_string()]
        );
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_single_key_fallback() {
        let env = env_from(&[("GEMINI_API_KEY", " solo ")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.api_keys, vec!["solo".to_string()]);
    }

    #[test]
    fn test_blank_key_list_falls_back_to_single_key() {
        let env = env_from(&[("GEMINI_API_KEYS", " , "), ("GEMINI_API_KEY", "solo")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.api_keys, vec!["solo".to_string()]);

        let env = env_from(&[("GEMINI_API_KEYS", "k1,k2"), ("GEMINI_API_KEY", "solo")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.api_keys, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn test_legacy_vertex_flag() {
        let env = env_from(&[("GEMINI_USE_VERTEX", "yes"), ("GEMINI_PROJECT", "lab")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.mode, BackendMode::Managed);

        let env = env_from(&[("GEMINI_USE_VERTEX", "0")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.mode, BackendMode::Keyed);

        let env = env_from(&[("GEMINI_BACKEND", "studio"), ("GEMINI_USE_VERTEX", "1")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.mode, BackendMode::Keyed);
    }

    #[test]
    fn test_project_fallback_variable() {
        let env = env_from(&[("GOOGLE_CLOUD_PROJECT", "ambient-project")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.project.as_deref(), Some("ambient-project"));
    }

    #[test]
    fn test_env_pairs() {
        let env = env_from(&[
            ("GEMINI_MODEL_AFFINITY", "gemini-2.5-pro=managed, gemini-x = keyed"),
            ("GEMINI_MODEL_REGIONS", "gemini-2.5-pro=us-east5"),
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "30"),
        ]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.affinity.get("gemini-x"), Some(&Affinity::Keyed));
        assert_eq!(config.region_for("gemini-2.5-pro"), "us-east5");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_bad_env_values() {
        for (key, value) in [
            ("GEMINI_BACKEND", "cloud"),
            ("GEMINI_MODEL_AFFINITY", "gemini-x"),
            ("GEMINI_MODEL_AFFINITY", "gemini-x=nowhere"),
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "soon"),
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "0"),
        ] {
            let result = load_config_with_env(None, env_from(&[(key, value)]));
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "{key}={value}"
            );
        }
    }

    // =========================================================================
    // CLI Override Tests
    // =========================================================================

    #[test]
    fn test_cli_overrides_env() {
        let env = env_from(&[("GEMINI_MODEL", "from-env")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_default_model("from-cli".to_string())
            .with_mode(BackendMode::Keyed)
            .apply(&mut config);

        assert_eq!(config.default_model, "from-cli");
        assert_eq!(config.mode, BackendMode::Keyed);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = GatewayConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
        assert_eq!(config.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::Cli), "CLI");
        assert_eq!(format!("{}", ConfigSource::Env), "environment");
        assert_eq!(format!("{}", ConfigSource::File), "config file");
        assert_eq!(format!("{}", ConfigSource::Default), "default");
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = GatewayConfig {
            api_keys: vec!["very-secret".into()],
            ..GatewayConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("1 redacted"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ValidationError("bad".into());
        assert_eq!(err.to_string(), "Invalid configuration: bad");
    }
}
