use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable bridge configuration, assembled and validated once before any
/// component is built.
///
/// This replaces process-wide environment toggles with one explicit value:
/// the recognized options are the spec location, the base URL, additional
/// static headers, the outbound timeout, and the tool enable/advertise flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// API description location: file path, http(s) URL, or inline JSON/YAML.
    pub spec: String,

    /// Optional `sha256:<hex>` hash of the raw description bytes.
    #[serde(default)]
    pub spec_hash: Option<String>,

    /// What to do when the hash does not match.
    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    /// Base URL prepended to every resolved path. Must be absolute http(s).
    pub base_url: String,

    /// Static headers applied to every outbound call.
    #[serde(default)]
    pub additional_headers: HashMap<String, String>,

    /// Outbound connect/response timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Whether any tools are registered at all.
    #[serde(default = "default_true")]
    pub enable_tools: bool,

    /// Whether the tools capability is advertised during the handshake.
    #[serde(default = "default_true")]
    pub advertise_tools: bool,
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log a warning if the hash doesn't match.
    #[default]
    Warn,
    /// Fail startup if the hash doesn't match.
    Fail,
    /// Skip hash verification.
    Ignore,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl BridgeConfig {
    /// Minimal configuration with defaults for everything optional.
    #[must_use]
    pub fn new(spec: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            base_url: base_url.into(),
            additional_headers: HashMap::new(),
            request_timeout_secs: default_timeout_secs(),
            enable_tools: true,
            advertise_tools: true,
        }
    }

    /// Validate the configuration before any component is built.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the spec location is empty, the base
    /// URL is empty or not absolute http(s), the timeout is zero, or the
    /// declared spec hash is not of the form `sha256:<hex>`.
    pub fn validate(&self) -> Result<()> {
        if self.spec.trim().is_empty() {
            return Err(BridgeError::Config(
                "spec location must not be empty".to_string(),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(BridgeError::Config(
                "baseUrl must not be empty".to_string(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(BridgeError::Config(format!(
                "baseUrl '{}' must be an absolute http(s) URL",
                self.base_url
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(BridgeError::Config(
                "requestTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        if let Some(hash) = &self.spec_hash
            && !hash.starts_with("sha256:")
        {
            return Err(BridgeError::Config(format!(
                "specHash '{hash}' must be of the form sha256:<hex>"
            )));
        }

        Ok(())
    }
}

/// Parse `Name: value` header lines (one per line) into a header map.
///
/// Lines without a colon, or with an empty name or value, are skipped.
#[must_use]
pub fn parse_header_lines(text: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in text.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if !name.is_empty() && !value.is_empty() {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    headers
}
