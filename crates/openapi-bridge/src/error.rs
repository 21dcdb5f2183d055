//! Error types for `openapi-bridge`.
//!
//! Startup errors (`Config`, `Spec*`) are fatal: the bridge must not serve a
//! partially built tool set. Per-call errors (`MissingPathParameter`,
//! `InvalidUrl`) are recoverable and are converted into error-flagged tool
//! results at the registry boundary.

use thiserror::Error;

/// Main error type for the bridge engine.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors (invalid base URL, malformed header lines).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structural problems in the API description (no paths, unresolvable
    /// `$ref`, path-parameter invariant violations).
    #[error("Description error: {0}")]
    Spec(String),

    #[error("Failed to read API description file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch API description from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("Failed to parse API description from '{location}': {source}")]
    SpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A `{placeholder}` in the path template had no matching call argument.
    #[error("Missing required path parameter: {0}")]
    MissingPathParameter(String),

    /// The compiled request URL did not parse as an absolute URL.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
