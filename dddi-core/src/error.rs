//! Error Types
//!
//! Structural errors (bad specs, read-only targets) surface synchronously from
//! registration calls. Provider failures are not errors in this sense: they
//! travel as [`ProviderError`] inside a computation and are only logged.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DddiError>;

/// Errors raised by the binding engine and its default collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DddiError {
    /// A dependency spec was neither a path string nor a function.
    #[error("unsupported dependency spec kind: {kind}")]
    UnsupportedSpecKind { kind: String },

    /// The named-injection provider form was used.
    #[error("named-injection provider specs are not supported yet")]
    NotSupportedYet,

    /// A provider spec had an unrecognized shape.
    #[error("unknown provider spec: {kind}")]
    UnknownSpec { kind: String },

    /// The target expression cannot be assigned to.
    #[error("target is not writable: '{target}'")]
    NonWritableTarget { target: String },

    /// A comparison-mode tag outside `''`, `'='` and `'@'`.
    #[error("unsupported watch mode: [{tag}]")]
    UnsupportedWatchMode { tag: String },

    /// A linked target array stopped evaluating to an array.
    #[error("'{target}' does not evaluate to an array anymore")]
    StaleTargetVanished { target: String },

    /// The expression text could not be compiled.
    #[error("invalid expression '{text}': {reason}")]
    InvalidExpression { text: String, reason: String },

    /// Assignment through an expression failed at runtime.
    #[error("cannot assign to '{path}': {reason}")]
    AssignFailed { path: String, reason: String },

    /// The digest loop did not settle within the configured number of passes.
    #[error("digest did not settle after {ttl} passes")]
    DigestOverflow { ttl: usize },

    /// Engine configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DddiError {
    pub(crate) fn invalid_expression(text: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn assign_failed(path: &str, reason: impl Into<String>) -> Self {
        Self::AssignFailed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a provider's computation, synchronous or asynchronous.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Create a provider error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ProviderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ProviderError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
