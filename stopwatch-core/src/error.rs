//! Error taxonomy for the stopwatch.

use thiserror::Error;

/// A format template could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unterminated token starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("empty token at byte {offset}")]
    EmptyToken { offset: usize },
}

/// Rejected configuration, detected at `init`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("update interval must be greater than zero")]
    ZeroInterval,

    #[error("malformed format: {0}")]
    MalformedFormat(#[from] FormatError),

    #[error("invalid config document: {0}")]
    Parse(String),
}

/// Errors returned by stopwatch operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StopwatchError {
    /// The instance was destroyed; only a fresh `init` is valid now.
    #[error("stopwatch has been destroyed")]
    Destroyed,

    /// No stopwatch is attached to this slot.
    #[error("stopwatch was never initialized")]
    Uninitialized,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
