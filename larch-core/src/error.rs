//! Error types for the reactive runtime.
//!
//! Every fallible operation in the crate returns [`ReactiveError`]. Converter
//! and pointer failures surface at the read or write that caused them; the
//! only error that aborts a running commit is [`ReactiveError::DependencyCycle`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors raised by cells, rules, pointers and collections.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A cell's previous value was read outside the wave that may observe it.
    #[error("previous value of `{cell}` is not available outside its commit window")]
    StaleHistoryAccess { cell: String },

    /// The scheduler did not reach a fixed point within the configured wave limit.
    #[error("rules did not settle after {waves} waves; still dirty: {rules:?}")]
    DependencyCycle { waves: u32, rules: Vec<String> },

    /// A typed cell's converter rejected an incoming value.
    #[error("`{cell}` rejected value: {reason}")]
    Conversion { cell: String, reason: String },

    /// A pointer's attribute path cannot be followed on its current target.
    #[error("cannot resolve `{pointer}`: {reason}")]
    UnresolvedPointer { pointer: String, reason: String },

    #[error("`{object}` has no field `{field}`")]
    UnknownField { object: String, field: String },

    /// The handle refers to an arena slot that has already been freed.
    #[error("{0} has been released")]
    Released(&'static str),

    #[error("unsupported operation `{op}` between {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("key {0} not found")]
    KeyNotFound(String),

    #[error("invalid schema `{schema}`: {reason}")]
    Schema { schema: String, reason: String },

    #[error("invalid runtime configuration: {0}")]
    Config(String),

    /// Failure raised by a user rule body.
    #[error("{0}")]
    Custom(String),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Custom`] from anything printable.
    pub fn custom(message: impl std::fmt::Display) -> Self {
        Self::Custom(message.to_string())
    }

    /// Whether this error aborts the transaction that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DependencyCycle { .. })
    }
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
