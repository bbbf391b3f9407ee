//! Gateway error types.

use thiserror::Error;

/// Errors surfaced to host callers by gateway operations.
///
/// Foreign errors never cross the boundary as native unwinds: an engine
/// error reaching host code is always re-shaped into [`BridgeError::ForeignCall`]
/// with the original message preserved, and a host error reaching engine code
/// takes the mirrored path through the call bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The gate released its foreign reference (host-side reclamation) and
    /// can no longer be queried.
    #[error("gate is no longer bound to a value")]
    StaleGate,

    /// The owning engine context has been shut down.
    #[error("engine context has been shut down")]
    ContextGone,

    /// A gated value was presented to a context other than the one that
    /// produced it.
    #[error("value belongs to a different engine context")]
    ContextMismatch,

    /// A value has no representation on the other side.
    #[error("cannot convert value: {0}")]
    Conversion(String),

    /// The invoked foreign callable raised; the original message is carried
    /// verbatim.
    #[error("{message}")]
    ForeignCall {
        /// Message of the error as raised on the foreign side.
        message: String,
    },

    /// Property or index access on a non-object value.
    #[error("engine value is not an object")]
    NotAnObject,

    /// Call attempted on a non-callable value.
    #[error("engine value is not a function")]
    NotAFunction,
}

impl BridgeError {
    pub(crate) fn foreign(message: impl Into<String>) -> Self {
        BridgeError::ForeignCall {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the gateway.
pub type BridgeResult<T> = Result<T, BridgeError>;
