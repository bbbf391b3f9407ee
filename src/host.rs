//! The host side of the gateway.
//!
//! The host is the embedding Rust program; its "collector" is reference
//! counting. Host objects are `Arc` trait objects, so a gate that must keep
//! one reachable simply holds the `Arc`; the counted edge is this crate's
//! rendition of a GC mark callback.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A shared host object reference.
pub type HostRef = Arc<dyn HostObject>;

/// An error raised by host code during a bridged call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HostError {}

impl From<&str> for HostError {
    fn from(s: &str) -> Self {
        HostError::new(s)
    }
}

impl From<String> for HostError {
    fn from(s: String) -> Self {
        HostError::new(s)
    }
}

/// A host object that can be handed to the engine.
///
/// Implementors decide what invocation means; the default refuses. The
/// `as_any` hook lets the converter recognize gateway-owned wrappers without
/// a global table.
pub trait HostObject: Send + Sync {
    /// Downcasting support for identity recovery.
    fn as_any(&self) -> &dyn Any;

    /// Invoke this object as a function.
    fn invoke(&self, args: &[HostValue]) -> Result<HostValue, HostError> {
        let _ = args;
        Err(HostError::new(format!(
            "{} is not callable",
            self.type_name()
        )))
    }

    /// Short name used in diagnostics.
    fn type_name(&self) -> &'static str {
        "object"
    }
}

/// A host value: the primitive set the converter maps, plus object
/// references. `Undefined` is a distinct sentinel, never folded into `Nil`.
#[derive(Clone)]
pub enum HostValue {
    Nil,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(HostRef),
}

impl HostValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    /// Truthiness: `Nil`, `Undefined` and `false` are falsy, everything else
    /// is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(
            self,
            HostValue::Nil | HostValue::Undefined | HostValue::Bool(false)
        )
    }

    /// The object reference, if this value is one.
    pub fn as_object(&self) -> Option<&HostRef> {
        match self {
            HostValue::Object(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => write!(f, "Nil"),
            HostValue::Undefined => write!(f, "Undefined"),
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Int(i) => write!(f, "Int({i})"),
            HostValue::Float(x) => write!(f, "Float({x})"),
            HostValue::Str(s) => write!(f, "Str({s:?})"),
            HostValue::Object(r) => write!(f, "Object({})", r.type_name()),
        }
    }
}

/// Equality: primitives by value (strict on variant), objects by identity.
impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        HostValue::Int(i64::from(i))
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        HostValue::Int(i)
    }
}

impl From<f64> for HostValue {
    fn from(x: f64) -> Self {
        HostValue::Float(x)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<HostRef> for HostValue {
    fn from(r: HostRef) -> Self {
        HostValue::Object(r)
    }
}

/// Run a host callable under the protected-call discipline: `Err` returns
/// are passed through, and a panic is confined and demoted to a [`HostError`]
/// so no host unwind ever crosses the runtime boundary.
pub fn protected_call<F>(f: F) -> Result<HostValue, HostError>
where
    F: FnOnce() -> Result<HostValue, HostError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
                (*s).to_owned()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "host callable panicked".to_owned()
            };
            log::debug!("confined host panic: {message}");
            Err(HostError::new(message))
        }
    }
}

/// A host function built from a closure, the convenient way to expose a
/// callable to the engine.
pub struct HostFn {
    body: Box<dyn Fn(&[HostValue]) -> Result<HostValue, HostError> + Send + Sync>,
}

impl HostFn {
    pub fn new<F>(f: F) -> HostRef
    where
        F: Fn(&[HostValue]) -> Result<HostValue, HostError> + Send + Sync + 'static,
    {
        Arc::new(HostFn { body: Box::new(f) })
    }
}

impl HostObject for HostFn {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn invoke(&self, args: &[HostValue]) -> Result<HostValue, HostError> {
        (self.body)(args)
    }

    fn type_name(&self) -> &'static str {
        "function"
    }
}
