//! Bidirectional value conversion between the two runtimes.
//!
//! Stateless: every call inspects the value it is given and nothing else.
//! Primitives map to primitives; objects cross the boundary through gates,
//! with one identity rule in each direction: a value that is already a
//! wrapper for the other side unwraps to the original instead of being
//! wrapped again.

use crate::engine::Value;
use crate::error::{BridgeError, BridgeResult};
use crate::gate::{ForwardGate, ReverseGate};
use crate::host::HostValue;
use crate::scope::ScopeGuard;

/// Convert an engine value to a host value.
///
/// Precedence, first match wins: string, 32-bit integer, other numeric,
/// undefined (the distinguished host sentinel, never `Nil`), booleans, null,
/// an object tagged as a reverse gate (identity short-circuit to the
/// original host object), and finally a fresh [`ForwardGate`]. Gate
/// construction is uncached: converting the same engine value twice yields
/// two independent wrappers.
pub(crate) fn to_host(scope: &ScopeGuard<'_>, value: Value) -> BridgeResult<HostValue> {
    match value {
        Value::Str(_) => {
            let text = scope
                .isolate()
                .str_value(value)
                .ok_or_else(|| BridgeError::Conversion("string storage vacated".into()))?;
            Ok(HostValue::Str(text))
        }
        Value::Int(i) => Ok(HostValue::Int(i64::from(i))),
        Value::Float(x) => Ok(HostValue::Float(x)),
        Value::Undefined => Ok(HostValue::Undefined),
        Value::Bool(b) => Ok(HostValue::Bool(b)),
        Value::Null => Ok(HostValue::Nil),
        Value::Object(_) => {
            if let Some(gate) = ReverseGate::unwrap(scope, value) {
                return Ok(HostValue::Object(gate.host_object()?));
            }
            let gate = ForwardGate::bind(scope, value)?;
            Ok(HostValue::Object(gate))
        }
    }
}

/// Convert a host value to an engine value.
///
/// The dual of [`to_host`]: primitives map straight across (64-bit host
/// integers that overflow the engine's 32-bit integers degrade to doubles);
/// a host object that is a [`ForwardGate`] unwraps to its original engine
/// value after a same-context check; any other host object is wrapped in a
/// fresh [`ReverseGate`].
pub(crate) fn to_engine(scope: &ScopeGuard<'_>, value: &HostValue) -> BridgeResult<Value> {
    match value {
        HostValue::Nil => Ok(Value::Null),
        HostValue::Undefined => Ok(Value::Undefined),
        HostValue::Bool(b) => Ok(Value::Bool(*b)),
        HostValue::Int(i) => Ok(match i32::try_from(*i) {
            Ok(small) => Value::Int(small),
            Err(_) => Value::Float(*i as f64),
        }),
        HostValue::Float(x) => Ok(Value::Float(*x)),
        HostValue::Str(s) => Ok(scope.isolate().new_string(s)),
        HostValue::Object(obj) => {
            if let Some(gate) = obj.as_any().downcast_ref::<ForwardGate>() {
                return gate.engine_value(scope);
            }
            ReverseGate::wrap(scope, obj.clone())
        }
    }
}
