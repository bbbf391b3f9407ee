//! The call bridge: synchronous invocation across the runtime boundary.
//!
//! Both directions funnel through here so the error discipline lives in one
//! place: arguments convert before the call, results convert after, and a
//! failure on the far side is captured and re-raised in the caller's native
//! error shape with the original message intact. No unwind from one
//! runtime's error model ever passes through the other's stack.

use crate::convert::{to_engine, to_host};
use crate::engine::{EngineError, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{self, HostRef, HostValue};
use crate::scope::ScopeGuard;

/// Invoke an engine callable on behalf of host code.
pub(crate) fn call_into_engine(
    scope: &ScopeGuard<'_>,
    callee: Value,
    recv: Value,
    args: &[HostValue],
) -> BridgeResult<HostValue> {
    if !scope.isolate().is_callable(callee) {
        return Err(BridgeError::NotAFunction);
    }
    let engine_args: Vec<Value> = args
        .iter()
        .map(|a| to_engine(scope, a))
        .collect::<BridgeResult<_>>()?;
    match scope.isolate().call(callee, recv, &engine_args) {
        Ok(result) => to_host(scope, result),
        Err(err) => {
            log::trace!("engine callable raised: {err}");
            Err(BridgeError::foreign(err.message()))
        }
    }
}

/// Invoke a host object on behalf of engine code.
///
/// Error capture is per call frame: each invocation owns its own `Result`,
/// so re-entrant calls through the same host object cannot clobber one
/// another's pending error.
pub(crate) fn call_into_host(
    scope: &ScopeGuard<'_>,
    target: &HostRef,
    args: &[Value],
) -> Result<Value, EngineError> {
    let host_args: Vec<HostValue> = args
        .iter()
        .map(|&a| to_host(scope, a))
        .collect::<BridgeResult<_>>()
        .map_err(|e| EngineError::foreign(e.to_string()))?;

    match host::protected_call(|| target.invoke(&host_args)) {
        Ok(result) => to_engine(scope, &result).map_err(|e| EngineError::foreign(e.to_string())),
        Err(err) => {
            log::trace!("host callable raised: {err}");
            Err(EngineError::foreign(err.message()))
        }
    }
}
