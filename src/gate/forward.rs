//! Host-side proxy for an engine value.
//!
//! A `ForwardGate` owns a durable engine root and hands host code a typed
//! surface over it: predicates, coercions, property and index access, and
//! invocation. Every operation opens its own [`ScopeGuard`], so callers
//! never touch raw engine state.
//!
//! Ownership: the gate is an `Arc` held by host code. While it lives it
//! keeps a strong reference to the context core, the counted-edge form of
//! a GC mark hook: the bridge session cannot be torn down from under a
//! surviving gate by mere unreachability, only by explicit shutdown.
//! Dropping the last `Arc` is host-side reclamation and soft-frees the
//! gate; the engine root release is deferred when the execution lock is
//! unavailable at that moment.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::call;
use crate::context::ContextCore;
use crate::convert::{to_engine, to_host};
use crate::engine::{Global, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::gate::lifecycle::{GateState, ReleaseCause};
use crate::host::{HostError, HostObject, HostValue};
use crate::registry::{BridgeResource, RegistryKey};
use crate::scope::ScopeGuard;

struct GateCore {
    state: GateState,
    ctx: Option<Arc<ContextCore>>,
    handle: Option<Arc<Global>>,
    key: Option<RegistryKey>,
}

/// Host-side wrapper around one engine value.
pub struct ForwardGate {
    core: Mutex<GateCore>,
}

impl ForwardGate {
    /// Bind a fresh gate to `value` and register it with the context.
    /// Called once per gate, at construction.
    pub(crate) fn bind(scope: &ScopeGuard<'_>, value: Value) -> BridgeResult<Arc<ForwardGate>> {
        let ctx = scope.context().clone();
        let handle = Arc::new(ctx.isolate.make_global(value));
        let gate = Arc::new(ForwardGate {
            core: Mutex::new(GateCore {
                state: GateState::Live,
                ctx: Some(ctx.clone()),
                handle: Some(handle),
                key: None,
            }),
        });
        let gate_dyn: Arc<dyn BridgeResource> = gate.clone();
        let weak: std::sync::Weak<dyn BridgeResource> = Arc::downgrade(&gate_dyn);
        let key = ctx.registry.add(weak).ok_or(BridgeError::ContextGone)?;
        gate.core.lock().key = Some(key);
        log::trace!("forward gate bound ({} live)", ctx.registry.len());
        Ok(gate)
    }

    /// Recover the gate from a host value, if the value wraps one.
    pub fn from_host(value: &HostValue) -> Option<&ForwardGate> {
        value.as_object()?.as_any().downcast_ref::<ForwardGate>()
    }

    fn snapshot(&self) -> BridgeResult<(Arc<ContextCore>, Arc<Global>)> {
        let core = self.core.lock();
        core.state.ensure_live()?;
        match (&core.ctx, &core.handle) {
            (Some(ctx), Some(handle)) => Ok((ctx.clone(), handle.clone())),
            _ => Err(BridgeError::StaleGate),
        }
    }

    /// Run `f` with the re-materialized engine value under a fresh scope.
    fn with_value<R>(
        &self,
        f: impl FnOnce(&ScopeGuard<'_>, Value) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let (ctx, handle) = self.snapshot()?;
        let scope = ScopeGuard::enter(&ctx)?;
        let value = ctx.isolate.resolve_global(&handle);
        f(&scope, value)
    }

    /// The wrapped value for converter use: unwraps only into the same
    /// context that produced the gate.
    pub(crate) fn engine_value(&self, scope: &ScopeGuard<'_>) -> BridgeResult<Value> {
        let (ctx, handle) = self.snapshot()?;
        if !Arc::ptr_eq(&ctx, scope.context()) {
            return Err(BridgeError::ContextMismatch);
        }
        Ok(ctx.isolate.resolve_global(&handle))
    }

    // ---- coercions ------------------------------------------------------

    /// Display rendering of the wrapped value.
    pub fn to_text(&self) -> BridgeResult<String> {
        self.with_value(|scope, v| Ok(scope.isolate().display_string(v)))
    }

    /// Integer coercion: numbers truncate, booleans count, strings and
    /// objects go through their display rendering (so a one-element array
    /// of a number coerces the way dynamic languages expect).
    pub fn to_int(&self) -> BridgeResult<i64> {
        self.with_value(|scope, v| match v {
            Value::Int(i) => Ok(i64::from(i)),
            Value::Float(x) => Ok(x as i64),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Str(_) | Value::Object(_) => {
                let s = scope.isolate().display_string(v);
                let t = s.trim();
                t.parse::<i64>()
                    .or_else(|_| t.parse::<f64>().map(|f| f as i64))
                    .map_err(|_| BridgeError::Conversion(format!("{t:?} is not a number")))
            }
            other => Err(BridgeError::Conversion(format!(
                "{} has no integer value",
                other.type_name()
            ))),
        })
    }

    /// Float coercion, mirroring [`to_int`](Self::to_int).
    pub fn to_float(&self) -> BridgeResult<f64> {
        self.with_value(|scope, v| match v {
            Value::Int(i) => Ok(f64::from(i)),
            Value::Float(x) => Ok(x),
            Value::Bool(b) => Ok(f64::from(u8::from(b))),
            Value::Str(_) | Value::Object(_) => {
                let s = scope.isolate().display_string(v);
                let t = s.trim();
                t.parse::<f64>()
                    .map_err(|_| BridgeError::Conversion(format!("{t:?} is not a number")))
            }
            other => Err(BridgeError::Conversion(format!(
                "{} has no float value",
                other.type_name()
            ))),
        })
    }

    // ---- predicates -----------------------------------------------------

    pub fn is_int(&self) -> BridgeResult<bool> {
        self.with_value(|_, v| Ok(v.is_int()))
    }

    /// True for any numeric value (the loose float check of dynamic
    /// languages, not an exact-representation test).
    pub fn is_float(&self) -> BridgeResult<bool> {
        self.with_value(|_, v| Ok(v.is_number()))
    }

    pub fn is_string(&self) -> BridgeResult<bool> {
        self.with_value(|_, v| Ok(v.is_string()))
    }

    pub fn is_object(&self) -> BridgeResult<bool> {
        self.with_value(|_, v| Ok(v.is_object()))
    }

    pub fn is_array(&self) -> BridgeResult<bool> {
        self.with_value(|scope, v| Ok(scope.isolate().is_array(v)))
    }

    pub fn is_function(&self) -> BridgeResult<bool> {
        self.with_value(|scope, v| Ok(scope.isolate().is_callable(v)))
    }

    pub fn is_undefined(&self) -> BridgeResult<bool> {
        self.with_value(|_, v| Ok(v.is_undefined()))
    }

    // ---- properties -----------------------------------------------------

    /// Read a named property of the wrapped object.
    pub fn get_attribute(&self, name: &str) -> BridgeResult<HostValue> {
        self.with_value(|scope, v| {
            if !v.is_object() {
                return Err(BridgeError::NotAnObject);
            }
            let prop = scope
                .isolate()
                .get_prop(v, name)
                .map_err(|e| BridgeError::foreign(e.message()))?;
            to_host(scope, prop)
        })
    }

    /// Write a named property of the wrapped object.
    pub fn set_attribute(&self, name: &str, value: &HostValue) -> BridgeResult<()> {
        self.with_value(|scope, v| {
            if !v.is_object() {
                return Err(BridgeError::NotAnObject);
            }
            let engine_value = to_engine(scope, value)?;
            scope
                .isolate()
                .set_prop(v, name, engine_value)
                .map_err(|e| BridgeError::foreign(e.message()))
        })
    }

    /// Read an indexed element of the wrapped object.
    pub fn get_index(&self, index: u32) -> BridgeResult<HostValue> {
        self.with_value(|scope, v| {
            if !v.is_object() {
                return Err(BridgeError::NotAnObject);
            }
            let item = scope
                .isolate()
                .get_index(v, index)
                .map_err(|e| BridgeError::foreign(e.message()))?;
            to_host(scope, item)
        })
    }

    // ---- invocation -----------------------------------------------------

    /// Call the wrapped value as a function with the context's global
    /// object as receiver.
    pub fn call(&self, args: &[HostValue]) -> BridgeResult<HostValue> {
        self.with_value(|scope, v| {
            let recv = scope.isolate().global_object();
            call::call_into_engine(scope, v, recv, args)
        })
    }

    /// Call the wrapped value as a function with an explicit receiver; a
    /// gated receiver unwraps through the converter first.
    pub fn apply_to(&self, recv: &HostValue, args: &[HostValue]) -> BridgeResult<HostValue> {
        self.with_value(|scope, v| {
            let engine_recv = to_engine(scope, recv)?;
            call::call_into_engine(scope, v, engine_recv, args)
        })
    }

    // ---- lifecycle ------------------------------------------------------

    /// Release the durable engine root and deregister. Idempotent; the
    /// gate's own memory stays with its `Arc` owner.
    pub fn soft_free(&self) {
        self.release(ReleaseCause::Reclaimed);
    }

    /// Whether the gate still holds its foreign reference.
    pub fn is_live(&self) -> bool {
        self.core.lock().state.is_live()
    }

    fn release(&self, cause: ReleaseCause) {
        let (ctx, handle, key) = {
            let mut core = self.core.lock();
            if !core.state.advance(GateState::SoftFreed(cause)) {
                return;
            }
            (core.ctx.take(), core.handle.take(), core.key.take())
        };
        if let (Some(ctx), Some(key)) = (&ctx, key) {
            ctx.registry.remove(key);
        }
        // Dropping the handle vacates the engine root, deferred if the
        // execution lock cannot be taken right now.
        drop(handle);
        drop(ctx);
        log::trace!("forward gate soft-freed ({cause:?})");
    }
}

impl HostObject for ForwardGate {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn invoke(&self, args: &[HostValue]) -> Result<HostValue, HostError> {
        self.call(args).map_err(|e| HostError::new(e.to_string()))
    }

    fn type_name(&self) -> &'static str {
        "engine-value"
    }
}

impl BridgeResource for ForwardGate {
    fn invalidate(&self) {
        self.release(ReleaseCause::ContextShutdown);
    }

    fn kind(&self) -> &'static str {
        "forward"
    }
}

impl Drop for ForwardGate {
    fn drop(&mut self) {
        self.release(ReleaseCause::Reclaimed);
        self.core.get_mut().state.advance(GateState::Destroyed);
    }
}
