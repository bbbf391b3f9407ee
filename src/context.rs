//! The bridge session: one engine instance plus the bookkeeping that couples
//! it to host code.
//!
//! An `EngineContext` is a cheap handle (`Arc` inside). The session core
//! (isolate plus gate registry) lives as long as anything anchors it: the
//! context handle itself or any surviving [`ForwardGate`](crate::ForwardGate).
//! Dropping the handle therefore does NOT end the session; `shutdown` does,
//! exactly once, by invalidating every registered gate and refusing further
//! entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::convert::{to_engine, to_host};
use crate::engine::{EngineError, HeapStats, Isolate, NativeFn, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::host::HostValue;
use crate::registry::ResourceRegistry;
use crate::scope::ScopeGuard;

/// Tunables for a bridge session.
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    /// Allocation count after which the engine runs an automatic
    /// collection. Tests pin this high and collect by hand.
    pub gc_allocation_threshold: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            gc_allocation_threshold: 4096,
        }
    }
}

/// Shared core of a session: the host-side session anchor. Gates hold it
/// directly: strongly from the host side (a forward gate must keep the
/// session reachable), weakly from the engine side (the engine must not be
/// able to pin a session into an uncollectable loop).
pub(crate) struct ContextCore {
    pub(crate) isolate: Arc<Isolate>,
    pub(crate) registry: ResourceRegistry,
    invalidated: AtomicBool,
}

impl ContextCore {
    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

/// Handle to one bridge session. Clones share the session.
#[derive(Clone)]
pub struct EngineContext {
    core: Arc<ContextCore>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    pub fn with_options(options: ContextOptions) -> Self {
        let isolate = Isolate::new(options.gc_allocation_threshold);
        log::debug!("engine context created");
        EngineContext {
            core: Arc::new(ContextCore {
                isolate,
                registry: ResourceRegistry::new(),
                invalidated: AtomicBool::new(false),
            }),
        }
    }

    /// Direct core access for in-crate tests.
    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<ContextCore> {
        &self.core
    }

    // ---- variables ------------------------------------------------------

    /// Bind `value` to `name` on the engine's global object, converting it
    /// through the gateway.
    pub fn set_var(&self, name: &str, value: &HostValue) -> BridgeResult<()> {
        let scope = ScopeGuard::enter(&self.core)?;
        let engine_value = to_engine(&scope, value)?;
        let global = scope.isolate().global_object();
        scope
            .isolate()
            .set_prop(global, name, engine_value)
            .map_err(engine_to_bridge)
    }

    /// Read `name` from the engine's global object, converting the result
    /// back to a host value. Unbound names read as the undefined sentinel.
    pub fn var(&self, name: &str) -> BridgeResult<HostValue> {
        let scope = ScopeGuard::enter(&self.core)?;
        let global = scope.isolate().global_object();
        let value = scope
            .isolate()
            .get_prop(global, name)
            .map_err(engine_to_bridge)?;
        to_host(&scope, value)
    }

    // ---- engine value builders ------------------------------------------

    /// Create an engine object with the given properties and hand it back
    /// gated.
    pub fn new_object(&self, props: &[(&str, HostValue)]) -> BridgeResult<HostValue> {
        let scope = ScopeGuard::enter(&self.core)?;
        let obj = scope.isolate().new_object();
        for (name, value) in props {
            let engine_value = to_engine(&scope, value)?;
            scope
                .isolate()
                .set_prop(obj, name, engine_value)
                .map_err(engine_to_bridge)?;
        }
        to_host(&scope, obj)
    }

    /// Create an engine array from host items, gated.
    pub fn new_array(&self, items: &[HostValue]) -> BridgeResult<HostValue> {
        let scope = ScopeGuard::enter(&self.core)?;
        let engine_items: Vec<Value> = items
            .iter()
            .map(|i| to_engine(&scope, i))
            .collect::<BridgeResult<_>>()?;
        let arr = scope.isolate().new_array(&engine_items);
        to_host(&scope, arr)
    }

    /// Create an engine function from a native closure, gated. The closure
    /// runs with the execution lock held and may re-enter the engine.
    pub fn new_function<F>(&self, f: F) -> BridgeResult<HostValue>
    where
        F: Fn(&Arc<Isolate>, Value, &[Value]) -> Result<Value, EngineError>
            + Send
            + Sync
            + 'static,
    {
        let scope = ScopeGuard::enter(&self.core)?;
        let body: NativeFn = Arc::new(f);
        let func = scope.isolate().new_function(body);
        to_host(&scope, func)
    }

    // ---- maintenance ----------------------------------------------------

    /// Run an engine collection now.
    pub fn collect_garbage(&self) -> BridgeResult<()> {
        let scope = ScopeGuard::enter(&self.core)?;
        scope.isolate().collect();
        Ok(())
    }

    /// Number of gates currently registered to this session.
    pub fn live_gates(&self) -> usize {
        self.core.registry.len()
    }

    /// Engine heap counters.
    pub fn heap_stats(&self) -> HeapStats {
        self.core.isolate.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.is_invalidated()
    }

    /// End the session: invalidate every registered gate (forward gates drop
    /// their engine roots, reverse gates drop their host references) and
    /// refuse further entry. Idempotent. Gate memory is untouched; each
    /// wrapper stays with its owner until that owner lets go.
    pub fn shutdown(&self) {
        if self.core.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("engine context shutting down");
        self.core.registry.invalidate_all();
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

fn engine_to_bridge(e: EngineError) -> BridgeError {
    BridgeError::foreign(e.message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_round_trip_through_the_global_object() {
        let ctx = EngineContext::new();
        ctx.set_var("greeting", &HostValue::from("hello")).unwrap();
        assert_eq!(ctx.var("greeting").unwrap(), HostValue::from("hello"));
        assert_eq!(ctx.var("missing").unwrap(), HostValue::Undefined);
    }

    #[test]
    fn shutdown_is_idempotent_and_blocks_entry() {
        let ctx = EngineContext::new();
        ctx.shutdown();
        ctx.shutdown();
        assert!(ctx.is_shut_down());
        assert_eq!(
            ctx.set_var("x", &HostValue::Int(1)).unwrap_err(),
            BridgeError::ContextGone
        );
        assert_eq!(ctx.var("x").unwrap_err(), BridgeError::ContextGone);
    }

    #[test]
    fn the_global_object_survives_collection() {
        let ctx = EngineContext::new();
        ctx.collect_garbage().unwrap();
        assert!(ctx.heap_stats().live_objects >= 1);
    }
}
