//! Engine-side proxy for a host object.
//!
//! A `ReverseGate` plants a host object inside the engine heap: the wrapper
//! object carries the gate in its internal tag slot (the O(1) identity mark
//! the converter checks before ever wrapping a host object twice) and a
//! native call target that routes invocation back to the host through the
//! call bridge.
//!
//! Ownership is the mirror image of the forward direction: the engine heap
//! owns the wrapper, the wrapper owns the gate, and the gate owns a strong
//! host reference, the counted edge that keeps the host object alive for
//! exactly as long as the wrapper is reachable in the engine. When the
//! engine collector sweeps the wrapper, the gate drops and the host
//! reference goes with it. The context back-reference is weak: the engine
//! side must not be able to pin a session whose host anchors are gone, or
//! the two heaps would hold each other in an uncollectable loop.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::call;
use crate::context::ContextCore;
use crate::engine::{EngineError, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::gate::lifecycle::{GateState, ReleaseCause};
use crate::host::HostRef;
use crate::registry::{BridgeResource, RegistryKey};
use crate::scope::ScopeGuard;

/// Marker planted in the wrapper's internal tag slot. Fixed for the life of
/// the process so identity recovery is a single compare.
const REVERSE_GATE_TAG: usize = 0x00B1_D6E5;

struct GateCore {
    state: GateState,
    ctx: Option<Weak<ContextCore>>,
    host: Option<HostRef>,
    key: Option<RegistryKey>,
}

/// Engine-side wrapper around one host object.
pub struct ReverseGate {
    core: Mutex<GateCore>,
}

impl ReverseGate {
    /// Wrap `host` in a fresh engine object: tag it, make it callable, and
    /// register the gate with the context. Returns the wrapper value.
    pub(crate) fn wrap(scope: &ScopeGuard<'_>, host: HostRef) -> BridgeResult<Value> {
        let ctx = scope.context();
        let isolate = scope.isolate();

        let wrapper = isolate.new_object();
        let gate = Arc::new(ReverseGate {
            core: Mutex::new(GateCore {
                state: GateState::Live,
                ctx: Some(Arc::downgrade(ctx)),
                host: Some(host),
                key: None,
            }),
        });

        let gate_dyn: Arc<dyn BridgeResource> = gate.clone();
        let weak: Weak<dyn BridgeResource> = Arc::downgrade(&gate_dyn);
        let key = ctx.registry.add(weak).ok_or(BridgeError::ContextGone)?;
        gate.core.lock().key = Some(key);

        let call_target = Arc::downgrade(&gate);
        isolate
            .set_native_call(
                wrapper,
                Arc::new(move |_iso, _recv, args: &[Value]| match call_target.upgrade() {
                    Some(gate) => gate.invoke_from_engine(args),
                    None => Err(EngineError::internal("host gate already finalized")),
                }),
            )
            .map_err(|e| BridgeError::foreign(e.message()))?;
        isolate
            .set_internal(wrapper, REVERSE_GATE_TAG, gate)
            .map_err(|e| BridgeError::foreign(e.message()))?;

        log::trace!("reverse gate bound ({} live)", ctx.registry.len());
        Ok(wrapper)
    }

    /// Identity recovery: return the gate carried by `value`, if `value` is
    /// a wrapper this bridge planted. Anything else (including objects with
    /// foreign internal data) reads as `None`.
    pub(crate) fn unwrap(scope: &ScopeGuard<'_>, value: Value) -> Option<Arc<ReverseGate>> {
        let data = scope.isolate().internal_data(value, REVERSE_GATE_TAG)?;
        data.downcast::<ReverseGate>().ok()
    }

    /// The wrapped host object.
    pub fn host_object(&self) -> BridgeResult<HostRef> {
        let core = self.core.lock();
        core.state.ensure_live()?;
        core.host.clone().ok_or(BridgeError::StaleGate)
    }

    /// Whether the gate still holds its host reference.
    pub fn is_live(&self) -> bool {
        self.core.lock().state.is_live()
    }

    /// Entry point for the engine calling the wrapper as a function.
    ///
    /// Re-enters the context (guards nest), converts arguments, and runs the
    /// host object under the protected-call discipline. Error capture is per
    /// call frame; a failure surfaces as an engine error carrying the host
    /// message verbatim.
    fn invoke_from_engine(&self, args: &[Value]) -> Result<Value, EngineError> {
        let (ctx, host) = {
            let core = self.core.lock();
            core.state
                .ensure_live()
                .map_err(|e| EngineError::foreign(e.to_string()))?;
            let ctx = core
                .ctx
                .as_ref()
                .and_then(Weak::upgrade)
                .ok_or_else(|| EngineError::foreign(BridgeError::ContextGone.to_string()))?;
            let host = core
                .host
                .clone()
                .ok_or_else(|| EngineError::foreign(BridgeError::StaleGate.to_string()))?;
            (ctx, host)
        };
        let scope =
            ScopeGuard::enter(&ctx).map_err(|e| EngineError::foreign(e.to_string()))?;
        call::call_into_host(&scope, &host, args)
    }

    /// Release the host reference and deregister. Idempotent. Runs when the
    /// engine collector finalizes the wrapper, or at context shutdown; may
    /// also be called early to sever the host edge by hand.
    pub fn soft_free(&self) {
        self.release(ReleaseCause::Reclaimed);
    }

    fn release(&self, cause: ReleaseCause) {
        let (ctx, host, key) = {
            let mut core = self.core.lock();
            if !core.state.advance(GateState::SoftFreed(cause)) {
                return;
            }
            (core.ctx.take(), core.host.take(), core.key.take())
        };
        if let (Some(ctx), Some(key)) = (ctx.as_ref().and_then(Weak::upgrade), key) {
            ctx.registry.remove(key);
        }
        // The host reference drops here: host-side reclamation may follow
        // whenever the host's own counting decides.
        drop(host);
        log::trace!("reverse gate soft-freed ({cause:?})");
    }
}

impl BridgeResource for ReverseGate {
    fn invalidate(&self) {
        self.release(ReleaseCause::ContextShutdown);
    }

    fn kind(&self) -> &'static str {
        "reverse"
    }
}

impl Drop for ReverseGate {
    fn drop(&mut self) {
        // Engine sweep dropped the wrapper (or shutdown already ran).
        self.release(ReleaseCause::Reclaimed);
        self.core.get_mut().state.advance(GateState::Destroyed);
    }
}
