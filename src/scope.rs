//! Scoped acquisition of the engine execution context.
//!
//! Every operation that touches an engine handle runs inside a [`ScopeGuard`]:
//! the guard takes the isolate's re-entrant execution lock, opens a
//! handle-scope frame for transient values, and records the context as this
//! thread's active one (saving the previous entry so nested guards restore
//! correctly). Release happens in `Drop`, so no exit path (early return or
//! error unwind) can leak the lock, the frame, or the thread-local entry.
//!
//! Guards nest freely: a host→engine call that re-enters host code which
//! calls back into the engine stacks one guard per crossing, and each inner
//! release leaves the outer guard intact.

use std::cell::Cell;
use std::sync::Arc;

use crate::context::ContextCore;
use crate::engine::{Isolate, IsolateGuard};
use crate::error::{BridgeError, BridgeResult};

thread_local! {
    /// The context this thread is currently operating in, if any.
    /// Used to spot (and log) lock-order hazards when a thread nests into a
    /// different context while one is already active.
    static ACTIVE_CONTEXT: Cell<Option<*const ContextCore>> = const { Cell::new(None) };
}

/// RAII witness that the engine side of one context is entered.
pub(crate) struct ScopeGuard<'a> {
    core: &'a Arc<ContextCore>,
    prev: Option<*const ContextCore>,
    _lock: IsolateGuard<'a>,
}

impl<'a> std::fmt::Debug for ScopeGuard<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard").finish_non_exhaustive()
    }
}

impl<'a> ScopeGuard<'a> {
    /// Enter the context: fails with [`BridgeError::ContextGone`] once the
    /// context has been shut down. Blocks if another thread holds the
    /// engine's execution lock; recursive entry from this thread is cheap.
    pub fn enter(core: &'a Arc<ContextCore>) -> BridgeResult<Self> {
        if core.is_invalidated() {
            return Err(BridgeError::ContextGone);
        }

        let here = Arc::as_ptr(core);
        if let Some(active) = ACTIVE_CONTEXT.with(|c| c.get()) {
            if !std::ptr::eq(active, here) {
                // Legal, but acquiring a second context's lock while holding
                // one is where cross-context deadlocks come from.
                log::debug!("entering a foreign context while another is active");
            }
        }

        let lock = core.isolate.lock();
        // Re-check under the lock: shutdown may have won the race.
        if core.is_invalidated() {
            return Err(BridgeError::ContextGone);
        }

        core.isolate.push_scope_frame();
        let prev = ACTIVE_CONTEXT.with(|c| c.replace(Some(here)));

        Ok(ScopeGuard {
            core,
            prev,
            _lock: lock,
        })
    }

    /// The owning context core.
    pub fn context(&self) -> &Arc<ContextCore> {
        self.core
    }

    /// The engine instance behind this guard.
    pub fn isolate(&self) -> &Arc<Isolate> {
        &self.core.isolate
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.core.isolate.pop_scope_frame();
        ACTIVE_CONTEXT.with(|c| c.set(self.prev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;

    #[test]
    fn guards_nest_and_restore() {
        let ctx = EngineContext::new();
        let core = ctx.core();
        {
            let _outer = ScopeGuard::enter(core).unwrap();
            {
                let _inner = ScopeGuard::enter(core).unwrap();
                assert!(ACTIVE_CONTEXT.with(|c| c.get()).is_some());
            }
            // Inner release must leave the outer entry active.
            assert!(ACTIVE_CONTEXT.with(|c| c.get()).is_some());
        }
        assert!(ACTIVE_CONTEXT.with(|c| c.get()).is_none());
    }

    #[test]
    fn entering_a_shut_down_context_fails() {
        let ctx = EngineContext::new();
        ctx.shutdown();
        assert_eq!(
            ScopeGuard::enter(ctx.core()).unwrap_err(),
            BridgeError::ContextGone
        );
    }
}
