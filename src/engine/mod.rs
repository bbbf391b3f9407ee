//! The embedded engine kernel.
//!
//! This module is the engine side of the gateway: a garbage-collected value
//! heap behind a re-entrant execution lock, with the narrow operation set the
//! bridge consumes: handle scopes, durable roots, object internal tag slots,
//! native-function invocation, and engine-level errors. Execution semantics
//! (parsing, bytecode, built-ins) live outside this crate; engine functions
//! are native closures supplied by the embedder.
//!
//! ## Locking model
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Isolate                                                  │
//! │  ├── ReentrantMutex<RefCell<Heap>>  (execution lock)      │
//! │  │     one thread at a time, recursive on that thread     │
//! │  └── pending root releases  (drained on next lock)        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Heap borrows are short-scoped and never held across a native callback, so
//! re-entrant engine operations from inside a callback are always legal.
//! Dropping a [`Global`] needs the lock to vacate its root slot; when the
//! lock is unavailable the release is queued and drained on the next
//! acquisition, so handle owners may drop from any thread without blocking.

mod heap;
mod value;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

pub use heap::HeapStats;
pub use value::{ObjId, StrId, Value};

pub(crate) use heap::InternalSlot;

use heap::Heap;

/// A native function body. Receives the isolate, the receiver value and the
/// argument slice; runs with the execution lock held.
pub type NativeFn =
    Arc<dyn Fn(&Arc<Isolate>, Value, &[Value]) -> Result<Value, EngineError> + Send + Sync>;

/// Classification of an engine-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong value shape for an operation.
    Type,
    /// An error imported from the other side of the gateway; the message is
    /// carried verbatim.
    Foreign,
    /// Engine bookkeeping failure.
    Internal,
}

/// An error raised inside the engine.
///
/// Errors propagate as `Result` through every engine operation; nothing in
/// this module unwinds across a caller.
#[derive(Debug, Clone)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
}

impl EngineError {
    pub fn type_error(message: impl Into<String>) -> Self {
        EngineError {
            kind: ErrorKind::Type,
            message: message.into(),
        }
    }

    /// An error carried across the gateway. The message is preserved exactly
    /// so the far side can reconstruct it without loss.
    pub fn foreign(message: impl Into<String>) -> Self {
        EngineError {
            kind: ErrorKind::Foreign,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Type => write!(f, "TypeError: {}", self.message),
            ErrorKind::Foreign => write!(f, "{}", self.message),
            ErrorKind::Internal => write!(f, "InternalError: {}", self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// A durable root handle: keeps its referent alive until dropped.
///
/// Dropping releases the root slot, immediately when the execution lock can
/// be taken, otherwise deferred to the next lock acquisition.
pub struct Global {
    slot: u32,
    isolate: Weak<Isolate>,
}

impl Drop for Global {
    fn drop(&mut self) {
        if let Some(isolate) = self.isolate.upgrade() {
            isolate.release_root_deferred(self.slot);
        }
    }
}

/// Witness that the execution lock is held. Created by [`Isolate::lock`];
/// heap access goes through short-scoped interior borrows.
pub(crate) struct IsolateGuard<'a> {
    _inner: ReentrantMutexGuard<'a, RefCell<Heap>>,
}

/// The engine instance: one heap, one execution lock.
pub struct Isolate {
    state: ReentrantMutex<RefCell<Heap>>,
    pending_root_releases: Mutex<Vec<u32>>,
}

impl Isolate {
    /// Create an isolate. `gc_threshold` is the allocation count that
    /// triggers an automatic collection.
    pub fn new(gc_threshold: usize) -> Arc<Self> {
        Arc::new(Isolate {
            state: ReentrantMutex::new(RefCell::new(Heap::new(gc_threshold))),
            pending_root_releases: Mutex::new(Vec::new()),
        })
    }

    /// Acquire the execution lock, draining any deferred root releases.
    /// Blocks if another thread holds the lock; recursive on this thread.
    pub(crate) fn lock(&self) -> IsolateGuard<'_> {
        let guard = self.state.lock();
        let pending: Vec<u32> = std::mem::take(&mut *self.pending_root_releases.lock());
        if !pending.is_empty() {
            let mut heap = guard.borrow_mut();
            for slot in &pending {
                heap.remove_root(*slot);
            }
            log::trace!("drained {} deferred root releases", pending.len());
        }
        IsolateGuard { _inner: guard }
    }

    pub(crate) fn push_scope_frame(&self) {
        self.state.lock().borrow_mut().push_frame();
    }

    pub(crate) fn pop_scope_frame(&self) {
        self.state.lock().borrow_mut().pop_frame();
    }

    // ---- values ---------------------------------------------------------

    /// The global object of this isolate.
    pub fn global_object(&self) -> Value {
        self.state.lock().borrow().global_object()
    }

    /// Allocate a fresh plain object.
    pub fn new_object(&self) -> Value {
        let guard = self.state.lock();
        let v = { guard.borrow_mut().alloc_object() };
        self.maybe_collect(&guard);
        v
    }

    /// Allocate an array holding `items`.
    pub fn new_array(&self, items: &[Value]) -> Value {
        let guard = self.state.lock();
        let v = { guard.borrow_mut().alloc_array(items) };
        self.maybe_collect(&guard);
        v
    }

    /// Allocate a function object backed by `f`.
    pub fn new_function(&self, f: NativeFn) -> Value {
        let guard = self.state.lock();
        let v = { guard.borrow_mut().alloc_function(f) };
        self.maybe_collect(&guard);
        v
    }

    /// Allocate a string.
    pub fn new_string(&self, s: &str) -> Value {
        let guard = self.state.lock();
        let v = { guard.borrow_mut().alloc_string(s) };
        self.maybe_collect(&guard);
        v
    }

    /// The text of a string value, if it is one.
    pub fn str_value(&self, v: Value) -> Option<String> {
        match v {
            Value::Str(id) => self.state.lock().borrow().string(id).map(str::to_owned),
            _ => None,
        }
    }

    /// Display rendering of any value.
    pub fn display_string(&self, v: Value) -> String {
        self.state.lock().borrow().display(v)
    }

    pub fn is_array(&self, v: Value) -> bool {
        match v {
            Value::Object(id) => self
                .state
                .lock()
                .borrow()
                .object(id)
                .is_some_and(|d| d.elements.is_some()),
            _ => false,
        }
    }

    pub fn is_callable(&self, v: Value) -> bool {
        match v {
            Value::Object(id) => self
                .state
                .lock()
                .borrow()
                .object(id)
                .is_some_and(|d| d.call.is_some()),
            _ => false,
        }
    }

    // ---- properties -----------------------------------------------------

    /// Read a named property. Missing properties read as `undefined`.
    pub fn get_prop(&self, obj: Value, name: &str) -> Result<Value, EngineError> {
        let id = self.expect_object(obj)?;
        let guard = self.state.lock();
        let heap = guard.borrow();
        let data = heap
            .object(id)
            .ok_or_else(|| EngineError::internal("object slot vacated"))?;
        Ok(data.props.get(name).copied().unwrap_or(Value::Undefined))
    }

    /// Write a named property.
    pub fn set_prop(&self, obj: Value, name: &str, value: Value) -> Result<(), EngineError> {
        let id = self.expect_object(obj)?;
        let guard = self.state.lock();
        let mut heap = guard.borrow_mut();
        let data = heap
            .object_mut(id)
            .ok_or_else(|| EngineError::internal("object slot vacated"))?;
        data.props.insert(name.to_owned(), value);
        Ok(())
    }

    /// Read an indexed element. Arrays index their element store; other
    /// objects fall back to the stringified index as a property name.
    /// Out-of-range reads yield `undefined`.
    pub fn get_index(&self, obj: Value, index: u32) -> Result<Value, EngineError> {
        let id = self.expect_object(obj)?;
        let guard = self.state.lock();
        let heap = guard.borrow();
        let data = heap
            .object(id)
            .ok_or_else(|| EngineError::internal("object slot vacated"))?;
        match &data.elements {
            Some(items) => Ok(items.get(index as usize).copied().unwrap_or(Value::Undefined)),
            None => Ok(data
                .props
                .get(&index.to_string())
                .copied()
                .unwrap_or(Value::Undefined)),
        }
    }

    // ---- internal tag slots ---------------------------------------------

    /// Plant tagged data in an object's internal slot.
    pub fn set_internal(
        &self,
        obj: Value,
        tag: usize,
        data: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), EngineError> {
        let id = self.expect_object(obj)?;
        let guard = self.state.lock();
        let mut heap = guard.borrow_mut();
        let obj_data = heap
            .object_mut(id)
            .ok_or_else(|| EngineError::internal("object slot vacated"))?;
        obj_data.internal = Some(InternalSlot { tag, data });
        Ok(())
    }

    /// Read an object's internal slot, only if the tag matches.
    pub fn internal_data(&self, obj: Value, tag: usize) -> Option<Arc<dyn Any + Send + Sync>> {
        let id = match obj {
            Value::Object(id) => id,
            _ => return None,
        };
        let guard = self.state.lock();
        let heap = guard.borrow();
        let slot = heap.object(id)?.internal.as_ref()?;
        if slot.tag == tag {
            Some(slot.data.clone())
        } else {
            None
        }
    }

    /// Attach a native call target to an existing object.
    pub fn set_native_call(&self, obj: Value, f: NativeFn) -> Result<(), EngineError> {
        let id = self.expect_object(obj)?;
        let guard = self.state.lock();
        let mut heap = guard.borrow_mut();
        let data = heap
            .object_mut(id)
            .ok_or_else(|| EngineError::internal("object slot vacated"))?;
        data.call = Some(f);
        Ok(())
    }

    // ---- invocation -----------------------------------------------------

    /// Invoke `callee` as a function. A scope frame is opened around the
    /// call so callee allocations are reclaimable; the result is re-rooted
    /// in the caller's frame before the callee frame pops away.
    pub fn call(
        self: &Arc<Self>,
        callee: Value,
        recv: Value,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let guard = self.state.lock();
        let func = {
            let heap = guard.borrow();
            match callee {
                Value::Object(id) => heap.object(id).and_then(|d| d.call.clone()),
                _ => None,
            }
        };
        let func = func.ok_or_else(|| {
            EngineError::type_error(format!("{} is not callable", callee.type_name()))
        })?;
        {
            let mut heap = guard.borrow_mut();
            heap.push_frame();
            heap.root_in_frame(callee);
            heap.root_in_frame(recv);
            for &a in args {
                heap.root_in_frame(a);
            }
        }
        let result = func(self, recv, args);
        {
            let mut heap = guard.borrow_mut();
            heap.pop_frame();
            if let Ok(v) = &result {
                heap.root_in_frame(*v);
            }
        }
        result
    }

    // ---- durable roots --------------------------------------------------

    /// Promote a value to a durable root. The returned handle keeps the
    /// referent alive until dropped.
    pub fn make_global(self: &Arc<Self>, v: Value) -> Global {
        let slot = self.state.lock().borrow_mut().add_root(v);
        Global {
            slot,
            isolate: Arc::downgrade(self),
        }
    }

    /// Re-materialize the value behind a durable root, rooting it in the
    /// current scope frame so it outlives a concurrent release of the root.
    pub fn resolve_global(&self, g: &Global) -> Value {
        let guard = self.state.lock();
        let mut heap = guard.borrow_mut();
        let v = heap.root_value(g.slot).unwrap_or(Value::Undefined);
        heap.root_in_frame(v);
        v
    }

    fn release_root_deferred(&self, slot: u32) {
        match self.state.try_lock() {
            Some(guard) => guard.borrow_mut().remove_root(slot),
            None => {
                self.pending_root_releases.lock().push(slot);
                log::trace!("deferred release of engine root {slot}");
            }
        }
    }

    // ---- collection -----------------------------------------------------

    /// Run a full collection. Finalizers of swept objects (internal-slot
    /// drop glue) run with the lock held but no heap borrow active, so they
    /// may re-enter the engine.
    pub fn collect(&self) {
        let guard = self.state.lock();
        let swept = { guard.borrow_mut().collect() };
        if !swept.is_empty() {
            log::debug!("engine gc: swept {} objects", swept.len());
        }
        drop(swept);
        drop(guard);
    }

    pub fn stats(&self) -> HeapStats {
        self.state.lock().borrow().stats()
    }

    // ---- helpers --------------------------------------------------------

    fn expect_object(&self, v: Value) -> Result<ObjId, EngineError> {
        match v {
            Value::Object(id) => Ok(id),
            other => Err(EngineError::type_error(format!(
                "expected an object, got {}",
                other.type_name()
            ))),
        }
    }

    fn maybe_collect(&self, guard: &ReentrantMutexGuard<'_, RefCell<Heap>>) {
        let due = guard.borrow().gc_due();
        if due {
            let swept = { guard.borrow_mut().collect() };
            log::debug!("engine gc (threshold): swept {} objects", swept.len());
            drop(swept);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolate() -> Arc<Isolate> {
        Isolate::new(usize::MAX)
    }

    #[test]
    fn properties_round_trip() {
        let iso = isolate();
        iso.push_scope_frame();
        let obj = iso.new_object();
        iso.set_prop(obj, "x", Value::Int(10)).unwrap();
        assert_eq!(iso.get_prop(obj, "x").unwrap(), Value::Int(10));
        assert_eq!(iso.get_prop(obj, "missing").unwrap(), Value::Undefined);
        iso.pop_scope_frame();
    }

    #[test]
    fn property_access_on_primitive_is_a_type_error() {
        let iso = isolate();
        let err = iso.get_prop(Value::Int(1), "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn native_function_invocation() {
        let iso = isolate();
        iso.push_scope_frame();
        let add = iso.new_function(Arc::new(|_iso, _recv, args: &[Value]| {
            match (args.first(), args.get(1)) {
                (Some(Value::Int(a)), Some(Value::Int(b))) => Ok(Value::Int(a + b)),
                _ => Err(EngineError::type_error("expected two integers")),
            }
        }));
        let result = iso.call(add, Value::Undefined, &[Value::Int(2), Value::Int(3)]);
        assert_eq!(result.unwrap(), Value::Int(5));
        iso.pop_scope_frame();
    }

    #[test]
    fn calling_a_non_function_fails() {
        let iso = isolate();
        let err = iso.call(Value::Int(3), Value::Undefined, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn globals_survive_collection_and_release_on_drop() {
        let iso = isolate();
        iso.push_scope_frame();
        let obj = iso.new_object();
        let g = iso.make_global(obj);
        iso.pop_scope_frame();

        iso.collect();
        assert_eq!(iso.stats().live_objects, 2); // global object + obj

        assert_eq!(iso.resolve_global(&g), obj);
        drop(g);
        iso.collect();
        assert_eq!(iso.stats().live_objects, 1);
    }

    #[test]
    fn internal_slot_tag_mismatch_reads_nothing() {
        let iso = isolate();
        iso.push_scope_frame();
        let obj = iso.new_object();
        iso.set_internal(obj, 7, Arc::new(42_u32)).unwrap();
        assert!(iso.internal_data(obj, 7).is_some());
        assert!(iso.internal_data(obj, 8).is_none());
        assert!(iso.internal_data(Value::Int(1), 7).is_none());
        iso.pop_scope_frame();
    }

    #[test]
    fn internal_slot_finalizer_runs_on_sweep() {
        struct Probe(Arc<std::sync::atomic::AtomicBool>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let iso = isolate();
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        iso.push_scope_frame();
        let obj = iso.new_object();
        iso.set_internal(obj, 1, Arc::new(Probe(dropped.clone())))
            .unwrap();
        iso.pop_scope_frame();

        iso.collect();
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn array_indexing() {
        let iso = isolate();
        iso.push_scope_frame();
        let arr = iso.new_array(&[Value::Int(1), Value::Int(2)]);
        assert!(iso.is_array(arr));
        assert_eq!(iso.get_index(arr, 1).unwrap(), Value::Int(2));
        assert_eq!(iso.get_index(arr, 9).unwrap(), Value::Undefined);
        iso.pop_scope_frame();
    }
}
