//! Cross-runtime object gateway.
//!
//! This crate couples two independently collected heaps: the **host** (the
//! embedding Rust program, whose collector is reference counting) and the
//! **engine** (an embedded, garbage-collected script-value heap). Host code
//! can hold and manipulate engine values; engine code can hold and invoke
//! host objects; neither collector may reclaim an object the other side
//! still needs, and neither may be pinned alive forever by a cycle through
//! the other.
//!
//! ## Architecture
//!
//! ```text
//! host code ──► HostValue ──┐                ┌── Value ◄── engine heap
//!                           │ ValueConverter │
//!                           └───────┬────────┘
//!                ┌──────────────────┼──────────────────┐
//!                ▼                  ▼                  ▼
//!          ForwardGate         ReverseGate         CallBridge
//!       (host-owned proxy    (engine-owned       (invocation +
//!        of an engine value)  proxy of a host     error translation,
//!                             object)             both directions)
//!                │                  │
//!                └──► ResourceRegistry ◄──┘   one per EngineContext
//! ```
//!
//! Every engine-touching operation runs inside a scope guard that holds the
//! engine's re-entrant execution lock and a handle-scope frame, so nested
//! host→engine→host call chains are legal and raw handles are never used
//! outside a scope.
//!
//! ## Lifetime coupling
//!
//! A [`ForwardGate`] owns a durable engine root and a strong reference to
//! the session core: while host code keeps the gate, the engine value and
//! the session stay alive. A [`ReverseGate`] is owned by the engine heap
//! (planted in its wrapper object) and owns a strong host reference: while
//! the wrapper is reachable in the engine, the host object stays alive. The
//! reverse direction's context link is weak, which is what breaks the
//! would-be cycle between the two heaps.
//!
//! Gates release in two phases: *soft-free* (foreign reference dropped,
//! bookkeeping severed) when the owning side reclaims or the context shuts
//! down, and actual destruction whenever the owner's memory management gets
//! around to it. Operations on a released gate fail with
//! [`BridgeError::StaleGate`] or [`BridgeError::ContextGone`], never a
//! stale dereference.
//!
//! ## Example
//!
//! ```
//! use crossgate::{EngineContext, HostValue, ForwardGate};
//!
//! let ctx = EngineContext::new();
//! ctx.set_var("answer", &HostValue::Int(42)).unwrap();
//! assert_eq!(ctx.var("answer").unwrap(), HostValue::Int(42));
//!
//! let obj = ctx.new_object(&[("x", HostValue::Int(10))]).unwrap();
//! let gate = ForwardGate::from_host(&obj).unwrap();
//! assert_eq!(gate.get_attribute("x").unwrap(), HostValue::Int(10));
//! ```

pub mod engine;

mod call;
mod context;
mod convert;
mod error;
mod gate;
mod host;
mod registry;
mod scope;

pub use context::{ContextOptions, EngineContext};
pub use error::{BridgeError, BridgeResult};
pub use gate::{ForwardGate, ReverseGate};
pub use host::{protected_call, HostError, HostFn, HostObject, HostRef, HostValue};
