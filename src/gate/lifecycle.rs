//! Gate lifecycle state machine.
//!
//! A gate is `Live` from binding until its foreign reference is released,
//! `SoftFreed` from then until its owning collector reclaims the wrapper,
//! and `Destroyed` only transiently while drop glue runs. Transitions are
//! one-way; the release path records why it ran so later operations can
//! report the right error.

use crate::error::{BridgeError, BridgeResult};

/// Why a gate released its foreign reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseCause {
    /// The gate's owner reclaimed it (host drop for forward gates, engine
    /// sweep for reverse gates).
    Reclaimed,
    /// The owning context was shut down underneath the gate.
    ContextShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateState {
    Live,
    SoftFreed(ReleaseCause),
    Destroyed,
}

impl GateState {
    /// Guard check at every public operation boundary.
    pub fn ensure_live(&self) -> BridgeResult<()> {
        match self {
            GateState::Live => Ok(()),
            GateState::SoftFreed(ReleaseCause::ContextShutdown) => Err(BridgeError::ContextGone),
            GateState::SoftFreed(ReleaseCause::Reclaimed) | GateState::Destroyed => {
                Err(BridgeError::StaleGate)
            }
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, GateState::Live)
    }

    /// Apply a one-way transition. Returns false (leaving the state alone)
    /// when the transition is not a forward edge, which makes soft-free
    /// idempotent and keeps the first release cause.
    pub fn advance(&mut self, next: GateState) -> bool {
        let forward = matches!(
            (*self, next),
            (GateState::Live, GateState::SoftFreed(_))
                | (GateState::Live, GateState::Destroyed)
                | (GateState::SoftFreed(_), GateState::Destroyed)
        );
        if forward {
            *self = next;
        }
        forward
    }
}
