//! Per-context bookkeeping of live gates.
//!
//! Every gate registers here for the lifetime of its foreign reference so
//! context shutdown can invalidate all of them in one pass. The list is a
//! slot arena threaded with an index-linked live list, the safe-Rust form
//! of an intrusive doubly-linked list: `add` and `remove` are O(1), and the
//! registry holds only `Weak` references, so it never owns gate memory.

use std::sync::Weak;

use parking_lot::Mutex;

/// A gate as seen by the registry: something that can be told its context
/// is going away.
pub(crate) trait BridgeResource: Send + Sync {
    /// Sever the gate's context back-reference and release its foreign
    /// handle. Must not free the gate itself.
    fn invalidate(&self);

    /// Label for diagnostics.
    fn kind(&self) -> &'static str;
}

/// Stable handle to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegistryKey(u32);

enum Slot {
    Live {
        resource: Weak<dyn BridgeResource>,
        prev: Option<u32>,
        next: Option<u32>,
    },
    Free {
        next_free: Option<u32>,
    },
}

struct RegistryInner {
    slots: Vec<Slot>,
    head: Option<u32>,
    first_free: Option<u32>,
    live: usize,
    closed: bool,
}

pub(crate) struct ResourceRegistry {
    inner: Mutex<RegistryInner>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        ResourceRegistry {
            inner: Mutex::new(RegistryInner {
                slots: Vec::new(),
                head: None,
                first_free: None,
                live: 0,
                closed: false,
            }),
        }
    }

    /// Register a gate. Returns `None` once the registry has been closed by
    /// [`invalidate_all`](Self::invalidate_all); late registrations belong
    /// to a dead context.
    pub fn add(&self, resource: Weak<dyn BridgeResource>) -> Option<RegistryKey> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let old_head = inner.head;
        let index = match inner.first_free {
            Some(i) => {
                let next_free = match &inner.slots[i as usize] {
                    Slot::Free { next_free } => *next_free,
                    Slot::Live { .. } => None, // free list never points at a live slot
                };
                inner.first_free = next_free;
                inner.slots[i as usize] = Slot::Live {
                    resource,
                    prev: None,
                    next: old_head,
                };
                i
            }
            None => {
                inner.slots.push(Slot::Live {
                    resource,
                    prev: None,
                    next: old_head,
                });
                (inner.slots.len() - 1) as u32
            }
        };
        if let Some(h) = old_head {
            if let Slot::Live { prev, .. } = &mut inner.slots[h as usize] {
                *prev = Some(index);
            }
        }
        inner.head = Some(index);
        inner.live += 1;
        Some(RegistryKey(index))
    }

    /// Deregister a gate. Tolerates keys already cleared by
    /// [`invalidate_all`](Self::invalidate_all): a gate racing shutdown may
    /// remove itself after the bulk teardown already emptied its slot.
    pub fn remove(&self, key: RegistryKey) {
        let mut inner = self.inner.lock();
        let i = key.0 as usize;
        let (prev, next) = match inner.slots.get(i) {
            Some(Slot::Live { prev, next, .. }) => (*prev, *next),
            _ => return,
        };
        match prev {
            Some(p) => {
                if let Slot::Live { next: n, .. } = &mut inner.slots[p as usize] {
                    *n = next;
                }
            }
            None => inner.head = next,
        }
        if let Some(nx) = next {
            if let Slot::Live { prev: p, .. } = &mut inner.slots[nx as usize] {
                *p = prev;
            }
        }
        let next_free = inner.first_free;
        inner.slots[i] = Slot::Free {
            next_free,
        };
        inner.first_free = Some(key.0);
        inner.live -= 1;
    }

    /// Walk every live gate once, invalidating it, and close the registry.
    /// Gate memory is untouched: reclamation stays with each gate's owner.
    pub fn invalidate_all(&self) {
        let resources: Vec<Weak<dyn BridgeResource>> = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            let mut out = Vec::with_capacity(inner.live);
            let mut cursor = inner.head;
            while let Some(i) = cursor {
                if let Slot::Live {
                    resource, next, ..
                } = &inner.slots[i as usize]
                {
                    out.push(resource.clone());
                    cursor = *next;
                } else {
                    break;
                }
            }
            inner.slots.clear();
            inner.head = None;
            inner.first_free = None;
            inner.live = 0;
            out
        };

        let mut invalidated = 0usize;
        for weak in resources {
            if let Some(gate) = weak.upgrade() {
                log::trace!("invalidating {} gate at context shutdown", gate.kind());
                gate.invalidate();
                invalidated += 1;
            }
        }
        log::debug!("registry invalidated {invalidated} gates");
    }

    /// Number of currently registered gates.
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }
}
