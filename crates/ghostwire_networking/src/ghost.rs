//! # Ghost Table
//!
//! Per-connection mapping between world objects and ghost indices.
//!
//! ```text
//! SERVER (per client)                     CLIENT
//!   ObjectId ──► index ──► GhostSlot        index ──► ObjectId
//!                            mask             (bound on the
//!                            ghosted          first "new" record)
//!                            in-flight flags
//! ```
//!
//! Indices are only meaningful on the connection that issued them. The
//! server reports an index as resolvable (`ghost_index`) only once the
//! client has acknowledged the ghost's initial update, so a reference
//! written against it is always resolvable on arrival.

use std::collections::BTreeMap;

use ghostwire_core::{ObjectId, UpdateMask};
use tracing::{trace, warn};

/// Bits used for a ghost index on the wire.
pub const GHOST_INDEX_BITS: u32 = 10;

/// Number of ghost indices per connection.
pub const MAX_GHOSTS: usize = 1 << GHOST_INDEX_BITS;

/// Server-side bookkeeping for one ghost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GhostSlot {
    /// Object this ghost mirrors.
    pub object: ObjectId,
    /// Aspects still to be sent.
    pub mask: UpdateMask,
    /// Client has acknowledged the initial update.
    pub ghosted: bool,
    /// A packet carrying the initial update is unacknowledged.
    pub initial_in_flight: bool,
    /// Ghost left scope or its object was removed.
    pub deleting: bool,
    /// A packet carrying the delete is unacknowledged.
    pub delete_in_flight: bool,
    /// Packets this ghost was dirty but did not fit.
    pub update_skips: u32,
}

impl GhostSlot {
    /// True when the ghost has something to send and nothing blocking it.
    #[must_use]
    pub const fn wants_update(&self) -> bool {
        if self.deleting {
            return !self.delete_in_flight;
        }
        !self.initial_in_flight && !self.mask.is_empty()
    }
}

/// What one packet carried for one ghost, kept for its notify.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GhostSend {
    /// Ghost index.
    pub index: u32,
    /// Aspects actually written.
    pub mask: UpdateMask,
    /// Record was the ghost's initial update.
    pub initial: bool,
    /// Record was the ghost's delete.
    pub delete: bool,
}

/// Ghost indices of one connection, usable from either end.
#[derive(Clone, Debug)]
pub struct GhostTable {
    slots: Vec<Option<GhostSlot>>,
    by_object: BTreeMap<ObjectId, u32>,
    free: Vec<u32>,
}

impl GhostTable {
    /// Creates an empty table. Indices are handed out lowest first.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_GHOSTS],
            by_object: BTreeMap::new(),
            free: (0..MAX_GHOSTS as u32).rev().collect(),
        }
    }

    /// Number of live ghosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_object.len()
    }

    /// True when no ghost is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_object.is_empty()
    }

    /// Slot at `index`.
    #[must_use]
    pub fn slot(&self, index: u32) -> Option<&GhostSlot> {
        self.slots.get(index as usize)?.as_ref()
    }

    /// Mutable slot at `index`.
    pub fn slot_mut(&mut self, index: u32) -> Option<&mut GhostSlot> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    /// Index assigned to `object`, acknowledged or not.
    #[must_use]
    pub fn index_of(&self, object: ObjectId) -> Option<u32> {
        self.by_object.get(&object).copied()
    }

    /// Index of `object` if the remote end is known to have it.
    #[must_use]
    pub fn ghost_index(&self, object: ObjectId) -> Option<u32> {
        let index = self.index_of(object)?;
        self.slot(index).filter(|s| s.ghosted && !s.deleting).map(|_| index)
    }

    /// Object bound to `index`.
    #[must_use]
    pub fn resolve(&self, index: u32) -> Option<ObjectId> {
        self.slot(index).map(|s| s.object)
    }

    /// Live `(index, slot)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &GhostSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i as u32, s)))
    }

    // =========================================================================
    // Server side
    // =========================================================================

    /// Starts ghosting `object` with every aspect dirty.
    ///
    /// Returns `None` when the object already has a ghost or the table is full.
    pub fn allocate(&mut self, object: ObjectId) -> Option<u32> {
        if self.by_object.contains_key(&object) {
            return None;
        }
        let Some(index) = self.free.pop() else {
            warn!(?object, "ghost table full");
            return None;
        };
        self.slots[index as usize] = Some(GhostSlot {
            object,
            mask: UpdateMask::ALL,
            ghosted: false,
            initial_in_flight: false,
            deleting: false,
            delete_in_flight: false,
            update_skips: 0,
        });
        self.by_object.insert(object, index);
        trace!(?object, index, "ghost allocated");
        Some(index)
    }

    /// ORs `mask` into the ghost of `object`, if it has one.
    pub fn mark_dirty(&mut self, object: ObjectId, mask: UpdateMask) {
        if let Some(index) = self.index_of(object) {
            if let Some(slot) = self.slot_mut(index) {
                slot.mask |= mask;
            }
        }
    }

    /// Schedules the ghost of `object` for deletion on the remote end.
    pub fn mark_for_delete(&mut self, object: ObjectId) {
        if let Some(index) = self.index_of(object) {
            if let Some(slot) = self.slot_mut(index) {
                slot.deleting = true;
            }
        }
    }

    /// Records that a packet carried `send`.
    pub fn on_sent(&mut self, send: &GhostSend) {
        if let Some(slot) = self.slot_mut(send.index) {
            slot.update_skips = 0;
            if send.delete {
                slot.delete_in_flight = true;
            } else if send.initial {
                slot.initial_in_flight = true;
            }
        }
    }

    /// The packet carrying `send` arrived.
    pub fn on_delivered(&mut self, send: &GhostSend) {
        if send.delete {
            self.release(send.index);
            return;
        }
        if let Some(slot) = self.slot_mut(send.index) {
            if send.initial {
                slot.ghosted = true;
                slot.initial_in_flight = false;
            }
        }
    }

    /// The packet carrying `send` was lost: its aspects become dirty again.
    pub fn on_lost(&mut self, send: &GhostSend) {
        if let Some(slot) = self.slot_mut(send.index) {
            if send.delete {
                slot.delete_in_flight = false;
            } else {
                slot.mask |= send.mask;
                if send.initial {
                    slot.initial_in_flight = false;
                }
            }
        }
    }

    fn release(&mut self, index: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize).and_then(Option::take) {
            self.by_object.remove(&slot.object);
            self.free.push(index);
            trace!(object = ?slot.object, index, "ghost released");
        }
    }

    // =========================================================================
    // Client side
    // =========================================================================

    /// Binds `index` to a freshly created local object, returning whatever
    /// object the index was bound to before.
    pub fn bind(&mut self, index: u32, object: ObjectId) -> Option<ObjectId> {
        let previous = self.unbind(index);
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = Some(GhostSlot {
                object,
                mask: UpdateMask::NONE,
                ghosted: true,
                initial_in_flight: false,
                deleting: false,
                delete_in_flight: false,
                update_skips: 0,
            });
            self.by_object.insert(object, index);
        }
        previous
    }

    /// Removes the binding of `index`, returning the local object.
    pub fn unbind(&mut self, index: u32) -> Option<ObjectId> {
        let slot = self.slots.get_mut(index as usize).and_then(Option::take)?;
        self.by_object.remove(&slot.object);
        Some(slot.object)
    }
}

impl Default for GhostTable {
    fn default() -> Self {
        Self::new()
    }
}
