//! Bounded pool of hardware audio sources (C5), multiplexed across an
//! unbounded set of emitters by `(owner, importance)`. Every emitter holds a
//! `SourceHandle` and must check [`SourcePool::is_still_owner`] before use:
//! eviction clears the slot's owner without notifying the previous holder,
//! matching the "check owner before use" idiom of §3/§9.

use crate::backend::{AudioBackend, SourceId};
use crate::log::Log;

/// Caller-supplied identity tagging a bind; typically an emitter's
/// [`crate::pool::Handle`] index, carried opaquely here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u32);

struct SourceSlot {
    backend_id: SourceId,
    owner: Option<OwnerId>,
    importance: i32,
}

pub struct SourcePool {
    slots: Vec<SourceSlot>,
    estimated_cap: Option<usize>,
}

impl SourcePool {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            estimated_cap: None,
        }
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.owner.is_some()).count()
    }

    pub fn unbound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.owner.is_none()).count()
    }

    pub fn total_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_still_owner(&self, handle: SourceHandle, owner: OwnerId) -> bool {
        self.slots
            .get(handle.0 as usize)
            .map(|s| s.owner == Some(owner))
            .unwrap_or(false)
    }

    pub fn backend_id(&self, handle: SourceHandle) -> Option<SourceId> {
        self.slots.get(handle.0 as usize).map(|s| s.backend_id)
    }

    /// §4.5's three-step assignment: reuse an unbound source, else create
    /// one, else evict the lowest-importance bound source if the caller
    /// outranks it.
    pub fn bind(&mut self, backend: &mut dyn AudioBackend, owner: OwnerId, importance: i32) -> Option<SourceHandle> {
        if let Some(index) = self.slots.iter().position(|s| s.owner.is_none()) {
            self.slots[index].owner = Some(owner);
            self.slots[index].importance = importance;
            return Some(SourceHandle(index as u32));
        }

        let under_cap = self.estimated_cap.map(|cap| self.slots.len() < cap).unwrap_or(true);
        if under_cap {
            match backend.create_source() {
                Ok(backend_id) => {
                    let index = self.slots.len();
                    self.slots.push(SourceSlot {
                        backend_id,
                        owner: Some(owner),
                        importance,
                    });
                    return Some(SourceHandle(index as u32));
                }
                Err(e) => {
                    Log::warn(format!("source pool at estimated capacity: {e}"));
                    self.estimated_cap = Some(self.slots.len());
                }
            }
        }

        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.owner.is_some())
            .min_by_key(|(_, s)| s.importance)
            .map(|(index, s)| (index, s.importance, s.backend_id));

        match victim {
            Some((index, victim_importance, backend_id)) if importance <= victim_importance => {
                Log::verify(backend.stop(backend_id));
                Log::verify(backend.set_source_direct_filter(backend_id, None));
                Log::verify(backend.set_source_aux_send(backend_id, None));
                self.slots[index].owner = Some(owner);
                self.slots[index].importance = importance;
                Some(SourceHandle(index as u32))
            }
            _ => None,
        }
    }

    /// Stops playback, clears the filter/send assignment, and marks the
    /// slot unbound.
    pub fn unbind(&mut self, backend: &mut dyn AudioBackend, handle: SourceHandle) {
        if let Some(slot) = self.slots.get_mut(handle.0 as usize) {
            Log::verify(backend.stop(slot.backend_id));
            Log::verify(backend.set_source_direct_filter(slot.backend_id, None));
            Log::verify(backend.set_source_aux_send(slot.backend_id, None));
            slot.owner = None;
        }
    }
}

impl Default for SourcePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn bind_reuses_unbound_before_creating() {
        let mut backend = NullBackend::default();
        let mut pool = SourcePool::new();
        let h1 = pool.bind(&mut backend, OwnerId(1), 0).unwrap();
        pool.unbind(&mut backend, h1);
        let h2 = pool.bind(&mut backend, OwnerId(2), 0).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn unbind_clears_owner_and_counts_balance() {
        let mut backend = NullBackend::default();
        let mut pool = SourcePool::new();
        let h = pool.bind(&mut backend, OwnerId(1), 5).unwrap();
        assert_eq!(pool.bound_count(), 1);
        pool.unbind(&mut backend, h);
        assert_eq!(pool.bound_count(), 0);
        assert_eq!(pool.unbound_count(), 1);
        assert!(!pool.is_still_owner(h, OwnerId(1)));
    }

    #[test]
    fn eviction_only_succeeds_against_lower_or_equal_importance() {
        let mut backend = NullBackend::default();
        let mut pool = SourcePool::new();
        pool.estimated_cap = Some(1);
        let h1 = pool.bind(&mut backend, OwnerId(1), 10).unwrap();

        // A higher-importance newcomer must not be able to evict a more
        // important holder.
        assert!(pool.bind(&mut backend, OwnerId(2), 5).is_none());
        assert!(pool.is_still_owner(h1, OwnerId(1)));

        // Equal-or-higher importance can evict.
        let h2 = pool.bind(&mut backend, OwnerId(3), 10).unwrap();
        assert_eq!(h2, h1);
        assert!(pool.is_still_owner(h2, OwnerId(3)));
        assert!(!pool.is_still_owner(h1, OwnerId(1)));
    }
}
