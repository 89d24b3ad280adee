//! A generational arena — a contiguous growable array that allows removal
//! from the middle without shifting and without invalidating other handles.
//!
//! Every world-owned entity kind (components, emitters, listeners, meters)
//! and every backend resource (sources, effect slots) lives in a `Pool` and
//! is referenced by a `Handle<T>` rather than a raw pointer or `Rc`. A
//! handle stores a generation alongside its index, so a stale handle into a
//! freed-and-reused slot is detected instead of silently aliasing.

use std::{
    fmt::{self, Debug, Display, Formatter},
    marker::PhantomData,
    ops::{Index, IndexMut},
};

const INVALID_GENERATION: u32 = 0;

/// Non-owning, generation-checked reference to an entry in a [`Pool`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    type_marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const NONE: Handle<T> = Handle {
        index: 0,
        generation: INVALID_GENERATION,
        type_marker: PhantomData,
    };

    #[inline(always)]
    pub fn new(index: u32, generation: u32) -> Self {
        Handle {
            index,
            generation,
            type_marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn is_none(self) -> bool {
        self.generation == INVALID_GENERATION
    }

    #[inline(always)]
    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    #[inline(always)]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline(always)]
    pub fn generation(self) -> u32 {
        self.generation
    }

    #[inline(always)]
    pub fn transmute<U>(self) -> Handle<U> {
        Handle {
            index: self.index,
            generation: self.generation,
            type_marker: PhantomData,
        }
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[Idx: {}; Gen: {}]", self.index, self.generation)
    }
}

impl<T> Display for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

unsafe impl<T> Send for Handle<T> {}
unsafe impl<T> Sync for Handle<T> {}

struct PoolRecord<T> {
    generation: u32,
    payload: Option<T>,
}

impl<T> Default for PoolRecord<T> {
    fn default() -> Self {
        Self {
            generation: INVALID_GENERATION,
            payload: None,
        }
    }
}

/// Contiguous block of fixed-size entries, each either vacant or occupied.
pub struct Pool<T> {
    records: Vec<PoolRecord<T>>,
    free_stack: Vec<u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug> Debug for Pool<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.alive_count())
            .field("capacity", &self.records.len())
            .finish()
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            free_stack: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            records: Vec::with_capacity(capacity as usize),
            free_stack: Vec::new(),
        }
    }

    /// Places `payload` into the first free slot (or a freshly-grown one) and
    /// returns a handle to it.
    pub fn spawn(&mut self, payload: T) -> Handle<T> {
        if let Some(index) = self.free_stack.pop() {
            let record = &mut self.records[index as usize];
            debug_assert!(record.payload.is_none());
            record.payload = Some(payload);
            Handle::new(index, record.generation)
        } else {
            let index = self.records.len() as u32;
            self.records.push(PoolRecord {
                generation: 1,
                payload: Some(payload),
            });
            Handle::new(index, 1)
        }
    }

    fn record_is_valid(&self, handle: Handle<T>) -> bool {
        self.records
            .get(handle.index as usize)
            .map(|r| r.generation == handle.generation && r.payload.is_some())
            .unwrap_or(false)
    }

    pub fn is_valid_handle(&self, handle: Handle<T>) -> bool {
        self.record_is_valid(handle)
    }

    /// Removes the entry `handle` points to, bumping the slot's generation so
    /// any other handle into this slot is observably stale.
    pub fn free(&mut self, handle: Handle<T>) -> Option<T> {
        let record = self.records.get_mut(handle.index as usize)?;
        if record.generation != handle.generation {
            return None;
        }
        let payload = record.payload.take()?;
        record.generation = record.generation.wrapping_add(1).max(1);
        self.free_stack.push(handle.index);
        Some(payload)
    }

    pub fn try_borrow(&self, handle: Handle<T>) -> Option<&T> {
        self.records
            .get(handle.index as usize)
            .filter(|r| r.generation == handle.generation)
            .and_then(|r| r.payload.as_ref())
    }

    pub fn try_borrow_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.records
            .get_mut(handle.index as usize)
            .filter(|r| r.generation == handle.generation)
            .and_then(|r| r.payload.as_mut())
    }

    pub fn borrow(&self, handle: Handle<T>) -> &T {
        self.try_borrow(handle)
            .expect("handle does not refer to a live pool entry")
    }

    pub fn borrow_mut(&mut self, handle: Handle<T>) -> &mut T {
        self.try_borrow_mut(handle)
            .expect("handle does not refer to a live pool entry")
    }

    pub fn at(&self, index: u32) -> Option<&T> {
        self.records.get(index as usize).and_then(|r| r.payload.as_ref())
    }

    pub fn at_mut(&mut self, index: u32) -> Option<&mut T> {
        self.records.get_mut(index as usize).and_then(|r| r.payload.as_mut())
    }

    pub fn handle_from_index(&self, index: u32) -> Handle<T> {
        match self.records.get(index as usize) {
            Some(r) if r.payload.is_some() => Handle::new(index, r.generation),
            _ => Handle::NONE,
        }
    }

    pub fn alive_count(&self) -> u32 {
        self.records.iter().filter(|r| r.payload.is_some()).count() as u32
    }

    pub fn total_capacity(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.free_stack.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter().filter_map(|r| r.payload.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.records.iter_mut().filter_map(|r| r.payload.as_mut())
    }

    pub fn pair_iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.records.iter().enumerate().filter_map(|(i, r)| {
            r.payload
                .as_ref()
                .map(|p| (Handle::new(i as u32, r.generation), p))
        })
    }

    pub fn pair_iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.records.iter_mut().enumerate().filter_map(|(i, r)| {
            let generation = r.generation;
            r.payload
                .as_mut()
                .map(|p| (Handle::new(i as u32, generation), p))
        })
    }

    pub fn retain<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        for (index, record) in self.records.iter_mut().enumerate() {
            if let Some(payload) = record.payload.as_ref() {
                if !predicate(payload) {
                    record.payload = None;
                    record.generation = record.generation.wrapping_add(1).max(1);
                    self.free_stack.push(index as u32);
                }
            }
        }
    }
}

impl<T> Index<Handle<T>> for Pool<T> {
    type Output = T;

    fn index(&self, index: Handle<T>) -> &Self::Output {
        self.borrow(index)
    }
}

impl<T> IndexMut<Handle<T>> for Pool<T> {
    fn index_mut(&mut self, index: Handle<T>) -> &mut Self::Output {
        self.borrow_mut(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spawn_and_borrow_roundtrip() {
        let mut pool = Pool::new();
        let h = pool.spawn(42i32);
        assert_eq!(*pool.borrow(h), 42);
        assert_eq!(pool.alive_count(), 1);
    }

    #[test]
    fn free_invalidates_stale_handle() {
        let mut pool = Pool::new();
        let h1 = pool.spawn("a");
        pool.free(h1);
        let h2 = pool.spawn("b");
        // The slot was reused, but the generation changed, so h1 is stale.
        assert!(!pool.is_valid_handle(h1));
        assert!(pool.is_valid_handle(h2));
        assert_eq!(pool.try_borrow(h1), None);
    }

    #[test]
    fn handle_none_is_always_invalid() {
        let pool: Pool<i32> = Pool::new();
        assert!(Handle::<i32>::NONE.is_none());
        assert_eq!(pool.try_borrow(Handle::NONE), None);
    }

    #[test]
    fn retain_frees_entries_failing_predicate() {
        let mut pool = Pool::new();
        let keep = pool.spawn(1);
        let drop_me = pool.spawn(2);
        pool.retain(|v| *v == 1);
        assert!(pool.is_valid_handle(keep));
        assert!(!pool.is_valid_handle(drop_me));
        assert_eq!(pool.alive_count(), 1);
    }

    #[test]
    fn pair_iter_yields_live_handles_only() {
        let mut pool = Pool::new();
        let h1 = pool.spawn(10);
        let h2 = pool.spawn(20);
        pool.free(h1);
        let pairs: Vec<_> = pool.pair_iter().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, h2);
    }
}
