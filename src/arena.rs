//! A typed slot arena, used to own graph nodes.
//!
//! Slots never move.  Removing a value leaves a tombstone that a later insert
//! recycles with a bumped generation, so a handle kept across a removal is
//! detected as stale rather than silently referring to the new occupant.

use std::marker::PhantomData;

/// A typed handle into an `Arena`.
pub trait Handle: Copy + std::fmt::Debug {
    fn from_parts(index: usize, generation: u32) -> Self;
    fn index(&self) -> usize;
    fn generation(&self) -> u32;
}

#[derive(Debug)]
struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

/// Vector-backed storage addressed by generation-checked handles.
#[derive(Debug)]
pub struct Arena<K, V> {
    slots: Vec<Slot<V>>,
    /// Indices of tombstoned slots, reused last-in first-out.
    free: Vec<usize>,
    len: usize,
    key_type: PhantomData<K>,
}

impl<K, V> Default for Arena<K, V> {
    fn default() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            key_type: PhantomData,
        }
    }
}

impl<K: Handle, V> std::ops::Index<K> for Arena<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &Self::Output {
        match self.get(k) {
            Some(v) => v,
            None => panic!("stale node id {:?}", k),
        }
    }
}

impl<K: Handle, V> std::ops::IndexMut<K> for Arena<K, V> {
    fn index_mut(&mut self, k: K) -> &mut Self::Output {
        match self.get_mut(k) {
            Some(v) => v,
            None => panic!("stale node id {:?}", k),
        }
    }
}

impl<K: Handle, V> Arena<K, V> {
    pub fn insert(&mut self, val: V) -> K {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.value = Some(val);
                K::from_parts(index, slot.generation)
            }
            None => {
                let index = self.slots.len();
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(val),
                });
                K::from_parts(index, 0)
            }
        }
    }

    /// Tombstone the slot for k, returning its value if k was live.
    pub fn remove(&mut self, k: K) -> Option<V> {
        let slot = self.slots.get_mut(k.index())?;
        if slot.generation != k.generation() {
            return None;
        }
        let val = slot.value.take()?;
        self.free.push(k.index());
        self.len -= 1;
        Some(val)
    }

    pub fn get(&self, k: K) -> Option<&V> {
        let slot = self.slots.get(k.index())?;
        if slot.generation != k.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, k: K) -> Option<&mut V> {
        let slot = self.slots.get_mut(k.index())?;
        if slot.generation != k.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, k: K) -> bool {
        self.get(k).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots, live or not.  Side tables indexed by
    /// `Handle::index()` must be at least this long.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Live handles in ascending slot order.
    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|v| (K::from_parts(index, slot.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|v| (K::from_parts(index, generation), v))
        })
    }
}
