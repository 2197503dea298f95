//! Generation-checked handles and the slot arena behind them.
//!
//! Every broadphase stores its proxies in an [`Arena`]. Destroying a proxy
//! bumps its slot's generation, so a handle kept past `destroy_proxy` is
//! rejected with [`CollisionError::StaleHandle`] instead of silently
//! addressing whatever reuses the slot.

use crate::error::{CollisionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keys that can address an [`Arena`] slot.
pub trait ArenaKey: Copy {
    /// Build a key from a slot index and generation.
    fn from_parts(index: u32, generation: u32) -> Self;
    /// Slot index.
    fn index(self) -> u32;
    /// Slot generation at the time the key was issued.
    fn generation(self) -> u32;
}

/// Opaque handle to a broadphase proxy.
///
/// Handles are ordered by `(index, generation)`; pair caches use this order
/// to canonicalize the two proxies of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProxyHandle {
    index: u32,
    generation: u32,
}

impl ProxyHandle {
    /// Slot index of this handle.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of this handle.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl ArenaKey for ProxyHandle {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    fn index(self) -> u32 {
        self.index
    }

    fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proxy#{}v{}", self.index, self.generation)
    }
}

/// Identifier of the narrow-phase state attached to an overlapping pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlgorithmId {
    index: u32,
    generation: u32,
}

impl ArenaKey for AlgorithmId {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    fn index(self) -> u32 {
        self.index
    }

    fn generation(self) -> u32 {
        self.generation
    }
}

/// Opaque identifier of the object that owns a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create a new object id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({})", self.0)
    }
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slot arena with a LIFO free list and an optional capacity limit.
#[derive(Debug, Clone)]
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    limit: Option<usize>,
    _key: std::marker::PhantomData<K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    /// Create an unbounded arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            limit: None,
            _key: std::marker::PhantomData,
        }
    }

    /// Create an arena that refuses inserts beyond `limit` live values.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            slots: Vec::with_capacity(limit),
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Maximum number of live values, if bounded.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live or vacant).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Insert a value, reusing the most recently freed slot.
    pub fn insert(&mut self, value: T) -> Result<K> {
        if let Some(limit) = self.limit {
            if self.len >= limit {
                return Err(CollisionError::capacity_exceeded(limit));
            }
        }

        let key = if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let Slot::Vacant {
                generation,
                next_free,
            } = *slot
            else {
                debug_assert!(false, "free list points at an occupied slot");
                return Err(CollisionError::capacity_exceeded(self.len));
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { generation, value };
            K::from_parts(index, generation)
        } else {
            let index = u32::try_from(self.slots.len())
                .map_err(|_| CollisionError::capacity_exceeded(self.slots.len()))?;
            self.slots.push(Slot::Occupied {
                generation: 0,
                value,
            });
            K::from_parts(index, 0)
        };

        self.len += 1;
        Ok(key)
    }

    /// Remove a value, invalidating every outstanding copy of its key.
    pub fn remove(&mut self, key: K) -> Result<T> {
        self.check(key)?;
        let index = key.index();
        let next_generation = key.generation().wrapping_add(1);
        let old = std::mem::replace(
            &mut self.slots[index as usize],
            Slot::Vacant {
                generation: next_generation,
                next_free: self.free_head,
            },
        );
        self.free_head = Some(index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Ok(value),
            Slot::Vacant { .. } => Err(stale(key)),
        }
    }

    /// Whether `key` addresses a live value.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.check(key).is_ok()
    }

    /// Borrow the value behind `key`.
    pub fn get(&self, key: K) -> Result<&T> {
        match self.slots.get(key.index() as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == key.generation() => {
                Ok(value)
            }
            _ => Err(stale(key)),
        }
    }

    /// Mutably borrow the value behind `key`.
    pub fn get_mut(&mut self, key: K) -> Result<&mut T> {
        match self.slots.get_mut(key.index() as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == key.generation() => {
                Ok(value)
            }
            _ => Err(stale(key)),
        }
    }

    /// Borrow the live value in slot `index`, whatever its generation.
    #[must_use]
    pub fn get_by_index(&self, index: u32) -> Option<&T> {
        match self.slots.get(index as usize) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow the live value in slot `index`.
    pub fn get_by_index_mut(&mut self, index: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Current key of the live value in slot `index`.
    #[must_use]
    pub fn key_at(&self, index: u32) -> Option<K> {
        match self.slots.get(index as usize) {
            Some(Slot::Occupied { generation, .. }) => Some(K::from_parts(index, *generation)),
            _ => None,
        }
    }

    /// Iterate over live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                #[allow(clippy::cast_possible_truncation)]
                Slot::Occupied { generation, value } => {
                    Some((K::from_parts(index as u32, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    /// Remove every value. Keys issued before the call stay invalid.
    pub fn clear(&mut self) {
        self.free_head = None;
        for index in (0..self.slots.len()).rev() {
            let generation = match &self.slots[index] {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => *generation,
            };
            self.slots[index] = Slot::Vacant {
                generation,
                next_free: self.free_head,
            };
            #[allow(clippy::cast_possible_truncation)]
            {
                self.free_head = Some(index as u32);
            }
        }
        self.len = 0;
    }

    fn check(&self, key: K) -> Result<()> {
        self.get(key).map(|_| ())
    }
}

fn stale<K: ArenaKey>(key: K) -> CollisionError {
    CollisionError::StaleHandle {
        index: key.index(),
        generation: key.generation(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena: Arena<ProxyHandle, &str> = Arena::new();
        let a = arena.insert("a").unwrap();
        let b = arena.insert("b").unwrap();

        assert_eq!(arena.len(), 2);
        assert_eq!(*arena.get(a).unwrap(), "a");
        assert_eq!(*arena.get(b).unwrap(), "b");

        assert_eq!(arena.remove(a).unwrap(), "a");
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).unwrap_err().is_stale_handle());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena: Arena<ProxyHandle, u32> = Arena::new();
        let first = arena.insert(1).unwrap();
        arena.remove(first).unwrap();
        let second = arena.insert(2).unwrap();

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(!arena.contains(first));
        assert_eq!(*arena.get(second).unwrap(), 2);
    }

    #[test]
    fn test_limit() {
        let mut arena: Arena<ProxyHandle, u32> = Arena::with_limit(2);
        arena.insert(1).unwrap();
        let k = arena.insert(2).unwrap();
        let err = arena.insert(3).unwrap_err();
        assert!(err.is_capacity_exceeded());

        arena.remove(k).unwrap();
        assert!(arena.insert(4).is_ok());
    }

    #[test]
    fn test_double_remove_is_stale() {
        let mut arena: Arena<ProxyHandle, u32> = Arena::new();
        let k = arena.insert(1).unwrap();
        arena.remove(k).unwrap();
        assert!(arena.remove(k).unwrap_err().is_stale_handle());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn test_iter_and_clear() {
        let mut arena: Arena<ProxyHandle, u32> = Arena::new();
        let keys: Vec<_> = (0..4).map(|i| arena.insert(i).unwrap()).collect();
        arena.remove(keys[1]).unwrap();

        let values: Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 3]);

        arena.clear();
        assert!(arena.is_empty());
        assert!(!arena.contains(keys[0]));
        let reused = arena.insert(9).unwrap();
        assert_eq!(reused.index(), 0);
        assert_ne!(reused, keys[0]);
    }
}
