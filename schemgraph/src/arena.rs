// arena.rs — Generation-checked slot storage for graph elements
//
// Nodes, ports and edges live in three arenas addressed by typed keys. A key
// carries the slot index plus the generation it was issued for; freeing a slot
// bumps its generation, so a key kept across a deleting pass resolves to
// `None` instead of aliasing whatever reuses the slot.
//
// Preconditions: none.
// Postconditions: `get(k)` is `Some` iff `k` was returned by `insert` and not
//                 passed to `remove` since.
// Failure modes: none (stale keys are reported as `None`).
// Side effects: none.

use std::fmt;
use std::marker::PhantomData;

/// Typed key into an [`Arena`].
pub trait ArenaKey: Copy + Eq {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> u32;
    fn generation(self) -> u32;
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl ArenaKey for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn index(self) -> u32 {
                self.index
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.generation == 0 {
                    write!(f, "{}{}", $prefix, self.index)
                } else {
                    write!(f, "{}{}v{}", $prefix, self.index, self.generation)
                }
            }
        }
    };
}

arena_key!(
    /// Handle to a node of a [`crate::graph::Graph`].
    NodeId,
    "n"
);
arena_key!(
    /// Handle to a port of a [`crate::graph::Graph`].
    PortId,
    "p"
);
arena_key!(
    /// Handle to a (hyper)edge of a [`crate::graph::Graph`].
    EdgeId,
    "e"
);

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
///
/// Reuse order is LIFO, so the same sequence of inserts and removes always
/// hands out the same keys.
#[derive(Debug, Clone)]
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _key: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> K {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none(), "free slot should be empty");
            slot.value = Some(value);
            K::from_parts(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            K::from_parts(index, 0)
        }
    }

    /// Remove the value behind `key`. Stale keys are ignored.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index());
        self.live -= 1;
        Some(value)
    }

    pub fn get(&self, key: K) -> Option<&T> {
        let slot = self.slots.get(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (K::from_parts(i as u32, slot.generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut arena: Arena<NodeId, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn stale_key_after_reuse_is_rejected() {
        let mut arena: Arena<PortId, u32> = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);
        assert_eq!(a.index(), b.index(), "slot should be reused");
        assert_ne!(a, b);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn double_remove_is_noop() {
        let mut arena: Arena<EdgeId, u32> = Arena::new();
        let a = arena.insert(7);
        assert_eq!(arena.remove(a), Some(7));
        assert_eq!(arena.remove(a), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn iter_skips_freed_slots() {
        let mut arena: Arena<NodeId, char> = Arena::new();
        let a = arena.insert('a');
        let _b = arena.insert('b');
        arena.remove(a);
        let live: Vec<char> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec!['b']);
    }

    #[test]
    fn debug_format_shows_generation() {
        let mut arena: Arena<NodeId, ()> = Arena::new();
        let a = arena.insert(());
        assert_eq!(format!("{a:?}"), "n0");
        arena.remove(a);
        let b = arena.insert(());
        assert_eq!(format!("{b:?}"), "n0v1");
    }
}
