//! Generational arena and the handle types that index it.
//!
//! Cells, rules and objects live in arenas owned by the runtime and refer to
//! each other by copyable handles. A freed slot bumps its generation, so a
//! stale handle never aliases whatever reuses the slot.

use std::fmt;

/// Raw slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Slot index, stable for the lifetime of the entry.
    pub fn index(&self) -> u32 {
        self.index
    }
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) Key);

        impl $name {
            /// Slot index of this handle.
            pub fn index(&self) -> u32 {
                self.0.index
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}v{}", $prefix, self.0.index, self.0.generation)
            }
        }
    };
}

arena_id!(
    /// Handle of a cell in the dependency graph.
    CellId,
    "c"
);
arena_id!(
    /// Handle of a rule in the dependency graph.
    RuleId,
    "r"
);
arena_id!(
    /// Handle of a reactive object.
    ObjectId,
    "o"
);

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Key {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Key {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Key {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Key {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_ne!(a, b);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn stale_keys_do_not_alias_reused_slots() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        assert_eq!(arena.remove(old), Some(1));

        let new = arena.insert(2);
        assert_eq!(new.index(), old.index());
        assert!(arena.get(old).is_none());
        assert!(arena.remove(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut arena = Arena::new();
        let a = arena.insert('a');
        let _b = arena.insert('b');
        arena.remove(a);

        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b']);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn handle_display_includes_generation() {
        let mut arena = Arena::new();
        let key = arena.insert(());
        assert_eq!(CellId(key).to_string(), "c0v0");
        arena.remove(key);
        let key = arena.insert(());
        assert_eq!(RuleId(key).to_string(), "r0v1");
    }
}
