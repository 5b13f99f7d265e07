//! Dense storage for live atoms, addressed by `AtomId`

use atom_physics::{Atom, AtomId};
use std::collections::HashMap;

/// Atoms packed in a `Vec` with an id → slot index.
///
/// Removal swaps the last atom into the hole, so iteration order only depends on
/// the sequence of inserts and removals.
#[derive(Debug, Clone, Default)]
pub struct AtomArena {
    ids: Vec<AtomId>,
    atoms: Vec<Atom>,
    slots: HashMap<AtomId, usize>,
}

impl AtomArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: AtomId, atom: Atom) {
        debug_assert!(!self.slots.contains_key(&id), "duplicate atom id {id:?}");
        self.slots.insert(id, self.atoms.len());
        self.ids.push(id);
        self.atoms.push(atom);
    }

    pub fn remove(&mut self, id: AtomId) -> Option<Atom> {
        let slot = self.slots.remove(&id)?;
        self.ids.swap_remove(slot);
        let atom = self.atoms.swap_remove(slot);
        if let Some(&moved) = self.ids.get(slot) {
            self.slots.insert(moved, slot);
        }
        Some(atom)
    }

    pub fn get(&self, id: AtomId) -> Option<&Atom> {
        self.slots.get(&id).map(|&slot| &self.atoms[slot])
    }

    pub fn get_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.slots.get(&id).map(|&slot| &mut self.atoms[slot])
    }

    /// Mutable access to two distinct atoms at once
    pub fn pair_mut(&mut self, a: AtomId, b: AtomId) -> Option<(&mut Atom, &mut Atom)> {
        let i = *self.slots.get(&a)?;
        let j = *self.slots.get(&b)?;
        if i == j {
            return None;
        }
        if i < j {
            let (low, high) = self.atoms.split_at_mut(j);
            Some((&mut low[i], &mut high[0]))
        } else {
            let (low, high) = self.atoms.split_at_mut(i);
            Some((&mut high[0], &mut low[j]))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> + '_ {
        self.ids.iter().copied().zip(self.atoms.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (AtomId, &mut Atom)> + '_ {
        self.ids.iter().copied().zip(self.atoms.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atom_physics::AtomHandle;
    use glam::Vec2;

    fn arena_of(n: u64) -> AtomArena {
        let mut arena = AtomArena::new();
        for i in 0..n {
            arena.insert(AtomId(i), Atom::carbon(Vec2::new(i as f32, 0.0), AtomHandle(i)));
        }
        arena
    }

    #[test]
    fn test_remove_keeps_slots_consistent() {
        let mut arena = arena_of(4);
        let removed = arena.remove(AtomId(1)).map(|a| a.handle);
        assert_eq!(removed, Some(AtomHandle(1)));
        assert_eq!(arena.len(), 3);
        assert!(arena.get(AtomId(1)).is_none());
        for id in [0, 2, 3] {
            assert_eq!(arena.get(AtomId(id)).map(|a| a.handle), Some(AtomHandle(id)));
        }
        assert!(arena.remove(AtomId(1)).is_none());
    }

    #[test]
    fn test_pair_mut_in_both_orders() {
        let mut arena = arena_of(3);
        {
            let (a, b) = arena.pair_mut(AtomId(2), AtomId(0)).unwrap();
            a.velocity.x = 2.0;
            b.velocity.x = -2.0;
        }
        assert_eq!(arena.get(AtomId(2)).unwrap().velocity.x, 2.0);
        assert_eq!(arena.get(AtomId(0)).unwrap().velocity.x, -2.0);
        assert!(arena.pair_mut(AtomId(1), AtomId(1)).is_none());
        assert!(arena.pair_mut(AtomId(1), AtomId(9)).is_none());
    }
}
