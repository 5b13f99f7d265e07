//! Undirected bond graph
//!
//! Bonds are stored as an id-indexed adjacency map. Both directions are always written
//! together, so `a ∈ bonds(b) ⟺ b ∈ bonds(a)` holds by construction; debug builds assert it.

use std::collections::{BTreeMap, BTreeSet};

use crate::atom::AtomId;

#[derive(Debug, Clone, Default)]
pub struct BondGraph {
    adjacency: BTreeMap<AtomId, BTreeSet<AtomId>>,
    bond_count: usize,
}

impl BondGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the bond `a - b`. Rejects self-bonds and duplicates.
    pub fn link(&mut self, a: AtomId, b: AtomId) -> bool {
        if a == b || self.contains(a, b) {
            return false;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        self.bond_count += 1;
        self.debug_assert_symmetric(a, b);
        true
    }

    /// Remove the bond `a - b` from both sides. Returns whether it existed.
    pub fn unlink(&mut self, a: AtomId, b: AtomId) -> bool {
        let forward = self.remove_half(a, b);
        let backward = self.remove_half(b, a);
        debug_assert_eq!(forward, backward, "asymmetric bond {a:?} - {b:?}");
        if forward || backward {
            self.bond_count -= 1;
        }
        forward || backward
    }

    pub fn contains(&self, a: AtomId, b: AtomId) -> bool {
        let bonded = self.adjacency.get(&a).is_some_and(|set| set.contains(&b));
        debug_assert_eq!(
            bonded,
            self.adjacency.get(&b).is_some_and(|set| set.contains(&a)),
            "asymmetric bond {a:?} - {b:?}"
        );
        bonded
    }

    /// Bond partners of `id` in ascending id order
    pub fn partners(&self, id: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.adjacency.get(&id).into_iter().flatten().copied()
    }

    pub fn degree(&self, id: AtomId) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeSet::len)
    }

    /// Remove every bond touching `id`, returning the former partners.
    pub fn sever(&mut self, id: AtomId) -> Vec<AtomId> {
        let partners: Vec<AtomId> = self.partners(id).collect();
        for &partner in &partners {
            self.unlink(id, partner);
        }
        partners
    }

    /// Every bond exactly once as `(low, high)`, ordered by `low` then `high`
    pub fn pairs(&self) -> impl Iterator<Item = (AtomId, AtomId)> + '_ {
        self.adjacency.iter().flat_map(|(&a, partners)| {
            partners
                .range((std::ops::Bound::Excluded(a), std::ops::Bound::Unbounded))
                .map(move |&b| (a, b))
        })
    }

    /// Number of bonds (unordered pairs)
    pub fn len(&self) -> usize {
        self.bond_count
    }

    pub fn is_empty(&self) -> bool {
        self.bond_count == 0
    }

    fn remove_half(&mut self, from: AtomId, to: AtomId) -> bool {
        let Some(set) = self.adjacency.get_mut(&from) else {
            return false;
        };
        let removed = set.remove(&to);
        if set.is_empty() {
            self.adjacency.remove(&from);
        }
        removed
    }

    fn debug_assert_symmetric(&self, a: AtomId, b: AtomId) {
        debug_assert!(
            self.adjacency.get(&a).is_some_and(|s| s.contains(&b))
                && self.adjacency.get(&b).is_some_and(|s| s.contains(&a)),
            "asymmetric bond {a:?} - {b:?}"
        );
    }
}
