//! Spatial chunk grid
//!
//! Space is cut into fixed-size cells ("chunks") so pairwise interactions only need to
//! look at the 3×3 block of chunks around an atom. A chunk exists only while it holds
//! at least one atom.

use glam::{IVec2, Vec2};
use std::collections::HashMap;

use crate::atom::AtomId;

/// Integer chunk coordinate: `floor(position / chunk_size)` componentwise
pub type ChunkCoord = IVec2;

/// Offsets of the 3×3 neighborhood, x-major
const NEIGHBOR_OFFSETS: [IVec2; 9] = [
    IVec2::new(-1, -1),
    IVec2::new(-1, 0),
    IVec2::new(-1, 1),
    IVec2::new(0, -1),
    IVec2::new(0, 0),
    IVec2::new(0, 1),
    IVec2::new(1, -1),
    IVec2::new(1, 0),
    IVec2::new(1, 1),
];

#[derive(Debug, Clone)]
pub struct ChunkGrid {
    chunk_size: Vec2,
    chunks: HashMap<ChunkCoord, Vec<AtomId>>,
}

impl ChunkGrid {
    /// `chunk_size` must be positive in both axes (checked by the engine config).
    pub fn new(chunk_size: Vec2) -> Self {
        debug_assert!(chunk_size.cmpgt(Vec2::ZERO).all());
        Self {
            chunk_size,
            chunks: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> Vec2 {
        self.chunk_size
    }

    /// Chunk containing `position`. Floors toward negative infinity, so the cells
    /// straddling the origin are the same size as every other cell.
    pub fn coord_of(&self, position: Vec2) -> ChunkCoord {
        (position / self.chunk_size).floor().as_ivec2()
    }

    /// Whether `position` maps to a chunk coordinate an `i32` can hold. Beyond that
    /// `coord_of` saturates and distinct cells collapse into the edge chunk.
    pub fn in_range(&self, position: Vec2) -> bool {
        let cell = (position / self.chunk_size).floor();
        cell.cmpge(Vec2::splat(i32::MIN as f32)).all()
            && cell.cmplt(Vec2::splat(i32::MAX as f32)).all()
    }

    /// File an atom under the chunk of `position`, creating the chunk if needed.
    pub fn insert(&mut self, id: AtomId, position: Vec2) -> ChunkCoord {
        let coord = self.coord_of(position);
        self.chunks.entry(coord).or_default().push(id);
        coord
    }

    /// Remove an atom from the chunk its *current* position maps to.
    ///
    /// Empty chunks are dropped. Returns `false` if the atom is not filed there.
    pub fn remove(&mut self, id: AtomId, position: Vec2) -> bool {
        let coord = self.coord_of(position);
        let Some(atoms) = self.chunks.get_mut(&coord) else {
            return false;
        };
        let Some(index) = atoms.iter().position(|&other| other == id) else {
            return false;
        };
        atoms.remove(index);
        if atoms.is_empty() {
            self.chunks.remove(&coord);
        }
        true
    }

    /// Re-file every atom from its current position. Returns how many atoms changed chunk.
    ///
    /// Atoms keep the relative order they are supplied in, so the rebuild is deterministic.
    pub fn rebuild<I>(&mut self, atoms: I) -> usize
    where
        I: IntoIterator<Item = (AtomId, Vec2)>,
    {
        let previous: HashMap<AtomId, ChunkCoord> = self
            .chunks
            .iter()
            .flat_map(|(&coord, ids)| ids.iter().map(move |&id| (id, coord)))
            .collect();

        let mut chunks: HashMap<ChunkCoord, Vec<AtomId>> =
            HashMap::with_capacity(self.chunks.len());
        let mut moved = 0;
        for (id, position) in atoms {
            let coord = self.coord_of(position);
            if previous.get(&id) != Some(&coord) {
                moved += 1;
            }
            chunks.entry(coord).or_default().push(id);
        }

        self.chunks = chunks;
        log::trace!("chunk rebuild: {} chunks, {} atoms moved", self.chunks.len(), moved);
        moved
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<&[AtomId]> {
        self.chunks.get(&coord).map(Vec::as_slice)
    }

    pub fn contains(&self, id: AtomId, position: Vec2) -> bool {
        self.get(self.coord_of(position))
            .is_some_and(|atoms| atoms.contains(&id))
    }

    /// Occupied chunks within Chebyshev distance 1 of `coord` (including itself)
    ///
    /// Offsets that would step past the `i32` range are skipped.
    pub fn neighbors_3x3(
        &self,
        coord: ChunkCoord,
    ) -> impl Iterator<Item = (ChunkCoord, &[AtomId])> + '_ {
        NEIGHBOR_OFFSETS.iter().filter_map(move |&offset| {
            let neighbor = IVec2::new(
                coord.x.checked_add(offset.x)?,
                coord.y.checked_add(offset.y)?,
            );
            self.get(neighbor).map(|atoms| (neighbor, atoms))
        })
    }

    /// Occupied coordinates in row-major order (y, then x)
    pub fn coords_sorted(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self.chunks.keys().copied().collect();
        coords.sort_unstable_by_key(|c| (c.y, c.x));
        coords
    }

    /// Inclusive bounding box `(min, max)` of the occupied chunks
    pub fn bounds(&self) -> Option<(ChunkCoord, ChunkCoord)> {
        let mut coords = self.chunks.keys();
        let first = *coords.next()?;
        Some(coords.fold((first, first), |(min, max), &c| (min.min(c), max.max(c))))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkCoord, &[AtomId])> + '_ {
        self.chunks.iter().map(|(&coord, atoms)| (coord, atoms.as_slice()))
    }

    /// Number of occupied chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn atom_count(&self) -> usize {
        self.chunks.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(Vec2::splat(100.0))
    }

    #[test]
    fn test_coord_floors_negative_positions() {
        let grid = grid();
        assert_eq!(grid.coord_of(Vec2::new(150.0, 99.9)), IVec2::new(1, 0));
        assert_eq!(grid.coord_of(Vec2::new(-0.5, -100.0)), IVec2::new(-1, -1));
        assert_eq!(grid.coord_of(Vec2::new(-100.5, 0.0)), IVec2::new(-2, 0));
    }

    #[test]
    fn test_insert_and_remove_drops_empty_chunk() {
        let mut grid = grid();
        let pos = Vec2::new(250.0, 30.0);
        grid.insert(AtomId(1), pos);
        grid.insert(AtomId(2), pos);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.get(IVec2::new(2, 0)), Some(&[AtomId(1), AtomId(2)][..]));

        assert!(grid.remove(AtomId(1), pos));
        assert!(!grid.remove(AtomId(1), pos));
        assert_eq!(grid.len(), 1);

        assert!(grid.remove(AtomId(2), pos));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_remove_uses_current_position() {
        let mut grid = grid();
        grid.insert(AtomId(1), Vec2::new(10.0, 10.0));
        // The atom has drifted into the next chunk without a rebuild
        assert!(!grid.remove(AtomId(1), Vec2::new(110.0, 10.0)));
        assert!(grid.contains(AtomId(1), Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn test_rebuild_moves_atoms() {
        let mut grid = grid();
        grid.insert(AtomId(1), Vec2::new(10.0, 10.0));
        grid.insert(AtomId(2), Vec2::new(20.0, 10.0));

        let moved = grid.rebuild([
            (AtomId(1), Vec2::new(10.0, 10.0)),
            (AtomId(2), Vec2::new(-20.0, 10.0)),
        ]);
        assert_eq!(moved, 1);
        assert!(grid.contains(AtomId(1), Vec2::new(10.0, 10.0)));
        assert!(grid.contains(AtomId(2), Vec2::new(-20.0, 10.0)));
        assert_eq!(grid.atom_count(), 2);
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_neighbors_skip_missing_chunks() {
        let mut grid = grid();
        grid.insert(AtomId(1), Vec2::new(50.0, 50.0));
        grid.insert(AtomId(2), Vec2::new(150.0, 150.0));
        grid.insert(AtomId(3), Vec2::new(350.0, 50.0));

        let found: Vec<ChunkCoord> = grid.neighbors_3x3(IVec2::ZERO).map(|(c, _)| c).collect();
        assert_eq!(found, vec![IVec2::new(0, 0), IVec2::new(1, 1)]);
    }

    #[test]
    fn test_in_range_rejects_saturating_positions() {
        let grid = grid();
        assert!(grid.in_range(Vec2::new(-2.0e11, 2.0e11)));
        assert!(!grid.in_range(Vec2::new(3.0e11, 0.0)));
        assert!(!grid.in_range(Vec2::new(0.0, -3.0e11)));
    }

    #[test]
    fn test_neighbors_at_grid_edge() {
        let mut grid = grid();
        // Saturates to (i32::MAX, i32::MIN)
        let far = Vec2::new(1.0e12, -1.0e12);
        grid.insert(AtomId(1), far);
        let edge = grid.coord_of(far);
        assert_eq!(edge, IVec2::new(i32::MAX, i32::MIN));

        let found: Vec<ChunkCoord> = grid.neighbors_3x3(edge).map(|(c, _)| c).collect();
        assert_eq!(found, vec![edge]);
        assert_eq!(grid.neighbors_3x3(IVec2::MAX).count(), 0);
    }

    #[test]
    fn test_bounds_and_sorted_coords() {
        let mut grid = grid();
        assert_eq!(grid.bounds(), None);
        grid.insert(AtomId(1), Vec2::new(-150.0, 250.0));
        grid.insert(AtomId(2), Vec2::new(350.0, -50.0));
        grid.insert(AtomId(3), Vec2::new(50.0, -50.0));

        assert_eq!(grid.bounds(), Some((IVec2::new(-2, -1), IVec2::new(3, 2))));
        assert_eq!(
            grid.coords_sorted(),
            vec![IVec2::new(0, -1), IVec2::new(3, -1), IVec2::new(-2, 2)]
        );
    }
}
