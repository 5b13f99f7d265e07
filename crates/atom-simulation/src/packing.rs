//! Flat buffer layout shared by the host and the compute kernel
//!
//! Atoms are packed cell by cell, walking the occupied chunk bounding box row-major,
//! so every cell is a contiguous `[start, start + count)` range of the atom buffer.
//! Bonds become CSR arrays of packed indices. `reference_kernel` evaluates the same
//! per-atom program as `shaders/atom_physics.wgsl` on the host, which lets the GPU
//! contract be tested without an adapter.

use std::collections::HashMap;

use atom_physics::{
    bond_impulse, bounce_impulse, contact, repulsion_force, Atom, AtomHandle, AtomId, BondGraph,
    BondParams, ChunkGrid, ForceConstants,
};
use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};

use crate::arena::AtomArena;
use crate::error::GpuError;
use crate::params::PhysicsParams;

/// Upper bound on chunk table cells (columns × rows) for one dispatch
pub const MAX_GRID_CELLS: u64 = 1 << 22;

/// Per-atom kinematic state (matches `Atom` in WGSL)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuAtom {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub mass: f32,
    pub charge: f32,
    pub radius: f32,
    /// Position of this atom in ascending-id order; orders pairs inside the kernel
    pub rank: u32,
}

impl GpuAtom {
    pub fn from_atom(atom: &Atom, rank: u32) -> Self {
        Self {
            position: atom.position.to_array(),
            velocity: atom.velocity.to_array(),
            mass: atom.mass,
            charge: atom.charge,
            radius: atom.radius,
            rank,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuBondParams {
    pub d_e: f32,
    pub a: f32,
    pub r_e: f32,
    pub extended_modifier: f32,
}

impl From<&BondParams> for GpuBondParams {
    fn from(params: &BondParams) -> Self {
        Self {
            d_e: params.d_e,
            a: params.a,
            r_e: params.r_e,
            extended_modifier: params.extended_modifier,
        }
    }
}

/// One cell of the chunk table
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuChunk {
    pub start: u32,
    pub count: u32,
}

/// A frame flattened into kernel inputs
#[derive(Debug, Clone, Default)]
pub struct PackedFrame {
    pub atoms: Vec<GpuAtom>,
    pub bond_params: Vec<GpuBondParams>,
    /// Engine id of each packed atom, for writing results back
    pub ids: Vec<AtomId>,
    /// Row-major over the occupied bounding box; empty cells have `count == 0`
    pub chunks: Vec<GpuChunk>,
    pub grid_origin: IVec2,
    pub columns: u32,
    pub rows: u32,
    pub bond_offsets: Vec<u32>,
    pub bond_counts: Vec<u32>,
    pub bond_indices: Vec<u32>,
}

/// Flatten the arena, bond graph and chunk grid.
///
/// The chunk grid must be consistent with atom positions (true between steps).
pub fn pack_frame(
    atoms: &AtomArena,
    bonds: &BondGraph,
    chunks: &ChunkGrid,
) -> Result<PackedFrame, GpuError> {
    let Some((min, max)) = chunks.bounds() else {
        return Ok(PackedFrame::default());
    };

    let columns = (i64::from(max.x) - i64::from(min.x) + 1) as u64;
    let rows = (i64::from(max.y) - i64::from(min.y) + 1) as u64;
    if columns.saturating_mul(rows) > MAX_GRID_CELLS {
        return Err(GpuError::GridTooLarge { columns, rows });
    }

    let mut sorted_ids: Vec<AtomId> = atoms.iter().map(|(id, _)| id).collect();
    sorted_ids.sort_unstable();
    let ranks: HashMap<AtomId, u32> = sorted_ids
        .iter()
        .enumerate()
        .map(|(rank, &id)| (id, rank as u32))
        .collect();

    let mut frame = PackedFrame {
        grid_origin: min,
        columns: columns as u32,
        rows: rows as u32,
        ..Default::default()
    };

    for row in 0..frame.rows as i32 {
        for column in 0..frame.columns as i32 {
            let coord = min + IVec2::new(column, row);
            let start = frame.atoms.len() as u32;
            for &id in chunks.get(coord).unwrap_or_default() {
                let Some(atom) = atoms.get(id) else {
                    continue;
                };
                frame.atoms.push(GpuAtom::from_atom(atom, ranks[&id]));
                frame.bond_params.push(GpuBondParams::from(&atom.bond));
                frame.ids.push(id);
            }
            frame.chunks.push(GpuChunk {
                start,
                count: frame.atoms.len() as u32 - start,
            });
        }
    }
    debug_assert_eq!(frame.atoms.len(), atoms.len(), "chunk grid out of sync with atoms");

    let index_of: HashMap<AtomId, u32> = frame
        .ids
        .iter()
        .enumerate()
        .map(|(index, &id)| (id, index as u32))
        .collect();

    for &id in &frame.ids {
        frame.bond_offsets.push(frame.bond_indices.len() as u32);
        let before = frame.bond_indices.len();
        frame
            .bond_indices
            .extend(bonds.partners(id).filter_map(|partner| index_of.get(&partner).copied()));
        frame.bond_counts.push((frame.bond_indices.len() - before) as u32);
    }

    Ok(frame)
}

impl PackedFrame {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Uniform block for this frame
    pub fn params(&self, forces: &ForceConstants, dt: f32) -> PhysicsParams {
        PhysicsParams::new(forces, dt).with_grid(
            self.grid_origin,
            self.columns,
            self.rows,
            self.atoms.len() as u32,
        )
    }

    /// Index of the chunk table cell holding packed atom `index`
    pub fn cell_of(&self, index: u32) -> usize {
        self.chunks.partition_point(|cell| cell.start <= index).saturating_sub(1)
    }

    /// Write kernel output back into the arena by packed index.
    pub fn unpack_into(&self, results: &[GpuAtom], atoms: &mut AtomArena) {
        debug_assert_eq!(results.len(), self.ids.len());
        for (&id, result) in self.ids.iter().zip(results) {
            if let Some(atom) = atoms.get_mut(id) {
                atom.position = Vec2::from_array(result.position);
                atom.velocity = Vec2::from_array(result.velocity);
            }
        }
    }

    fn atom(&self, index: usize) -> Atom {
        let packed = &self.atoms[index];
        let bond = &self.bond_params[index];
        Atom {
            position: Vec2::from_array(packed.position),
            velocity: Vec2::from_array(packed.velocity),
            mass: packed.mass,
            charge: packed.charge,
            radius: packed.radius,
            bond: BondParams {
                d_e: bond.d_e,
                a: bond.a,
                r_e: bond.r_e,
                extended_modifier: bond.extended_modifier,
            },
            max_connections: 0,
            handle: AtomHandle(u64::from(packed.rank)),
        }
    }

    fn partners(&self, index: usize) -> &[u32] {
        let offset = self.bond_offsets[index] as usize;
        let count = self.bond_counts[index] as usize;
        &self.bond_indices[offset..offset + count]
    }

    /// Packed indices of every other atom in the 3x3 cell window around `index`
    fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let cell = self.cell_of(index as u32) as i32;
        let columns = self.columns as i32;
        let (cx, cy) = (cell % columns, cell / columns);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| IVec2::new(cx + dx, cy + dy)))
            .filter(move |c| c.x >= 0 && c.y >= 0 && c.x < columns && c.y < self.rows as i32)
            .flat_map(move |c| {
                let chunk = self.chunks[(c.y * columns + c.x) as usize];
                chunk.start as usize..(chunk.start + chunk.count) as usize
            })
            .filter(move |&j| j != index)
    }

    /// Velocity of atom `index` after every bond touching it has kicked it once
    fn bonded_velocity(&self, index: usize, forces: &ForceConstants) -> Vec2 {
        let me = self.atom(index);
        let mut velocity = me.velocity;
        for &partner in self.partners(index) {
            let other = self.atom(partner as usize);
            if self.atoms[index].rank < self.atoms[partner as usize].rank {
                velocity += bond_impulse(&me, &other, forces) / me.mass;
            } else {
                velocity -= bond_impulse(&other, &me, forces) / me.mass;
            }
        }
        velocity
    }
}

/// PCG hash (one round of a 32-bit PCG step)
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Separation direction for two coincident atoms, a pure function of their ranks
pub fn pair_direction(low_rank: u32, high_rank: u32) -> Vec2 {
    let hash = pcg_hash(low_rank ^ pcg_hash(high_rank));
    let angle = hash as f32 * (1.0 / 4_294_967_296.0) * std::f32::consts::TAU;
    Vec2::new(angle.cos(), angle.sin())
}

/// Host evaluation of the compute kernel.
///
/// Every atom is advanced independently from the packed snapshot:
/// its post-bond velocity, then repulsion and collision against each neighbor (using
/// that neighbor's post-bond velocity), then integration and damping.
pub fn reference_kernel(frame: &PackedFrame, params: &PhysicsParams) -> Vec<GpuAtom> {
    let forces = params.force_constants();
    let dt = params.dt();

    (0..frame.len())
        .map(|i| {
            let me = frame.atoms[i];
            let mut velocity = frame.bonded_velocity(i, &forces);
            let mut shift = Vec2::ZERO;

            for j in frame.neighbors(i) {
                let other = frame.atoms[j];
                let i_is_low = me.rank < other.rank;
                let (low, high) = if i_is_low { (i, j) } else { (j, i) };

                let mut a = frame.atom(low);
                let mut b = frame.atom(high);
                a.velocity = frame.bonded_velocity(low, &forces);
                b.velocity = frame.bonded_velocity(high, &forces);

                let force = repulsion_force(&a, &b, forces.repulsion_k);
                a.velocity -= force / a.mass;
                b.velocity += force / b.mass;
                if i_is_low {
                    velocity -= force / a.mass;
                } else {
                    velocity += force / b.mass;
                }

                let (low_rank, high_rank) = (frame.atoms[low].rank, frame.atoms[high].rank);
                if let Some(hit) = contact(&a, &b, || pair_direction(low_rank, high_rank)) {
                    let correction = hit.normal * hit.overlap * 0.5;
                    let relative_velocity = b.velocity - a.velocity;
                    let kick = bounce_impulse(relative_velocity, hit.normal, forces.restitution);
                    if let Some(kick) = kick {
                        if i_is_low {
                            velocity -= kick;
                        } else {
                            velocity += kick;
                        }
                    }
                    if i_is_low {
                        shift -= correction;
                    } else {
                        shift += correction;
                    }
                }
            }

            let position = Vec2::from_array(me.position) + shift + velocity * dt;
            GpuAtom {
                position: position.to_array(),
                velocity: (velocity * forces.atom_damping).to_array(),
                ..me
            }
        })
        .collect()
}
