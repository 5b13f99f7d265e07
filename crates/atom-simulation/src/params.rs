//! Simulation configuration and the GPU parameter block

use atom_physics::{ForceConstants, BREAK_BOND_DISTANCE, CHUNK_SIZE};
use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};

use crate::error::ConfigError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Edge lengths of a chunk. Interactions reach at most one chunk away.
    pub chunk_size: Vec2,
    /// Multiplier on the mean bond length beyond which a bond breaks (and within which
    /// one may form)
    pub break_bond_distance: f32,
    pub forces: ForceConstants,
    /// Reject `add_bond` when either atom is at its `max_connections`
    pub enforce_max_connections: bool,
    /// Seed for the CPU backend's coincident-atom separation direction
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            chunk_size: Vec2::splat(CHUNK_SIZE),
            break_bond_distance: BREAK_BOND_DISTANCE,
            forces: ForceConstants::default(),
            enforce_max_connections: false,
            seed: 0x5eed,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chunk_size.is_finite() && self.chunk_size.cmpgt(Vec2::ZERO).all()) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if !(self.break_bond_distance.is_finite() && self.break_bond_distance > 0.0) {
            return Err(ConfigError::InvalidBreakDistance(self.break_bond_distance));
        }
        Ok(())
    }
}

/// Uniform block read by the compute kernel (matches `Params` in WGSL)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PhysicsParams {
    // x: dt, y: atom_damping, z: extension_threshold, w: padding
    pub integration: [f32; 4],

    // x: repulsion_k, y: bond_damping, z: restitution, w: padding
    pub forces: [f32; 4],

    // x, y: chunk coordinate of column 0 / row 0, z: columns, w: rows
    pub grid: [i32; 4],

    // x: atom count, y: cell count (columns * rows), z, w: padding
    pub counts: [u32; 4],
}

impl PhysicsParams {
    pub fn new(forces: &ForceConstants, dt: f32) -> Self {
        Self {
            integration: [dt, forces.atom_damping, forces.extension_threshold, 0.0],
            forces: [forces.repulsion_k, forces.bond_damping, forces.restitution, 0.0],
            grid: [0; 4],
            counts: [0; 4],
        }
    }

    /// Record the chunk table layout and atom count of a packed frame
    pub fn with_grid(mut self, origin: IVec2, columns: u32, rows: u32, atom_count: u32) -> Self {
        self.grid = [origin.x, origin.y, columns as i32, rows as i32];
        self.counts = [atom_count, columns * rows, 0, 0];
        self
    }

    pub fn dt(&self) -> f32 {
        self.integration[0]
    }

    pub fn force_constants(&self) -> ForceConstants {
        ForceConstants {
            repulsion_k: self.forces[0],
            bond_damping: self.forces[1],
            restitution: self.forces[2],
            atom_damping: self.integration[1],
            extension_threshold: self.integration[2],
        }
    }

    pub fn columns(&self) -> u32 {
        self.grid[2] as u32
    }

    pub fn rows(&self) -> u32 {
        self.grid[3] as u32
    }

    pub fn atom_count(&self) -> u32 {
        self.counts[0]
    }

    pub fn cell_count(&self) -> u32 {
        self.counts[1]
    }
}
