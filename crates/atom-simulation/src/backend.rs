//! Force evaluation seam shared by the CPU and GPU backends

use atom_physics::{BondGraph, ChunkGrid, ForceConstants};

use crate::arena::AtomArena;
use crate::error::StepError;

/// Everything a backend may touch during one step.
///
/// Only atom kinematics are mutable; bonds and chunk membership are CPU-side
/// bookkeeping updated by the engine after the backend returns.
pub struct Frame<'a> {
    pub atoms: &'a mut AtomArena,
    pub bonds: &'a BondGraph,
    pub chunks: &'a ChunkGrid,
    pub forces: &'a ForceConstants,
}

/// Strategy for the numeric core of a step: bonded forces, repulsion and collisions,
/// then integration and damping.
pub trait ForceBackend {
    fn name(&self) -> &'static str;

    /// Advance velocities and positions by `dt`. Must not return until the new state
    /// is written back into `frame.atoms`.
    fn evaluate_and_integrate(&mut self, frame: Frame<'_>, dt: f32) -> Result<(), StepError>;
}

impl<B: ForceBackend + ?Sized> ForceBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn evaluate_and_integrate(&mut self, frame: Frame<'_>, dt: f32) -> Result<(), StepError> {
        (**self).evaluate_and_integrate(frame, dt)
    }
}
