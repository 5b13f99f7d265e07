//! The simulation engine
//!
//! `AtomWorld` owns every atom, the bond graph and the chunk grid. Callers hold
//! `AtomId`s and read state between steps; nothing outside the engine mutates atoms
//! while a step runs (`step` takes `&mut self`).

use atom_physics::{mean_bond_length, Atom, AtomError, AtomHandle, AtomId, BondGraph, ChunkGrid};
use glam::Vec2;

use crate::arena::AtomArena;
use crate::backend::{ForceBackend, Frame};
use crate::cpu::CpuBackend;
use crate::error::{ConfigError, GpuError, StepError};
use crate::packing::{pack_frame, PackedFrame};
use crate::params::SimulationConfig;

/// Notifications for the host, collected until `drain_events`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    /// The atom is gone; the host should release whatever it paired with `handle`.
    AtomRemoved { id: AtomId, handle: AtomHandle },
    /// A bond exceeded the break distance during a step.
    BondBroken { a: AtomId, b: AtomId },
}

/// Summary of one `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    /// Steps completed so far, including this one
    pub step: u64,
    /// Atoms whose chunk changed
    pub relocated: usize,
    pub bonds_broken: usize,
}

pub struct AtomWorld<B = CpuBackend> {
    config: SimulationConfig,
    atoms: AtomArena,
    bonds: BondGraph,
    chunks: ChunkGrid,
    backend: B,
    events: Vec<WorldEvent>,
    next_id: u64,
    steps: u64,
}

impl AtomWorld<CpuBackend> {
    /// Engine with the serial CPU backend seeded from `config.seed`
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        let backend = CpuBackend::new(config.seed);
        Self::with_backend(config, backend)
    }
}

impl<B: ForceBackend> AtomWorld<B> {
    pub fn with_backend(config: SimulationConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!("AtomWorld created with {} backend", backend.name());
        Ok(Self {
            chunks: ChunkGrid::new(config.chunk_size),
            config,
            atoms: AtomArena::new(),
            bonds: BondGraph::new(),
            backend,
            events: Vec::new(),
            next_id: 0,
            steps: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Take ownership of an atom and file it in its chunk.
    pub fn add_atom(&mut self, atom: Atom) -> Result<AtomId, AtomError> {
        atom.validate()?;
        self.check_in_grid(atom.position)?;
        let id = AtomId(self.next_id);
        self.next_id += 1;
        self.chunks.insert(id, atom.position);
        self.atoms.insert(id, atom);
        Ok(id)
    }

    /// Add an atom already bonded to `bond_to`.
    ///
    /// Either both happen or neither: `Ok(None)` means the bond would have been
    /// rejected and the atom was not added.
    pub fn add_atom_bonded(
        &mut self,
        atom: Atom,
        bond_to: AtomId,
    ) -> Result<Option<AtomId>, AtomError> {
        atom.validate()?;
        self.check_in_grid(atom.position)?;
        let Some(partner) = self.atoms.get(bond_to) else {
            return Ok(None);
        };
        if !self.within_bond_range(&atom, partner) || !self.has_free_slot(bond_to, partner) {
            return Ok(None);
        }
        if self.config.enforce_max_connections && atom.max_connections == 0 {
            return Ok(None);
        }

        let id = self.add_atom(atom)?;
        let linked = self.bonds.link(id, bond_to);
        debug_assert!(linked);
        Ok(Some(id))
    }

    /// Remove an atom, severing all of its bonds.
    pub fn remove_atom(&mut self, id: AtomId) -> bool {
        let Some(atom) = self.atoms.remove(id) else {
            return false;
        };
        let filed = self.chunks.remove(id, atom.position);
        debug_assert!(filed, "{id:?} missing from its chunk");

        let severed = self.bonds.sever(id);
        log::debug!("removed {:?}, severed {} bonds", id, severed.len());
        self.events.push(WorldEvent::AtomRemoved {
            id,
            handle: atom.handle,
        });
        true
    }

    /// Bond two atoms. Rejected (no mutation) for self-bonds, unknown ids, existing
    /// bonds, atoms at or beyond the break distance, and full atoms when the
    /// connection cap is enforced.
    pub fn add_bond(&mut self, a: AtomId, b: AtomId) -> bool {
        if a == b || self.bonds.contains(a, b) {
            return false;
        }
        let (Some(atom_a), Some(atom_b)) = (self.atoms.get(a), self.atoms.get(b)) else {
            return false;
        };
        if !self.within_bond_range(atom_a, atom_b) {
            log::trace!("bond {:?} - {:?} rejected: too far apart", a, b);
            return false;
        }
        if !(self.has_free_slot(a, atom_a) && self.has_free_slot(b, atom_b)) {
            log::trace!("bond {:?} - {:?} rejected: no free connections", a, b);
            return false;
        }
        self.bonds.link(a, b)
    }

    pub fn remove_bond(&mut self, a: AtomId, b: AtomId) -> bool {
        self.bonds.unlink(a, b)
    }

    pub fn is_bonded(&self, a: AtomId, b: AtomId) -> bool {
        self.bonds.contains(a, b)
    }

    /// Bonds `id` can still take before reaching `max_connections`
    pub fn free_connections(&self, id: AtomId) -> Option<u32> {
        let atom = self.atoms.get(id)?;
        let degree = u32::try_from(self.bonds.degree(id)).unwrap_or(u32::MAX);
        Some(atom.max_connections.saturating_sub(degree))
    }

    /// Look up an atom by its handle, searching only the chunk of `last_known_position`.
    ///
    /// The caller must keep that position in sync with the atom (e.g. from the last
    /// `atoms()` read). A stale position yields `None`; there is no global fallback.
    pub fn find_atom_by_handle(
        &self,
        handle: AtomHandle,
        last_known_position: Vec2,
    ) -> Option<AtomId> {
        let coord = self.chunks.coord_of(last_known_position);
        self.chunks
            .get(coord)?
            .iter()
            .copied()
            .find(|&id| self.atoms.get(id).is_some_and(|atom| atom.handle == handle))
    }

    /// Teleport an atom, keeping its chunk membership current.
    ///
    /// `Ok(false)` means `id` is unknown.
    pub fn set_atom_position(&mut self, id: AtomId, position: Vec2) -> Result<bool, AtomError> {
        if !position.is_finite() {
            return Err(AtomError::NonFinite("position"));
        }
        self.check_in_grid(position)?;
        let Some(atom) = self.atoms.get_mut(id) else {
            return Ok(false);
        };
        self.chunks.remove(id, atom.position);
        atom.position = position;
        self.chunks.insert(id, position);
        Ok(true)
    }

    pub fn set_atom_velocity(&mut self, id: AtomId, velocity: Vec2) -> Result<bool, AtomError> {
        if !velocity.is_finite() {
            return Err(AtomError::NonFinite("velocity"));
        }
        let Some(atom) = self.atoms.get_mut(id) else {
            return Ok(false);
        };
        atom.velocity = velocity;
        Ok(true)
    }

    /// Advance the simulation by `dt`.
    ///
    /// The backend evaluates bonded forces, repulsion and collisions, then integrates.
    /// Chunk reassignment and the bond-break scan always run here on the CPU, against
    /// post-integration positions. If the backend fails, atom state is left untouched.
    pub fn step(&mut self, dt: f32) -> Result<StepReport, StepError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(StepError::InvalidTimestep(dt));
        }

        self.backend.evaluate_and_integrate(
            Frame {
                atoms: &mut self.atoms,
                bonds: &self.bonds,
                chunks: &self.chunks,
                forces: &self.config.forces,
            },
            dt,
        )?;

        let relocated = self
            .chunks
            .rebuild(self.atoms.iter().map(|(id, atom)| (id, atom.position)));

        let bonds_broken = self.break_stretched_bonds();

        self.steps += 1;
        log::debug!(
            "step {}: {} atoms, {} bonds, {} relocated, {} broken",
            self.steps,
            self.atoms.len(),
            self.bonds.len(),
            relocated,
            bonds_broken
        );

        Ok(StepReport {
            step: self.steps,
            relocated,
            bonds_broken,
        })
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atoms(&self) -> impl Iterator<Item = (AtomId, &Atom)> + '_ {
        self.atoms.iter()
    }

    /// Every bond once as `(low, high)` in ascending order
    pub fn bonds(&self) -> impl Iterator<Item = (AtomId, AtomId)> + '_ {
        self.bonds.pairs()
    }

    pub fn bond_partners(&self, id: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.bonds.partners(id)
    }

    pub fn chunks(&self) -> &ChunkGrid {
        &self.chunks
    }

    /// Current state flattened into compute kernel inputs
    pub fn packed_frame(&self) -> Result<PackedFrame, GpuError> {
        pack_frame(&self.atoms, &self.bonds, &self.chunks)
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn total_momentum(&self) -> Vec2 {
        self.atoms.iter().map(|(_, atom)| atom.momentum()).sum()
    }

    fn within_bond_range(&self, a: &Atom, b: &Atom) -> bool {
        a.position.distance(b.position) < mean_bond_length(a, b) * self.config.break_bond_distance
    }

    fn has_free_slot(&self, id: AtomId, atom: &Atom) -> bool {
        !self.config.enforce_max_connections
            || (self.bonds.degree(id) as u64) < u64::from(atom.max_connections)
    }

    fn check_in_grid(&self, position: Vec2) -> Result<(), AtomError> {
        if self.chunks.in_range(position) {
            Ok(())
        } else {
            Err(AtomError::OutOfGrid(position))
        }
    }

    fn break_stretched_bonds(&mut self) -> usize {
        let factor = self.config.break_bond_distance;
        let stretched: Vec<(AtomId, AtomId)> = self
            .bonds
            .pairs()
            .filter(|&(a, b)| match (self.atoms.get(a), self.atoms.get(b)) {
                (Some(atom_a), Some(atom_b)) => {
                    let limit = mean_bond_length(atom_a, atom_b) * factor;
                    atom_a.position.distance(atom_b.position) > limit
                }
                _ => false,
            })
            .collect();

        for &(a, b) in &stretched {
            self.bonds.unlink(a, b);
            self.events.push(WorldEvent::BondBroken { a, b });
        }
        stretched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> AtomWorld {
        AtomWorld::new(SimulationConfig::default()).unwrap()
    }

    fn carbon(x: f32, y: f32, handle: u64) -> Atom {
        Atom::carbon(Vec2::new(x, y), AtomHandle(handle))
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut world = world();
        let a = world.add_atom(carbon(0.0, 0.0, 0)).unwrap();
        let b = world.add_atom(carbon(50.0, 0.0, 1)).unwrap();
        world.remove_atom(b);
        let c = world.add_atom(carbon(50.0, 0.0, 2)).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_add_atom_rejects_invalid_mass() {
        let mut world = world();
        let mut atom = carbon(0.0, 0.0, 0);
        atom.mass = 0.0;
        assert_eq!(world.add_atom(atom), Err(AtomError::InvalidMass(0.0)));
        assert_eq!(world.atom_count(), 0);
    }

    #[test]
    fn test_add_bond_distance_threshold() {
        let mut world = world();
        let a = world.add_atom(carbon(0.0, 0.0, 0)).unwrap();
        let near = world.add_atom(carbon(150.0, 0.0, 1)).unwrap();
        let edge = world.add_atom(carbon(0.0, 200.0, 2)).unwrap();

        assert!(world.add_bond(a, near));
        // Exactly mean_bond_length * break_bond_distance is already too far
        assert!(!world.add_bond(a, edge));
        assert!(!world.add_bond(a, a));
        assert!(!world.add_bond(a, AtomId(99)));
        assert_eq!(world.bond_count(), 1);
    }

    #[test]
    fn test_connection_cap_only_when_enforced() {
        let config = SimulationConfig {
            enforce_max_connections: true,
            ..Default::default()
        };
        let mut capped = AtomWorld::new(config).unwrap();
        let hub = capped.add_atom(carbon(0.0, 0.0, 0).with_max_connections(1)).unwrap();
        let x = capped.add_atom(carbon(100.0, 0.0, 1)).unwrap();
        let y = capped.add_atom(carbon(-100.0, 0.0, 2)).unwrap();
        assert!(capped.add_bond(hub, x));
        assert_eq!(capped.free_connections(hub), Some(0));
        assert!(!capped.add_bond(hub, y));

        let mut open = world();
        let hub = open.add_atom(carbon(0.0, 0.0, 0).with_max_connections(1)).unwrap();
        let x = open.add_atom(carbon(100.0, 0.0, 1)).unwrap();
        let y = open.add_atom(carbon(-100.0, 0.0, 2)).unwrap();
        assert!(open.add_bond(hub, x));
        assert!(open.add_bond(hub, y));
        assert_eq!(open.free_connections(hub), Some(0));
    }

    #[test]
    fn test_add_atom_bonded_is_atomic() {
        let mut world = world();
        let anchor = world.add_atom(carbon(0.0, 0.0, 0)).unwrap();

        let bonded = world.add_atom_bonded(carbon(120.0, 0.0, 1), anchor).unwrap();
        let id = bonded.expect("within range");
        assert!(world.is_bonded(anchor, id));

        let rejected = world.add_atom_bonded(carbon(500.0, 0.0, 2), anchor).unwrap();
        assert_eq!(rejected, None);
        assert_eq!(world.atom_count(), 2);
        assert_eq!(world.chunks().atom_count(), 2);

        let missing = world.add_atom_bonded(carbon(10.0, 0.0, 3), AtomId(42)).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_remove_atom_severs_bonds_and_notifies() {
        let mut world = world();
        let a = world.add_atom(carbon(0.0, 0.0, 10)).unwrap();
        let b = world.add_atom(carbon(100.0, 0.0, 11)).unwrap();
        let c = world.add_atom(carbon(50.0, 80.0, 12)).unwrap();
        world.add_bond(a, b);
        world.add_bond(a, c);
        world.add_bond(b, c);

        assert!(world.remove_atom(a));
        assert!(!world.remove_atom(a));
        assert!(!world.is_bonded(a, b));
        assert!(!world.is_bonded(c, a));
        assert!(world.is_bonded(b, c));
        assert_eq!(world.bond_count(), 1);
        assert_eq!(
            world.drain_events(),
            vec![WorldEvent::AtomRemoved {
                id: a,
                handle: AtomHandle(10)
            }]
        );
        assert!(world.drain_events().is_empty());
    }

    #[test]
    fn test_find_by_handle_searches_last_known_chunk() {
        let mut world = world();
        let id = world.add_atom(carbon(130.0, -40.0, 7)).unwrap();
        world.add_atom(carbon(140.0, -40.0, 8)).unwrap();

        assert_eq!(world.find_atom_by_handle(AtomHandle(7), Vec2::new(130.0, -40.0)), Some(id));
        assert_eq!(world.find_atom_by_handle(AtomHandle(7), Vec2::new(199.0, -1.0)), Some(id));
        // Stale position in another chunk
        assert_eq!(world.find_atom_by_handle(AtomHandle(7), Vec2::new(30.0, -40.0)), None);
        assert_eq!(world.find_atom_by_handle(AtomHandle(9), Vec2::new(130.0, -40.0)), None);
    }

    #[test]
    fn test_set_position_refiles_chunk() {
        let mut world = world();
        let id = world.add_atom(carbon(10.0, 10.0, 0)).unwrap();
        assert_eq!(world.set_atom_position(id, Vec2::new(-250.0, 10.0)), Ok(true));
        assert!(world.chunks().contains(id, Vec2::new(-250.0, 10.0)));
        assert_eq!(world.chunks().len(), 1);
        assert_eq!(
            world.set_atom_position(id, Vec2::new(f32::NAN, 0.0)),
            Err(AtomError::NonFinite("position"))
        );
        assert_eq!(world.set_atom_position(AtomId(99), Vec2::ZERO), Ok(false));
    }

    #[test]
    fn test_rejects_positions_outside_chunk_grid() {
        let mut world = world();
        let far = Vec2::new(3.0e11, 0.0);
        assert_eq!(world.add_atom(carbon(far.x, far.y, 0)), Err(AtomError::OutOfGrid(far)));
        assert_eq!(world.atom_count(), 0);

        let id = world.add_atom(carbon(0.0, 0.0, 1)).unwrap();
        assert_eq!(
            world.add_atom_bonded(carbon(far.x, far.y, 2), id),
            Err(AtomError::OutOfGrid(far))
        );
        assert_eq!(world.set_atom_position(id, far), Err(AtomError::OutOfGrid(far)));
        assert!(world.chunks().contains(id, Vec2::ZERO));
    }

    #[test]
    fn test_set_velocity() {
        let mut world = world();
        let id = world.add_atom(carbon(0.0, 0.0, 0)).unwrap();
        assert_eq!(world.set_atom_velocity(id, Vec2::new(3.0, -4.0)), Ok(true));
        assert_eq!(world.atom(id).unwrap().velocity, Vec2::new(3.0, -4.0));
        assert_eq!(
            world.set_atom_velocity(id, Vec2::new(0.0, f32::INFINITY)),
            Err(AtomError::NonFinite("velocity"))
        );
        assert_eq!(world.set_atom_velocity(AtomId(42), Vec2::ZERO), Ok(false));
    }

    #[test]
    fn test_step_rejects_bad_timestep() {
        let mut world = world();
        assert!(matches!(world.step(-0.1), Err(StepError::InvalidTimestep(_))));
        assert!(matches!(world.step(f32::INFINITY), Err(StepError::InvalidTimestep(_))));
        assert_eq!(world.step_count(), 0);
        assert_eq!(world.step(0.0).unwrap().step, 1);
    }

    #[test]
    fn test_stretched_bond_breaks_with_event() {
        let mut world = world();
        let a = world.add_atom(carbon(0.0, 0.0, 0)).unwrap();
        let b = world.add_atom(carbon(150.0, 0.0, 1)).unwrap();
        assert!(world.add_bond(a, b));
        world.set_atom_position(b, Vec2::new(260.0, 0.0)).unwrap();

        let report = world.step(1.0 / 60.0).unwrap();
        assert_eq!(report.bonds_broken, 1);
        assert!(!world.is_bonded(a, b));
        assert_eq!(world.drain_events(), vec![WorldEvent::BondBroken { a, b }]);
    }
}
