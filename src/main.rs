//! Headless bonded-atom demo
//!
//! Builds a bonded triangle and a few loose molecules, steps them at 60 Hz and logs
//! what happens. Pass `--gpu` to run the compute backend (falls back to the CPU
//! when no adapter is available).

use std::error::Error;

use atom_physics::{Atom, AtomHandle, AtomId};
use atom_simulation::{
    AtomWorld, CpuBackend, ForceBackend, GpuBackend, SimulationConfig, WorldEvent,
};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DT: f32 = 1.0 / 60.0;
const STEPS: u64 = 600;
const LOG_EVERY: u64 = 60;
const MOLECULE_COUNT: usize = 40;
const SPAWN_RADIUS: f32 = 1200.0;

/// Three mutually bonded atoms near their equilibrium spacing
fn spawn_triangle<B: ForceBackend>(
    world: &mut AtomWorld<B>,
) -> Result<[AtomId; 3], Box<dyn Error>> {
    let a = world.add_atom(Atom::carbon(Vec2::new(350.0, 200.0), AtomHandle(0)))?;
    let b = world.add_atom(Atom::carbon(Vec2::new(470.0, 200.0), AtomHandle(1)))?;
    let c = world.add_atom(Atom::carbon(Vec2::new(410.0, 270.0), AtomHandle(2)))?;
    for (x, y) in [(a, b), (b, c), (a, c)] {
        if !world.add_bond(x, y) {
            log::warn!("triangle bond {:?} - {:?} rejected", x, y);
        }
    }
    Ok([a, b, c])
}

/// Short chains scattered around the triangle, each grown with `add_atom_bonded`
fn spawn_molecules<B: ForceBackend>(
    world: &mut AtomWorld<B>,
    seed: u64,
) -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut handle = 3;

    for _ in 0..MOLECULE_COUNT {
        let center = Vec2::new(
            rng.random_range(-SPAWN_RADIUS..SPAWN_RADIUS),
            rng.random_range(-SPAWN_RADIUS..SPAWN_RADIUS),
        );
        let velocity = Vec2::new(rng.random_range(-20.0..20.0), rng.random_range(-20.0..20.0));
        let first = Atom::carbon(center, AtomHandle(handle)).with_velocity(velocity);
        let mut previous = world.add_atom(first)?;
        handle += 1;

        let length = rng.random_range(1..4);
        let mut position = center;
        for _ in 0..length {
            let angle = rng.random::<f32>() * std::f32::consts::TAU;
            position += Vec2::from_angle(angle) * rng.random_range(90.0..130.0);
            let atom = Atom::carbon(position, AtomHandle(handle)).with_velocity(velocity);
            handle += 1;
            match world.add_atom_bonded(atom, previous)? {
                Some(id) => previous = id,
                None => break,
            }
        }
    }
    Ok(())
}

fn run<B: ForceBackend>(mut world: AtomWorld<B>) -> Result<(), Box<dyn Error>> {
    let triangle = spawn_triangle(&mut world)?;
    let seed = world.config().seed;
    spawn_molecules(&mut world, seed)?;
    log::info!(
        "Spawned {} atoms with {} bonds in {} chunks",
        world.atom_count(),
        world.bond_count(),
        world.chunks().len()
    );

    let mut broken = 0;
    for _ in 0..STEPS {
        let report = world.step(DT)?;
        broken += report.bonds_broken;

        for event in world.drain_events() {
            match event {
                WorldEvent::BondBroken { a, b } => log::debug!("bond {:?} - {:?} broke", a, b),
                WorldEvent::AtomRemoved { id, handle } => {
                    log::debug!("{:?} removed (handle {:?})", id, handle)
                }
            }
        }

        if report.step % LOG_EVERY == 0 {
            log::info!(
                "step {}: {} atoms, {} bonds, {} relocated, momentum ({:.3}, {:.3})",
                report.step,
                world.atom_count(),
                world.bond_count(),
                report.relocated,
                world.total_momentum().x,
                world.total_momentum().y
            );
        }
    }

    let intact = world.is_bonded(triangle[0], triangle[1])
        && world.is_bonded(triangle[1], triangle[2])
        && world.is_bonded(triangle[0], triangle[2]);
    log::info!("Done: {} bonds broken, triangle intact: {}", broken, intact);
    for id in triangle {
        if let Some(atom) = world.atom(id) {
            log::info!("  {:?} at ({:.2}, {:.2})", id, atom.position.x, atom.position.y);
        }
    }
    Ok(())
}

fn main() {
    // Initialize logger (RUST_LOG=debug for per-step output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let use_gpu = std::env::args().any(|arg| arg == "--gpu");
    let config = SimulationConfig::default();

    let backend: Box<dyn ForceBackend> = if use_gpu {
        match GpuBackend::new() {
            Ok(backend) => Box::new(backend),
            Err(err) => {
                log::warn!("GPU backend unavailable ({}), falling back to CPU", err);
                Box::new(CpuBackend::new(config.seed))
            }
        }
    } else {
        Box::new(CpuBackend::new(config.seed))
    };

    let result = AtomWorld::with_backend(config, backend)
        .map_err(Into::into)
        .and_then(run);

    if let Err(err) = result {
        log::error!("Simulation failed: {}", err);
        std::process::exit(1);
    }
}
