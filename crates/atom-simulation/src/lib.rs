//! # Atom Simulation Engine
//!
//! Fixed-timestep engine for bonded atoms. Force evaluation and integration run on a
//! pluggable backend: a serial CPU pass or a wgpu compute kernel. Chunk reassignment
//! and bond breaking always run on the CPU after the backend.

pub mod arena;
pub mod backend;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod packing;
pub mod params;
pub mod world;

pub use arena::*;
pub use backend::*;
pub use cpu::*;
pub use error::*;
pub use gpu::*;
pub use packing::*;
pub use params::*;
pub use world::*;
