//! # Atom Physics
//!
//! Core physics for a 2D bonded-atom simulation: atoms as point masses joined by
//! breakable Morse-like bonds, short-range charge repulsion and collision
//! resolution, plus the spatial chunk grid and bond graph the engine is built on.

pub mod atom;
pub mod bonds;
pub mod chunk;
pub mod constants;
pub mod forces;

pub use atom::*;
pub use bonds::*;
pub use chunk::*;
pub use constants::*;
pub use forces::*;
