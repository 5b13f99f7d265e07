//! Physical constants for the atom simulation
//!
//! Values are in simulation units (pixels, frames) rather than SI units.

/// Coulomb-like constant for the inverse-square repulsion (k in k·q₁·q₂/r²)
pub const REPULSION_K: f32 = 1000.0;

/// Damping applied to the relative velocity along a bond
pub const BOND_DAMPING: f32 = 0.5;

/// Fraction of approach velocity returned on collision
pub const RESTITUTION: f32 = 0.8;

/// Per-step velocity multiplier applied during integration
pub const ATOM_DAMPING: f32 = 0.95;

/// Stretch ratio (r / r_e) past which the linear extension penalty kicks in
pub const EXTENSION_THRESHOLD: f32 = 1.5;

/// Default edge length of a square chunk
pub const CHUNK_SIZE: f32 = 100.0;

/// Default multiplier on the mean bond length beyond which bonds break
pub const BREAK_BOND_DISTANCE: f32 = 2.0;

// Carbon-like defaults used by `Atom::carbon`

/// Morse well depth
pub const CARBON_D_E: f32 = 50.0;

/// Morse stiffness
pub const CARBON_A: f32 = 0.05;

/// Equilibrium bond length
pub const CARBON_R_E: f32 = 100.0;

/// Linear stiffening applied to over-stretched bonds
pub const CARBON_EXTENDED_MODIFIER: f32 = 0.1;

pub const CARBON_MASS: f32 = 1.0;
pub const CARBON_CHARGE: f32 = 1.0;
pub const CARBON_RADIUS: f32 = 20.0;
pub const CARBON_MAX_CONNECTIONS: u32 = 4;
