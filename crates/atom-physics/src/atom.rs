//! Atom types and properties for the bonded-atom simulation

use glam::Vec2;
use thiserror::Error;

use crate::constants::*;

/// Stable identity assigned by the engine when an atom is added.
///
/// Ids increase monotonically and are never reused, which makes them the
/// canonical ordering key for "process each unordered pair once".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomId(pub u64);

/// Opaque caller-owned token carried alongside an atom (e.g. a render object id).
///
/// The engine never interprets it; it is only handed back on lookup and removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomHandle(pub u64);

/// Parameters of the Morse-like bond force curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondParams {
    /// Well depth
    pub d_e: f32,
    /// Stiffness (width of the well)
    pub a: f32,
    /// Equilibrium distance
    pub r_e: f32,
    /// Linear stiffening applied past `EXTENSION_THRESHOLD * r_e`
    pub extended_modifier: f32,
}

impl BondParams {
    pub const CARBON: Self = Self {
        d_e: CARBON_D_E,
        a: CARBON_A,
        r_e: CARBON_R_E,
        extended_modifier: CARBON_EXTENDED_MODIFIER,
    };
}

impl Default for BondParams {
    fn default() -> Self {
        Self::CARBON
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AtomError {
    #[error("atom mass must be positive and finite, got {0}")]
    InvalidMass(f32),

    #[error("atom radius must be non-negative and finite, got {0}")]
    InvalidRadius(f32),

    #[error("non-finite {0}")]
    NonFinite(&'static str),

    #[error("position {0} is outside the chunk grid")]
    OutOfGrid(Vec2),
}

/// A simulated atom.
///
/// Bonds are not stored here: they live in the engine's `BondGraph`, keyed by `AtomId`.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    pub charge: f32,
    pub radius: f32,
    pub bond: BondParams,
    /// Cap on simultaneous bonds. Only enforced by the engine when configured to.
    pub max_connections: u32,
    pub handle: AtomHandle,
}

impl Atom {
    /// Create an atom at rest, rejecting parameters that would poison the force model.
    pub fn new(
        position: Vec2,
        mass: f32,
        charge: f32,
        radius: f32,
        bond: BondParams,
        handle: AtomHandle,
    ) -> Result<Self, AtomError> {
        let atom = Self {
            position,
            velocity: Vec2::ZERO,
            mass,
            charge,
            radius,
            bond,
            max_connections: CARBON_MAX_CONNECTIONS,
            handle,
        };
        atom.validate()?;
        Ok(atom)
    }

    /// Create a carbon-like atom at rest
    pub fn carbon(position: Vec2, handle: AtomHandle) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            mass: CARBON_MASS,
            charge: CARBON_CHARGE,
            radius: CARBON_RADIUS,
            bond: BondParams::CARBON,
            max_connections: CARBON_MAX_CONNECTIONS,
            handle,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Check the invariants the force model divides by or compares against.
    pub fn validate(&self) -> Result<(), AtomError> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(AtomError::InvalidMass(self.mass));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(AtomError::InvalidRadius(self.radius));
        }
        if !self.position.is_finite() {
            return Err(AtomError::NonFinite("position"));
        }
        if !self.velocity.is_finite() {
            return Err(AtomError::NonFinite("velocity"));
        }
        if !self.charge.is_finite() {
            return Err(AtomError::NonFinite("charge"));
        }
        let b = &self.bond;
        if !(b.d_e.is_finite()
            && b.a.is_finite()
            && b.r_e.is_finite()
            && b.extended_modifier.is_finite())
        {
            return Err(AtomError::NonFinite("bond parameters"));
        }
        Ok(())
    }

    /// Momentum (mass × velocity)
    pub fn momentum(&self) -> Vec2 {
        self.velocity * self.mass
    }
}

/// Mean of the two equilibrium distances; the basis for bond formation and breakage.
pub fn mean_bond_length(a: &Atom, b: &Atom) -> f32 {
    (a.bond.r_e + b.bond.r_e) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carbon_is_valid() {
        let atom = Atom::carbon(Vec2::new(10.0, -4.0), AtomHandle(7));
        assert!(atom.validate().is_ok());
        assert_eq!(atom.velocity, Vec2::ZERO);
        assert_eq!(atom.handle, AtomHandle(7));
    }

    #[test]
    fn test_rejects_non_positive_mass() {
        let err = Atom::new(Vec2::ZERO, 0.0, 1.0, 1.0, BondParams::CARBON, AtomHandle(0));
        assert_eq!(err, Err(AtomError::InvalidMass(0.0)));

        let err = Atom::new(Vec2::ZERO, -2.0, 1.0, 1.0, BondParams::CARBON, AtomHandle(0));
        assert_eq!(err, Err(AtomError::InvalidMass(-2.0)));
    }

    #[test]
    fn test_rejects_bad_radius_and_position() {
        let err = Atom::new(Vec2::ZERO, 1.0, 1.0, -1.0, BondParams::CARBON, AtomHandle(0));
        assert_eq!(err, Err(AtomError::InvalidRadius(-1.0)));

        let err = Atom::new(
            Vec2::new(f32::NAN, 0.0),
            1.0,
            1.0,
            1.0,
            BondParams::CARBON,
            AtomHandle(0),
        );
        assert_eq!(err, Err(AtomError::NonFinite("position")));
    }

    #[test]
    fn test_mean_bond_length() {
        let a = Atom::carbon(Vec2::ZERO, AtomHandle(0));
        let mut b = Atom::carbon(Vec2::ZERO, AtomHandle(1));
        b.bond.r_e = 60.0;
        assert_eq!(mean_bond_length(&a, &b), 80.0);
    }
}
