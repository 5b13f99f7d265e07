//! Pairwise force model
//!
//! Forces are applied as instantaneous, mass-scaled velocity kicks (semi-implicit Euler):
//! velocities change first, positions then integrate from the updated velocities.
//! Every pairwise function is equal and opposite, so momentum is conserved per pair.
//!
//! The pure functions (`bond_impulse`, `repulsion_force`, `contact`, `bounce_impulse`) are
//! shared by the serial CPU backend and the host mirror of the GPU kernel.

use glam::Vec2;
use rand::Rng;

use crate::atom::Atom;
use crate::constants::*;

/// Tunable constants of the force model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceConstants {
    pub repulsion_k: f32,
    pub bond_damping: f32,
    pub restitution: f32,
    pub atom_damping: f32,
    pub extension_threshold: f32,
}

impl Default for ForceConstants {
    fn default() -> Self {
        Self {
            repulsion_k: REPULSION_K,
            bond_damping: BOND_DAMPING,
            restitution: RESTITUTION,
            atom_damping: ATOM_DAMPING,
            extension_threshold: EXTENSION_THRESHOLD,
        }
    }
}

/// Impulse carried by the bond between `a` and `b`, directed from `a` towards `b`.
///
/// `a` receives `+impulse / a.mass`, `b` receives `-impulse / b.mass`.
/// The Morse curve uses `a`'s bond parameters only (the first operand wins);
/// callers pass the lower id first so the choice is stable.
///
/// Morse derivative: F = 2·a·Dₑ·(1 − e^(−a(r−rₑ)))·e^(−a(r−rₑ))
pub fn bond_impulse(a: &Atom, b: &Atom, constants: &ForceConstants) -> Vec2 {
    let r_vec = b.position - a.position;
    let r = r_vec.length();
    if r == 0.0 {
        return Vec2::ZERO;
    }
    let direction = r_vec / r;

    let params = &a.bond;
    let exp_term = (-params.a * (r - params.r_e)).exp();
    let mut magnitude = 2.0 * params.a * params.d_e * (1.0 - exp_term) * exp_term;

    if r > params.r_e * constants.extension_threshold {
        magnitude += (r - params.r_e) * (a.bond.extended_modifier + b.bond.extended_modifier) * 0.5;
    }

    let force = direction * magnitude;

    let relative_velocity = b.velocity - a.velocity;
    let damping = direction * relative_velocity.dot(direction) * constants.bond_damping;

    damping + force
}

pub fn apply_bond_force(a: &mut Atom, b: &mut Atom, constants: &ForceConstants) {
    let impulse = bond_impulse(a, b, constants);
    a.velocity += impulse / a.mass;
    b.velocity -= impulse / b.mass;
}

/// Inverse-square repulsion acting on `b`, directed from `a` towards `b`.
///
/// F = k·q₁·q₂/r². Only positive magnitudes are applied, so opposite charges
/// do not attract. Coincident atoms get no force.
pub fn repulsion_force(a: &Atom, b: &Atom, k: f32) -> Vec2 {
    let r_vec = b.position - a.position;
    let r = r_vec.length();
    if r == 0.0 {
        return Vec2::ZERO;
    }
    let magnitude = k * a.charge * b.charge / (r * r);
    if !(magnitude > 0.0) {
        return Vec2::ZERO;
    }
    r_vec / r * magnitude
}

pub fn apply_repulsion(a: &mut Atom, b: &mut Atom, k: f32) {
    let force = repulsion_force(a, b, k);
    b.velocity += force / b.mass;
    a.velocity -= force / a.mass;
}

/// Overlap between two atoms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit vector from the first atom towards the second
    pub normal: Vec2,
    /// Penetration depth (radius sum minus distance)
    pub overlap: f32,
}

/// Detect an overlap. `fallback` supplies the normal when the atoms coincide exactly.
pub fn contact(a: &Atom, b: &Atom, fallback: impl FnOnce() -> Vec2) -> Option<Contact> {
    let delta = b.position - a.position;
    let distance = delta.length();
    let min_distance = a.radius + b.radius;
    if !(distance < min_distance) {
        return None;
    }

    let normal = if distance == 0.0 {
        fallback()
    } else {
        delta / distance
    };

    Some(Contact {
        normal,
        overlap: min_distance - distance,
    })
}

/// Velocity kick for the second atom of a contact (the first gets the negation).
///
/// `None` when the atoms are already separating along the normal.
pub fn bounce_impulse(relative_velocity: Vec2, normal: Vec2, restitution: f32) -> Option<Vec2> {
    let along_normal = relative_velocity.dot(normal);
    if along_normal > 0.0 {
        return None;
    }
    let impulse = -(1.0 + restitution) * along_normal / 2.0;
    Some(normal * impulse)
}

/// Push overlapping atoms apart by half the overlap each and bounce them if approaching.
///
/// Returns whether the atoms were in contact.
pub fn resolve_collision(
    a: &mut Atom,
    b: &mut Atom,
    restitution: f32,
    fallback: impl FnOnce() -> Vec2,
) -> bool {
    let Some(contact) = contact(a, b, fallback) else {
        return false;
    };

    let correction = contact.normal * contact.overlap * 0.5;
    a.position -= correction;
    b.position += correction;

    if let Some(kick) = bounce_impulse(b.velocity - a.velocity, contact.normal, restitution) {
        a.velocity -= kick;
        b.velocity += kick;
    }
    true
}

/// Advance position from velocity, then damp the velocity once.
pub fn integrate(atom: &mut Atom, dt: f32, damping: f32) {
    atom.position += atom.velocity * dt;
    atom.velocity *= damping;
}

/// Uniformly random unit vector, used to separate coincident atoms.
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    Vec2::from_angle(rng.random::<f32>() * std::f32::consts::TAU)
}
