//! Rigid-body simulation
//!
//! The frame loop calls [`PhysicsProvider::update_physics`] with the elapsed frame
//! time. Providers advance at a fixed rate, taking at most a configured number of
//! sub-steps per frame.

#[cfg(feature = "physics")]
pub mod rapier;

use thiserror::Error;

use crate::foundation::math::{Transform, Vec3};

#[cfg(feature = "physics")]
pub use rapier::RapierPhysicsProvider;

/// Default gravity, in metres per second squared
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -12.0, 0.0];

/// Fixed simulation step in seconds
pub const FIXED_TIME_STEP: f64 = 1.0 / 60.0;

slotmap::new_key_type! {
    /// A rigid body owned by a [`PhysicsProvider`]
    pub struct BodyId;
}

/// Physics errors
#[derive(Error, Debug, PartialEq)]
pub enum PhysicsError {
    /// A collider dimension was not positive
    #[error("Invalid collider shape: {0}")]
    InvalidShape(String),

    /// The provider was stopped
    #[error("Physics provider is stopped")]
    Stopped,
}

/// How a body responds to forces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// Moved by the simulation
    #[default]
    Dynamic,
    /// Never moves
    Fixed,
    /// Moved by the caller, pushes dynamic bodies
    Kinematic,
}

/// Collision shape attached to a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    /// Box with the given half extents
    Cuboid {
        /// Half size along each axis
        half_extents: Vec3,
    },
    /// Sphere
    Ball {
        /// Radius
        radius: f32,
    },
    /// Y-aligned capsule
    Capsule {
        /// Half height of the cylindrical part
        half_height: f32,
        /// Radius
        radius: f32,
    },
}

impl ColliderShape {
    /// Check that every dimension is positive and finite
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        let valid = match self {
            Self::Cuboid { half_extents } => half_extents.iter().all(|&v| positive(v)),
            Self::Ball { radius } => positive(*radius),
            Self::Capsule { half_height, radius } => positive(*half_height) && positive(*radius),
        };
        if valid {
            Ok(())
        } else {
            Err(PhysicsError::InvalidShape(format!("{self:?}")))
        }
    }
}

/// Everything needed to add a body
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyDesc {
    /// Dynamic, fixed or kinematic
    pub kind: BodyKind,
    /// Collision shape
    pub shape: ColliderShape,
    /// Initial pose; scale is ignored
    pub transform: Transform,
    /// Collider density
    pub density: f32,
    /// Bounciness in `0.0..=1.0`
    pub restitution: f32,
    /// Friction coefficient
    pub friction: f32,
}

impl RigidBodyDesc {
    /// Body of `kind` with `shape` at the origin
    pub fn new(kind: BodyKind, shape: ColliderShape) -> Self {
        Self {
            kind,
            shape,
            transform: Transform::identity(),
            density: 1.0,
            restitution: 0.0,
            friction: 0.5,
        }
    }

    /// Place the body at `position`
    #[must_use]
    pub fn at(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }
}

/// A rigid-body world stepped by the frame loop
pub trait PhysicsProvider {
    /// Advance by `delta` seconds; returns the number of fixed steps taken
    fn update_physics(&mut self, delta: f64) -> u32;

    /// Remove and free every body and collider
    fn stop(&mut self);

    /// Add a body with one collider
    fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> Result<BodyId, PhysicsError>;

    /// Remove a body and its collider; false if it was not present
    fn remove_rigid_body(&mut self, id: BodyId) -> bool;

    /// Current pose of a body
    fn body_transform(&self, id: BodyId) -> Option<Transform>;

    /// Replace the gravity vector
    fn set_gravity(&mut self, gravity: Vec3);

    /// Number of live bodies
    fn body_count(&self) -> usize;
}

/// Fixed-step accumulator
///
/// Steps beyond `max_steps` in one frame are dropped rather than carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAccumulator {
    accumulated: f64,
    step: f64,
    max_steps: u32,
}

impl StepAccumulator {
    /// Accumulator for `step`-second steps, at most `max_steps` per frame
    pub fn new(step: f64, max_steps: u32) -> Self {
        Self {
            accumulated: 0.0,
            step,
            max_steps: max_steps.max(1),
        }
    }

    /// Add `delta` seconds and return how many steps to run now
    pub fn advance(&mut self, delta: f64) -> u32 {
        self.accumulated += delta.max(0.0);
        let mut steps = 0;
        while self.accumulated >= self.step && steps < self.max_steps {
            self.accumulated -= self.step;
            steps += 1;
        }
        if steps == self.max_steps {
            self.accumulated = self.accumulated.min(self.step);
        }
        steps
    }

    /// Maximum steps per frame
    pub const fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Time carried into the next frame
    pub const fn remainder(&self) -> f64 {
        self.accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_follow_elapsed_time() {
        let mut accumulator = StepAccumulator::new(0.25, 4);
        assert_eq!(accumulator.advance(0.1), 0);
        assert_eq!(accumulator.advance(0.2), 1);
        assert!((accumulator.remainder() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_steps_are_capped_per_frame() {
        let mut accumulator = StepAccumulator::new(0.25, 4);
        assert_eq!(accumulator.advance(10.0), 4);
        assert!(accumulator.remainder() <= 0.25);
        assert_eq!(accumulator.advance(0.0), 1);
    }

    #[test]
    fn test_negative_delta_is_ignored() {
        let mut accumulator = StepAccumulator::new(0.25, 4);
        assert_eq!(accumulator.advance(-1.0), 0);
        assert_eq!(accumulator.remainder(), 0.0);
    }

    #[test]
    fn test_shape_validation() {
        assert!(ColliderShape::Ball { radius: 1.0 }.validate().is_ok());
        assert!(ColliderShape::Ball { radius: 0.0 }.validate().is_err());
        assert!(ColliderShape::Cuboid {
            half_extents: Vec3::new(1.0, -1.0, 1.0)
        }
        .validate()
        .is_err());
    }
}
