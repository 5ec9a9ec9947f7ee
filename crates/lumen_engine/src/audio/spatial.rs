//! Listener pose and distance attenuation

use crate::foundation::math::Vec3;

/// Configuration for positional sounds
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialConfig {
    /// Sounds farther than this from the listener are silent
    pub max_distance: f32,
    /// Distance within which sounds play at full volume
    pub reference_distance: f32,
    /// Falloff exponent (1.0 = linear, 2.0 = quadratic)
    pub falloff_exponent: f32,
    /// Distance between the listener's ears
    pub ear_distance: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            reference_distance: 2.0,
            falloff_exponent: 1.0,
            ear_distance: 0.2,
        }
    }
}

/// Where the listener is and which way it faces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerPose {
    /// Listener position
    pub position: Vec3,
    /// Facing direction
    pub forward: Vec3,
    /// Up direction
    pub up: Vec3,
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            forward: -Vec3::z(),
            up: Vec3::y(),
        }
    }
}

impl ListenerPose {
    /// Unit vector pointing out of the right ear
    pub fn right(&self) -> Vec3 {
        self.forward
            .cross(&self.up)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::x)
    }

    /// Left and right ear positions
    pub fn ear_positions(&self, ear_distance: f32) -> ([f32; 3], [f32; 3]) {
        let offset = self.right() * (ear_distance * 0.5);
        let left = self.position - offset;
        let right = self.position + offset;
        ([left.x, left.y, left.z], [right.x, right.y, right.z])
    }
}

impl SpatialConfig {
    /// Volume factor in `0.0..=1.0` for a sound at `source`
    pub fn attenuation(&self, listener: &ListenerPose, source: Vec3) -> f32 {
        let distance = (source - listener.position).norm();
        if distance > self.max_distance {
            return 0.0;
        }
        if distance <= self.reference_distance {
            return 1.0;
        }
        let normalized = (distance - self.reference_distance) / (self.max_distance - self.reference_distance);
        (1.0 - normalized.powf(self.falloff_exponent)).max(0.0)
    }

    /// Whether a sound at `source` is close enough to play at all
    pub fn is_audible(&self, listener: &ListenerPose, source: Vec3) -> bool {
        (source - listener.position).norm() <= self.max_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_attenuation_curve() {
        let config = SpatialConfig {
            max_distance: 12.0,
            reference_distance: 2.0,
            falloff_exponent: 1.0,
            ear_distance: 0.2,
        };
        let listener = ListenerPose::default();
        assert_relative_eq!(config.attenuation(&listener, Vec3::new(1.0, 0.0, 0.0)), 1.0);
        assert_relative_eq!(config.attenuation(&listener, Vec3::new(7.0, 0.0, 0.0)), 0.5);
        assert_relative_eq!(config.attenuation(&listener, Vec3::new(20.0, 0.0, 0.0)), 0.0);
        assert!(!config.is_audible(&listener, Vec3::new(0.0, 0.0, 13.0)));
    }

    #[test]
    fn test_ears_follow_orientation() {
        let listener = ListenerPose {
            position: Vec3::new(0.0, 1.0, 0.0),
            forward: Vec3::x(),
            up: Vec3::y(),
        };
        let (left, right) = listener.ear_positions(2.0);
        assert_relative_eq!(left[2], -1.0);
        assert_relative_eq!(right[2], 1.0);
        assert_relative_eq!(left[1], 1.0);
    }

    #[test]
    fn test_degenerate_orientation_falls_back_to_x() {
        let listener = ListenerPose {
            position: Vec3::zeros(),
            forward: Vec3::y(),
            up: Vec3::y(),
        };
        assert_relative_eq!(listener.right(), Vec3::x());
    }
}
