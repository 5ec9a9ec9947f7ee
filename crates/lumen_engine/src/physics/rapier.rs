//! `rapier3d` physics provider

use rapier3d::prelude::*;
use slotmap::SlotMap;

use super::{
    BodyId, BodyKind, ColliderShape, PhysicsError, PhysicsProvider, RigidBodyDesc, StepAccumulator,
    DEFAULT_GRAVITY, FIXED_TIME_STEP,
};
use crate::foundation::math::{Quat, Transform, Vec3};

/// Physics world backed by rapier
pub struct RapierPhysicsProvider {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    bodies: SlotMap<BodyId, RigidBodyHandle>,
    accumulator: StepAccumulator,
    stopped: bool,
}

impl RapierPhysicsProvider {
    /// World with default gravity taking at most `sub_steps` fixed steps per frame
    pub fn new(sub_steps: u32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let dt = FIXED_TIME_STEP as Real;
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = dt;
        let [x, y, z] = DEFAULT_GRAVITY;

        Self {
            gravity: vector![x, y, z],
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            bodies: SlotMap::with_key(),
            accumulator: StepAccumulator::new(FIXED_TIME_STEP, sub_steps),
            stopped: false,
        }
    }

    /// Current gravity
    pub fn gravity(&self) -> Vec3 {
        Vec3::new(self.gravity.x, self.gravity.y, self.gravity.z)
    }

    /// Maximum fixed steps per frame
    pub const fn sub_steps(&self) -> u32 {
        self.accumulator.max_steps()
    }

    fn step(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }
}

fn build_collider(desc: &RigidBodyDesc) -> Collider {
    let builder = match desc.shape {
        ColliderShape::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        ColliderShape::Ball { radius } => ColliderBuilder::ball(radius),
        ColliderShape::Capsule { half_height, radius } => ColliderBuilder::capsule_y(half_height, radius),
    };
    builder
        .density(desc.density)
        .restitution(desc.restitution)
        .friction(desc.friction)
        .build()
}

fn build_body(desc: &RigidBodyDesc) -> RigidBody {
    let builder = match desc.kind {
        BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
        BodyKind::Fixed => RigidBodyBuilder::fixed(),
        BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
    };
    let position = desc.transform.position;
    let rotation = desc.transform.rotation.scaled_axis();
    builder
        .translation(vector![position.x, position.y, position.z])
        .rotation(vector![rotation.x, rotation.y, rotation.z])
        .build()
}

impl PhysicsProvider for RapierPhysicsProvider {
    fn update_physics(&mut self, delta: f64) -> u32 {
        if self.stopped {
            return 0;
        }
        let steps = self.accumulator.advance(delta);
        for _ in 0..steps {
            self.step();
        }
        steps
    }

    fn stop(&mut self) {
        let removed = self.bodies.len();
        for (_, handle) in self.bodies.drain() {
            self.rigid_body_set.remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        self.stopped = true;
        log::debug!("Physics stopped, {removed} bodies removed");
    }

    fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> Result<BodyId, PhysicsError> {
        if self.stopped {
            return Err(PhysicsError::Stopped);
        }
        desc.shape.validate()?;
        let handle = self.rigid_body_set.insert(build_body(desc));
        self.collider_set
            .insert_with_parent(build_collider(desc), handle, &mut self.rigid_body_set);
        Ok(self.bodies.insert(handle))
    }

    fn remove_rigid_body(&mut self, id: BodyId) -> bool {
        let Some(handle) = self.bodies.remove(id) else {
            return false;
        };
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        true
    }

    fn body_transform(&self, id: BodyId) -> Option<Transform> {
        let body = self.rigid_body_set.get(*self.bodies.get(id)?)?;
        let t = body.translation();
        let r = body.rotation();
        Some(Transform::from_position_rotation(
            Vec3::new(t.x, t.y, t.z),
            Quat::from_quaternion(nalgebra::Quaternion::new(r.w, r.i, r.j, r.k)),
        ))
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = vector![gravity.x, gravity.y, gravity.z];
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(height: f32) -> RigidBodyDesc {
        RigidBodyDesc::new(BodyKind::Dynamic, ColliderShape::Ball { radius: 0.5 }).at(Vec3::new(0.0, height, 0.0))
    }

    #[test]
    fn test_default_gravity() {
        let physics = RapierPhysicsProvider::new(4);
        assert_eq!(physics.gravity(), Vec3::new(0.0, -12.0, 0.0));
        assert_eq!(physics.sub_steps(), 4);
    }

    #[test]
    fn test_dynamic_body_falls() {
        let mut physics = RapierPhysicsProvider::new(4);
        let ball = physics.add_rigid_body(&ball_at(10.0)).unwrap();

        let steps = physics.update_physics(0.04);
        assert_eq!(steps, 2);
        let y = physics.body_transform(ball).unwrap().position.y;
        assert!(y < 10.0);
    }

    #[test]
    fn test_frame_steps_are_capped() {
        let mut physics = RapierPhysicsProvider::new(2);
        assert_eq!(physics.update_physics(1.0), 2);
    }

    #[test]
    fn test_fixed_body_stays_put() {
        let mut physics = RapierPhysicsProvider::new(4);
        let ground = physics
            .add_rigid_body(&RigidBodyDesc::new(
                BodyKind::Fixed,
                ColliderShape::Cuboid {
                    half_extents: Vec3::new(10.0, 0.5, 10.0),
                },
            ))
            .unwrap();
        physics.update_physics(0.1);
        assert_eq!(physics.body_transform(ground).unwrap().position, Vec3::zeros());
    }

    #[test]
    fn test_remove_and_stop_free_bodies() {
        let mut physics = RapierPhysicsProvider::new(4);
        let first = physics.add_rigid_body(&ball_at(1.0)).unwrap();
        physics.add_rigid_body(&ball_at(2.0)).unwrap();

        assert!(physics.remove_rigid_body(first));
        assert!(!physics.remove_rigid_body(first));
        assert_eq!(physics.body_count(), 1);

        physics.stop();
        assert_eq!(physics.body_count(), 0);
        assert_eq!(physics.collider_set.len(), 0);
        assert_eq!(physics.add_rigid_body(&ball_at(1.0)), Err(PhysicsError::Stopped));
    }

    #[test]
    fn test_invalid_shape_is_rejected() {
        let mut physics = RapierPhysicsProvider::new(4);
        let desc = RigidBodyDesc::new(BodyKind::Dynamic, ColliderShape::Ball { radius: -1.0 });
        assert!(matches!(physics.add_rigid_body(&desc), Err(PhysicsError::InvalidShape(_))));
        assert_eq!(physics.body_count(), 0);
    }
}
