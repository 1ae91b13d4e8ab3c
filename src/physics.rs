use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use rapier3d::geometry::{CollisionEvent, CollisionEventFlags};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::pipeline::{ActiveEvents, ActiveHooks, ContactModificationContext, EventHandler, PhysicsHooks};
use rapier3d::prelude::{
    CCDSolver, Collider, ColliderBuilder, ColliderHandle, ColliderSet, ContactPair, DefaultBroadPhase,
    ImpulseJointSet, IntegrationParameters, IslandManager, Isometry, MultibodyJointSet, NarrowPhase,
    PhysicsPipeline, Point, QueryPipeline, Real, RigidBody, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
    Translation, Vector,
};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsParams {
    pub gravity: Vec3,
    /// Largest single integration step; a frame delta is split into equal sub-steps no larger than this.
    pub max_substep: f32,
    pub default_friction: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self { gravity: Vec3::new(0.0, -9.82, 0.0), max_substep: 1.0 / 60.0, default_friction: 0.3 }
    }
}

/// Material tag stored in each collider's `user_data`; the friction table is keyed by pairs of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicsMaterial(pub u32);

impl PhysicsMaterial {
    pub const DEFAULT: PhysicsMaterial = PhysicsMaterial(0);
    pub const GROUND: PhysicsMaterial = PhysicsMaterial(1);
    pub const WALL: PhysicsMaterial = PhysicsMaterial(2);
    /// Shared by every character proxy so the friction table holds one entry per world.
    pub const CHARACTER: PhysicsMaterial = PhysicsMaterial(3);

    fn of(collider: &Collider) -> Self {
        PhysicsMaterial(collider.user_data as u32)
    }
}

/// Per-pair-of-materials friction overrides, applied to solver contacts through a physics hook.
#[derive(Default, Debug, Clone)]
pub struct FrictionTable {
    pairs: HashMap<(PhysicsMaterial, PhysicsMaterial), f32>,
}

impl FrictionTable {
    fn key(a: PhysicsMaterial, b: PhysicsMaterial) -> (PhysicsMaterial, PhysicsMaterial) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn insert(&mut self, a: PhysicsMaterial, b: PhysicsMaterial, friction: f32) {
        self.pairs.insert(Self::key(a, b), friction);
    }

    pub fn get(&self, a: PhysicsMaterial, b: PhysicsMaterial) -> Option<f32> {
        self.pairs.get(&Self::key(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

impl PhysicsHooks for FrictionTable {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let (Some(c1), Some(c2)) = (context.colliders.get(context.collider1), context.colliders.get(context.collider2))
        else {
            return;
        };
        if let Some(friction) = self.get(PhysicsMaterial::of(c1), PhysicsMaterial::of(c2)) {
            for contact in context.solver_contacts.iter_mut() {
                contact.friction = friction;
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProxyShape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
    Cylinder { half_height: f32, radius: f32 },
    ConvexHull { points: Vec<Vec3> },
    /// Infinite half-space with the given outward normal; only meaningful on fixed bodies.
    Plane { normal: Vec3 },
}

impl ProxyShape {
    fn collider_builder(&self) -> Result<ColliderBuilder, PhysicsError> {
        match self {
            ProxyShape::Cuboid { half_extents } => {
                let h = half_extents.max(Vec3::splat(MIN_HALF_EXTENT));
                Ok(ColliderBuilder::cuboid(h.x, h.y, h.z))
            }
            ProxyShape::Ball { radius } => Ok(ColliderBuilder::ball(radius.max(MIN_HALF_EXTENT))),
            ProxyShape::Cylinder { half_height, radius } => {
                Ok(ColliderBuilder::cylinder(half_height.max(MIN_HALF_EXTENT), radius.max(MIN_HALF_EXTENT)))
            }
            ProxyShape::ConvexHull { points } => {
                let converted: Vec<Point<Real>> = points.iter().map(|p| Point::new(p.x, p.y, p.z)).collect();
                ColliderBuilder::convex_hull(&converted).ok_or(PhysicsError::DegenerateHull(points.len()))
            }
            ProxyShape::Plane { normal } => {
                let normal = normal.try_normalize().ok_or(PhysicsError::InvalidPlaneNormal)?;
                Ok(ColliderBuilder::halfspace(rapier3d::na::Unit::new_normalize(vec_to_rapier(normal))))
            }
        }
    }

    /// Half of the vertical extent of the proxy, used to rest a proxy on a surface.
    pub fn half_height(&self) -> f32 {
        match self {
            ProxyShape::Cuboid { half_extents } => half_extents.y,
            ProxyShape::Ball { radius } => *radius,
            ProxyShape::Cylinder { half_height, .. } => *half_height,
            ProxyShape::ConvexHull { points } => {
                let (min, max) = points
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
                if min.is_finite() && max.is_finite() {
                    (max - min) * 0.5
                } else {
                    0.0
                }
            }
            ProxyShape::Plane { .. } => 0.0,
        }
    }
}

const MIN_HALF_EXTENT: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Fixed,
}

#[derive(Clone, Debug)]
pub struct BodyDef {
    pub shape: ProxyShape,
    pub kind: BodyKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub mass: Option<f32>,
    pub friction: Option<f32>,
    pub material: PhysicsMaterial,
    pub lock_rotations: bool,
}

impl BodyDef {
    pub fn dynamic(shape: ProxyShape, position: Vec3) -> Self {
        Self {
            shape,
            kind: BodyKind::Dynamic,
            position,
            rotation: Quat::IDENTITY,
            mass: None,
            friction: None,
            material: PhysicsMaterial::DEFAULT,
            lock_rotations: false,
        }
    }

    pub fn fixed(shape: ProxyShape, position: Vec3) -> Self {
        Self { kind: BodyKind::Fixed, ..Self::dynamic(shape, position) }
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn with_locked_rotations(mut self) -> Self {
        self.lock_rotations = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandles {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PhysicsError {
    #[error("convex hull of {0} points is degenerate")]
    DegenerateHull(usize),
    #[error("plane proxy needs a non-zero normal")]
    InvalidPlaneNormal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactPhase {
    Started,
    Stopped,
}

struct CollisionEventCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl CollisionEventCollector {
    fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    fn drain(&self) -> Vec<CollisionEvent> {
        if let Ok(mut events) = self.events.lock() {
            std::mem::take(&mut *events)
        } else {
            Vec::new()
        }
    }
}

impl EventHandler for CollisionEventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// The rigid-body half of a world pair.
#[derive(Resource)]
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    params: PhysicsParams,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    friction: FrictionTable,
    event_collector: CollisionEventCollector,
    simulated_time: f64,
    steps_taken: u64,
}

impl PhysicsWorld {
    pub fn new(params: PhysicsParams) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            params,
            gravity: vec_to_rapier(params.gravity),
            integration_parameters: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            friction: FrictionTable::default(),
            event_collector: CollisionEventCollector::new(),
            simulated_time: 0.0,
            steps_taken: 0,
        }
    }

    pub fn params(&self) -> PhysicsParams {
        self.params
    }

    pub fn gravity(&self) -> Vec3 {
        vec_from_rapier(&self.gravity)
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.params.gravity = gravity;
        self.gravity = vec_to_rapier(gravity);
    }

    pub fn set_pair_friction(&mut self, a: PhysicsMaterial, b: PhysicsMaterial, friction: f32) {
        debug!(target: "physics", a = a.0, b = b.0, friction, "contact material registered");
        self.friction.insert(a, b, friction);
    }

    pub fn friction_table(&self) -> &FrictionTable {
        &self.friction
    }

    pub fn spawn_body(&mut self, def: &BodyDef) -> Result<BodyHandles, PhysicsError> {
        let collider = def
            .shape
            .collider_builder()?
            .friction(def.friction.unwrap_or(self.params.default_friction))
            .user_data(def.material.0 as u128)
            .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .active_events(ActiveEvents::COLLISION_EVENTS);
        let collider = match def.mass {
            Some(mass) if mass > 0.0 && def.kind == BodyKind::Dynamic => collider.mass(mass),
            _ => collider,
        };
        let builder = match def.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
        };
        let mut builder = builder.position(isometry(def.position, def.rotation));
        if def.lock_rotations {
            builder = builder.lock_rotations();
        }
        let body_handle = self.bodies.insert(builder.build());
        let collider_handle = self.colliders.insert_with_parent(collider.build(), body_handle, &mut self.bodies);
        trace!(target: "physics", ?body_handle, kind = ?def.kind, position = ?def.position, "body spawned");
        Ok(BodyHandles { body: body_handle, collider: collider_handle })
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    /// Drops every body and collider, keeping gravity and the friction table.
    pub fn clear(&mut self) {
        let handles: Vec<RigidBodyHandle> = self.bodies.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            self.remove_body(handle);
        }
        self.event_collector.drain();
    }

    /// Advances the simulation by `dt` seconds in equal sub-steps no larger than `max_substep`.
    /// Returns the number of sub-steps taken.
    pub fn step(&mut self, dt: f32) -> u32 {
        if !(dt > 0.0) || !dt.is_finite() {
            return 0;
        }
        let max_substep = if self.params.max_substep > 0.0 { self.params.max_substep } else { dt };
        let substeps = ((dt / max_substep) - 1e-4).ceil().max(1.0) as u32;
        let h = dt / substeps as f32;
        for _ in 0..substeps {
            self.step_once(h);
        }
        self.simulated_time += dt as f64;
        substeps
    }

    fn step_once(&mut self, h: f32) {
        self.integration_parameters.dt = h;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.friction,
            &self.event_collector,
        );
        self.query_pipeline.update(&self.colliders);
        self.steps_taken += 1;
    }

    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Body pairs with at least one active contact point, as last computed by the narrow phase.
    pub fn active_contact_pairs(&self) -> impl Iterator<Item = (RigidBodyHandle, RigidBodyHandle)> + '_ {
        self.narrow_phase.contact_pairs().filter(|pair| pair.has_any_active_contact).filter_map(move |pair| {
            let a = self.colliders.get(pair.collider1)?.parent()?;
            let b = self.colliders.get(pair.collider2)?.parent()?;
            Some((a, b))
        })
    }

    pub fn drain_contact_events(&mut self) -> Vec<(ContactPhase, RigidBodyHandle, RigidBodyHandle)> {
        let mut out = Vec::new();
        for event in self.event_collector.drain() {
            let (phase, a, b, flags) = match event {
                CollisionEvent::Started(a, b, flags) => (ContactPhase::Started, a, b, flags),
                CollisionEvent::Stopped(a, b, flags) => (ContactPhase::Stopped, a, b, flags),
            };
            if flags.contains(CollisionEventFlags::SENSOR) {
                continue;
            }
            let parent_of = |handle: ColliderHandle| self.colliders.get(handle).and_then(Collider::parent);
            if let (Some(body_a), Some(body_b)) = (parent_of(a), parent_of(b)) {
                out.push((phase, body_a, body_b));
            }
        }
        out
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn contains_body(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// World-space bounds of every collider attached to `handle`.
    pub fn body_aabb(&self, handle: RigidBodyHandle) -> Option<(Vec3, Vec3)> {
        let body = self.bodies.get(handle)?;
        let mut bounds: Option<(Vec3, Vec3)> = None;
        for collider in body.colliders().iter().filter_map(|c| self.colliders.get(*c)) {
            let aabb = collider.compute_aabb();
            let (min, max) = (point_from_rapier(&aabb.mins), point_from_rapier(&aabb.maxs));
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(min), hi.max(max)),
                None => (min, max),
            });
        }
        bounds
    }

    pub fn body_pose(&self, handle: RigidBodyHandle) -> Option<(Vec3, Quat)> {
        let body = self.bodies.get(handle)?;
        Some((vec_from_rapier(body.translation()), quat_from_rapier(body.rotation())))
    }

    pub fn set_body_pose(&mut self, handle: RigidBodyHandle, position: Vec3, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vec_to_rapier(position), true);
            body.set_rotation(quat_to_rapier(rotation), true);
        }
    }

    pub fn set_body_translation(&mut self, handle: RigidBodyHandle, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vec_to_rapier(position), true);
        }
    }

    pub fn set_body_rotation(&mut self, handle: RigidBodyHandle, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_rotation(quat_to_rapier(rotation), true);
        }
    }

    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.bodies.get(handle).map(|body| vec_from_rapier(body.linvel()))
    }

    pub fn set_linvel(&mut self, handle: RigidBodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vec_to_rapier(velocity), true);
        }
    }

    pub fn set_angvel(&mut self, handle: RigidBodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_angvel(vec_to_rapier(velocity), true);
        }
    }
}

fn isometry(position: Vec3, rotation: Quat) -> Isometry<Real> {
    Isometry::from_parts(Translation::from(vec_to_rapier(position)), quat_to_rapier(rotation))
}

pub(crate) fn vec_to_rapier(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

pub(crate) fn vec_from_rapier(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn point_from_rapier(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

pub(crate) fn quat_to_rapier(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub(crate) fn quat_from_rapier(q: &UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}
