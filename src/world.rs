use crate::animation::sys_advance_animation_rigs;
use crate::binding::{
    sys_transfer_body_transforms, BindingTable, BodyAuthority, BoundEntity, EntityId, EntityRow,
};
use crate::config::StageConfig;
use crate::events::{ContactParty, EventBus, SessionEvent};
use crate::model::MeshGeometry;
use crate::physics::{BodyDef, BodyHandles, ContactPhase, PhysicsMaterial, PhysicsParams, PhysicsWorld, ProxyShape};
use crate::scene::{
    despawn_recursive, spawn_node, spawn_scene_root, sys_propagate_scene_transforms, Helper, HelperKind,
    LightNode, NodeMesh, Pickable, SceneEnvironment, Transform3D, TransformPropagationScratch,
};
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::IntoSystemConfigs;
use glam::Vec3;
use rapier3d::prelude::RigidBodyHandle;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Resource, Default, Clone, Copy, Debug)]
pub struct TimeDelta(pub f32);

/// Scene furniture created at mount: ground, walls, lights, helpers.
#[derive(Clone, Debug, PartialEq)]
pub struct StageFixture {
    pub name: String,
    pub node: Entity,
    pub body: Option<RigidBodyHandle>,
    pub obstacle: bool,
}

#[derive(Resource, Default, Debug)]
pub struct StageFixtures(pub Vec<StageFixture>);

impl StageFixtures {
    pub fn by_body(&self, body: RigidBodyHandle) -> Option<&StageFixture> {
        self.0.iter().find(|fixture| fixture.body == Some(body))
    }

    pub fn by_name(&self, name: &str) -> Option<&StageFixture> {
        self.0.iter().find(|fixture| fixture.name == name)
    }

    pub fn obstacles(&self) -> Vec<RigidBodyHandle> {
        self.0.iter().filter(|fixture| fixture.obstacle).filter_map(|fixture| fixture.body).collect()
    }
}

/// Everything `WorldPair::add_entity` needs to bind an already spawned node to an already spawned body.
#[derive(Clone, Debug)]
pub struct NewEntity {
    pub node: Entity,
    pub body: BodyHandles,
    pub dimensions: Vec3,
    pub y_offset: f32,
    pub is_character: bool,
    pub has_rig: bool,
    pub file_name: String,
}

/// The scene graph and the physics world of one mounted session, created and destroyed together.
pub struct WorldPair {
    pub world: World,
    schedule: Schedule,
    propagate: Schedule,
    root: Entity,
    session_id: Uuid,
    configured: bool,
    live: bool,
}

impl WorldPair {
    pub fn new(params: PhysicsParams) -> Self {
        let mut world = World::new();
        world.insert_resource(TimeDelta(0.0));
        world.insert_resource(PhysicsWorld::new(params));
        world.insert_resource(BindingTable::default());
        world.insert_resource(EventBus::default());
        world.insert_resource(StageFixtures::default());
        world.insert_resource(TransformPropagationScratch::default());
        world.insert_resource(SceneEnvironment::default());
        let root = spawn_scene_root(&mut world);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                sys_step_physics,
                sys_advance_animation_rigs,
                sys_transfer_body_transforms,
                sys_propagate_scene_transforms,
            )
                .chain(),
        );
        let mut propagate = Schedule::default();
        propagate.add_systems(sys_propagate_scene_transforms);

        let session_id = Uuid::new_v4();
        debug!(target: "physics", %session_id, "world pair created");
        Self { world, schedule, propagate, root, session_id, configured: false, live: true }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn root(&self) -> Entity {
        self.root
    }

    /// Applies the environment and builds the stage. A second call does nothing and returns false.
    pub fn configure(&mut self, environment: SceneEnvironment, stage: &StageConfig) -> bool {
        if self.configured {
            return false;
        }
        self.world.insert_resource(environment);
        self.build_stage(stage);
        self.configured = true;
        self.propagate_transforms();
        info!(
            target: "physics",
            gravity = ?self.physics().gravity(),
            fixtures = self.fixtures().0.len(),
            "world pair configured"
        );
        true
    }

    fn build_stage(&mut self, stage: &StageConfig) {
        let mut fixtures = Vec::new();
        if stage.ground {
            let node = spawn_node(&mut self.world, self.root, Some("ground".into()), Transform3D::default());
            let mut mesh = NodeMesh::new(Arc::new(MeshGeometry::plane(stage.ground_size, stage.ground_size)));
            mesh.cast_shadows = false;
            self.world.entity_mut(node).insert(mesh);
            let def = BodyDef::fixed(ProxyShape::Plane { normal: Vec3::Y }, Vec3::ZERO)
                .with_material(PhysicsMaterial::GROUND);
            let body = self.spawn_fixture_body("ground", &def);
            fixtures.push(StageFixture { name: "ground".into(), node, body, obstacle: false });
        }
        if stage.wall {
            let size = Vec3::from_array(stage.wall_size);
            let position = Vec3::from_array(stage.wall_position);
            let node =
                spawn_node(&mut self.world, self.root, Some("wall".into()), Transform3D::from_translation(position));
            self.world.entity_mut(node).insert((NodeMesh::new(Arc::new(MeshGeometry::cuboid(size))), Pickable));
            let def = BodyDef::fixed(ProxyShape::Cuboid { half_extents: size * 0.5 }, position)
                .with_material(PhysicsMaterial::WALL);
            let body = self.spawn_fixture_body("wall", &def);
            fixtures.push(StageFixture { name: "wall".into(), node, body, obstacle: true });
        }
        if stage.spot_light {
            let position = Vec3::from_array(stage.spot_light_position);
            let node = spawn_node(
                &mut self.world,
                self.root,
                Some("spot_light".into()),
                Transform3D::from_translation(position),
            );
            let cast_shadows = stage.shadows;
            self.world.entity_mut(node).insert(LightNode::Spot { color: 0xffffff, intensity: 1.0, cast_shadows });
            fixtures.push(StageFixture { name: "spot_light".into(), node, body: None, obstacle: false });
        }
        if stage.ambient_light {
            let node = spawn_node(&mut self.world, self.root, Some("ambient_light".into()), Transform3D::default());
            self.world.entity_mut(node).insert(LightNode::Ambient { color: 0x404040, intensity: 1.0 });
            fixtures.push(StageFixture { name: "ambient_light".into(), node, body: None, obstacle: false });
        }
        if let Some(length) = stage.axes_length {
            let node = spawn_node(&mut self.world, self.root, Some("axes".into()), Transform3D::default());
            self.world.entity_mut(node).insert(Helper { kind: HelperKind::Axes { length } });
            fixtures.push(StageFixture { name: "axes".into(), node, body: None, obstacle: false });
        }
        self.world.resource_mut::<StageFixtures>().0.extend(fixtures);
    }

    fn spawn_fixture_body(&mut self, name: &str, def: &BodyDef) -> Option<RigidBodyHandle> {
        match self.physics_mut().spawn_body(def) {
            Ok(handles) => Some(handles.body),
            Err(err) => {
                warn!(target: "physics", fixture = name, "stage body not created: {err}");
                None
            }
        }
    }

    pub fn physics(&self) -> &PhysicsWorld {
        self.world.resource::<PhysicsWorld>()
    }

    pub fn physics_mut(&mut self) -> Mut<'_, PhysicsWorld> {
        self.world.resource_mut::<PhysicsWorld>()
    }

    pub fn bindings(&self) -> &BindingTable {
        self.world.resource::<BindingTable>()
    }

    pub fn fixtures(&self) -> &StageFixtures {
        self.world.resource::<StageFixtures>()
    }

    pub fn environment(&self) -> SceneEnvironment {
        *self.world.resource::<SceneEnvironment>()
    }

    /// Registers a node/body pair as one entity and returns its id.
    pub fn add_entity(&mut self, entity: NewEntity) -> EntityId {
        let id = EntityId::new();
        self.world.entity_mut(entity.node).insert(BoundEntity { id, body: entity.body.body });
        let row = EntityRow {
            id,
            node: entity.node,
            body: entity.body.body,
            collider: entity.body.collider,
            dimensions: entity.dimensions,
            y_offset: entity.y_offset,
            is_character: entity.is_character,
            has_rig: entity.has_rig,
            authority: BodyAuthority::PhysicsDriven,
            file_name: entity.file_name,
        };
        self.world.resource_mut::<BindingTable>().insert(row);
        id
    }

    /// Removes the entity's node subtree and its body. Returns false for unknown ids.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(row) = self.world.resource_mut::<BindingTable>().remove(id) else {
            return false;
        };
        self.physics_mut().remove_body(row.body);
        despawn_recursive(&mut self.world, row.node);
        self.world.resource_mut::<EventBus>().push(SessionEvent::EntityRemoved { id });
        debug!(target: "placement", %id, file = %row.file_name, "entity removed");
        true
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRow> {
        self.bindings().get(id)
    }

    pub fn for_each(&self, f: impl FnMut(&EntityRow)) {
        self.bindings().for_each(f);
    }

    pub fn set_authority(&mut self, id: EntityId, authority: BodyAuthority) -> bool {
        self.world.resource_mut::<BindingTable>().set_authority(id, authority)
    }

    pub fn node_transform(&self, id: EntityId) -> Option<Transform3D> {
        let row = self.entity(id)?;
        self.world.get::<Transform3D>(row.node).copied()
    }

    pub fn node_transform_mut(&mut self, id: EntityId) -> Option<Mut<'_, Transform3D>> {
        let node = self.entity(id)?.node;
        self.world.get_mut::<Transform3D>(node)
    }

    pub fn character_position(&self) -> Option<Vec3> {
        let row = self.bindings().character()?;
        self.physics().body_pose(row.body).map(|(position, _)| position)
    }

    /// One pass of physics -> animation -> transfer -> transform propagation.
    pub fn run_tick(&mut self, dt: f32) {
        self.world.resource_mut::<TimeDelta>().0 = dt;
        self.schedule.run(&mut self.world);
    }

    pub fn propagate_transforms(&mut self) {
        self.propagate.run(&mut self.world);
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.world.resource_mut::<EventBus>().drain()
    }

    /// Destroys every entity, fixture node and body and marks the pair dead.
    pub fn teardown(&mut self) {
        if !self.live {
            return;
        }
        let rows = self.world.resource_mut::<BindingTable>().clear();
        for row in &rows {
            despawn_recursive(&mut self.world, row.node);
        }
        let fixtures = std::mem::take(&mut self.world.resource_mut::<StageFixtures>().0);
        for fixture in &fixtures {
            despawn_recursive(&mut self.world, fixture.node);
        }
        self.physics_mut().clear();
        self.world.resource_mut::<EventBus>().drain();
        self.live = false;
        info!(target: "physics", session_id = %self.session_id, entities = rows.len(), "world pair torn down");
    }
}

fn contact_party(table: &BindingTable, fixtures: &StageFixtures, body: RigidBodyHandle) -> Option<ContactParty> {
    if let Some(id) = table.id_for_body(body) {
        return Some(ContactParty::Entity(id));
    }
    fixtures.by_body(body).map(|fixture| ContactParty::Stage(fixture.name.clone()))
}

pub fn sys_step_physics(
    mut physics: ResMut<PhysicsWorld>,
    table: Res<BindingTable>,
    fixtures: Res<StageFixtures>,
    mut events: ResMut<EventBus>,
    dt: Res<TimeDelta>,
) {
    let _span = tracing::trace_span!("sys_step_physics").entered();
    if dt.0 > 0.0 {
        physics.step(dt.0);
    }
    for (phase, a, b) in physics.drain_contact_events() {
        let (Some(a), Some(b)) = (contact_party(&table, &fixtures, a), contact_party(&table, &fixtures, b)) else {
            continue;
        };
        events.push(match phase {
            ContactPhase::Started => SessionEvent::contact_started(a, b),
            ContactPhase::Stopped => SessionEvent::contact_ended(a, b),
        });
    }
}
