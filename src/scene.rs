use crate::model::{MeshBounds, MeshGeometry, ModelNode};
use bevy_ecs::prelude::*;
use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Component, Clone, Debug, Default)]
pub struct SceneNode {
    pub name: Option<String>,
}

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl Transform3D {
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::default() }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct WorldTransform3D(pub Mat4);

impl Default for WorldTransform3D {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

#[derive(Component, Clone, Copy, Debug)]
pub struct Parent(pub Entity);

#[derive(Component, Clone, Debug, Default)]
pub struct Children(pub Vec<Entity>);

#[derive(Component, Clone, Debug)]
pub struct NodeMesh {
    pub geometry: Arc<MeshGeometry>,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
}

impl NodeMesh {
    pub fn new(geometry: Arc<MeshGeometry>) -> Self {
        Self { geometry, cast_shadows: true, receive_shadows: true }
    }

    pub fn bounds(&self) -> MeshBounds {
        self.geometry.bounds
    }
}

/// Marks mesh nodes that drop rays may land on.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Pickable;

/// Non-simulated scene furniture (axes gizmo and similar); never picked, never bound to a body.
#[derive(Component, Clone, Copy, Debug)]
pub struct Helper {
    pub kind: HelperKind,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HelperKind {
    Axes { length: f32 },
}

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub enum LightNode {
    Ambient { color: u32, intensity: f32 },
    Spot { color: u32, intensity: f32, cast_shadows: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowQuality {
    Hard,
    SoftPcf,
}

/// Global look of the scene, applied once when the world pair is configured.
#[derive(Resource, Clone, Copy, Debug, PartialEq)]
pub struct SceneEnvironment {
    pub background: u32,
    pub shadows_enabled: bool,
    pub shadow_quality: ShadowQuality,
}

impl Default for SceneEnvironment {
    fn default() -> Self {
        Self { background: 0xaaaaaa, shadows_enabled: true, shadow_quality: ShadowQuality::SoftPcf }
    }
}

#[derive(Resource, Clone, Copy, Debug)]
pub struct SceneRoot(pub Entity);

pub fn spawn_scene_root(world: &mut World) -> Entity {
    let root = world
        .spawn((SceneNode { name: Some("scene".to_string()) }, Transform3D::default(), WorldTransform3D::default()))
        .id();
    world.insert_resource(SceneRoot(root));
    root
}

pub fn attach_child(world: &mut World, parent: Entity, child: Entity) {
    world.entity_mut(child).insert(Parent(parent));
    if let Some(mut children) = world.get_mut::<Children>(parent) {
        children.0.push(child);
    } else {
        world.entity_mut(parent).insert(Children(vec![child]));
    }
}

pub fn spawn_node(world: &mut World, parent: Entity, name: Option<String>, transform: Transform3D) -> Entity {
    let entity = world.spawn((SceneNode { name }, transform, WorldTransform3D(transform.matrix()))).id();
    attach_child(world, parent, entity);
    entity
}

/// Instantiates a loaded hierarchy under `parent`. Every mesh node becomes pickable.
pub fn spawn_model(world: &mut World, parent: Entity, node: &ModelNode, root_transform: Transform3D) -> Entity {
    let root = spawn_node(world, parent, node.name.clone(), root_transform);
    if let Some(mesh) = &node.mesh {
        world.entity_mut(root).insert((NodeMesh::new(Arc::new(mesh.clone())), Pickable));
    }
    let mut stack: Vec<(Entity, &ModelNode)> = node.children.iter().rev().map(|child| (root, child)).collect();
    while let Some((owner, current)) = stack.pop() {
        let transform = Transform3D {
            translation: current.transform.translation,
            rotation: current.transform.rotation,
            scale: current.transform.scale,
        };
        let entity = spawn_node(world, owner, current.name.clone(), transform);
        if let Some(mesh) = &current.mesh {
            world.entity_mut(entity).insert((NodeMesh::new(Arc::new(mesh.clone())), Pickable));
        }
        stack.extend(current.children.iter().rev().map(|child| (entity, child)));
    }
    root
}

/// Despawns `entity` and its whole subtree, detaching it from its parent first.
pub fn despawn_recursive(world: &mut World, entity: Entity) {
    if let Some(parent) = world.get::<Parent>(entity).map(|p| p.0) {
        if let Some(mut siblings) = world.get_mut::<Children>(parent) {
            siblings.0.retain(|child| *child != entity);
        }
    }
    let mut stack = vec![entity];
    while let Some(current) = stack.pop() {
        if let Some(children) = world.get::<Children>(current) {
            stack.extend(children.0.iter().copied());
        }
        world.despawn(current);
    }
}

/// Number of nodes in the subtree rooted at `entity`, including itself.
pub fn subtree_len(world: &World, entity: Entity) -> usize {
    let mut count = 0;
    let mut stack = vec![entity];
    while let Some(current) = stack.pop() {
        if !world.entities().contains(current) {
            continue;
        }
        count += 1;
        if let Some(children) = world.get::<Children>(current) {
            stack.extend(children.0.iter().copied());
        }
    }
    count
}

#[derive(Resource, Default)]
pub struct TransformPropagationScratch {
    stack: SmallVec<[(Entity, Mat4); 128]>,
}

pub fn sys_propagate_scene_transforms(
    mut nodes: Query<(Option<&Transform3D>, Option<&Children>, &mut WorldTransform3D)>,
    roots: Query<Entity, (With<WorldTransform3D>, Without<Parent>)>,
    mut scratch: ResMut<TransformPropagationScratch>,
) {
    let _span = tracing::trace_span!("sys_propagate_scene_transforms").entered();
    let mut stack = std::mem::take(&mut scratch.stack);
    stack.clear();
    for root in roots.iter() {
        stack.push((root, Mat4::IDENTITY));
    }
    while let Some((entity, parent_world)) = stack.pop() {
        let Ok((transform, children, mut world)) = nodes.get_mut(entity) else {
            continue;
        };
        let local = transform.map(Transform3D::matrix).unwrap_or(Mat4::IDENTITY);
        let world_mat = parent_world * local;
        world.0 = world_mat;
        if let Some(children) = children {
            for &child in children.0.iter().rev() {
                stack.push((child, world_mat));
            }
        }
    }
    scratch.stack = stack;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeTransform;
    use bevy_ecs::schedule::Schedule;

    fn sample_model() -> ModelNode {
        ModelNode::named("root").with_mesh(MeshGeometry::cuboid(Vec3::ONE)).with_child(
            ModelNode::named("arm")
                .with_mesh(MeshGeometry::cuboid(Vec3::ONE))
                .with_transform(NodeTransform { translation: Vec3::X * 2.0, ..Default::default() }),
        )
    }

    #[test]
    fn propagation_composes_parent_transforms() {
        let mut world = World::new();
        world.insert_resource(TransformPropagationScratch::default());
        let root = spawn_scene_root(&mut world);
        let model = spawn_model(&mut world, root, &sample_model(), Transform3D::from_translation(Vec3::Y * 5.0));
        let mut schedule = Schedule::default();
        schedule.add_systems(sys_propagate_scene_transforms);
        schedule.run(&mut world);
        let arm = world.get::<Children>(model).expect("children").0[0];
        let arm_world = world.get::<WorldTransform3D>(arm).expect("world transform").0;
        let origin = arm_world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(2.0, 5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn despawn_removes_subtree_and_detaches() {
        let mut world = World::new();
        let root = spawn_scene_root(&mut world);
        let model = spawn_model(&mut world, root, &sample_model(), Transform3D::default());
        assert_eq!(subtree_len(&world, model), 2);
        despawn_recursive(&mut world, model);
        assert_eq!(subtree_len(&world, root), 1);
        assert!(world.get::<Children>(root).expect("children").0.is_empty());
    }
}
