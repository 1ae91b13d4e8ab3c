use crate::camera3d::Camera3D;
use crate::model::MeshBounds;
use crate::scene::{Helper, LightNode, NodeMesh, SceneEnvironment, WorldTransform3D};
use bevy_ecs::prelude::*;
use glam::{Mat4, Vec3};
use winit::dpi::PhysicalSize;

#[derive(Clone, Debug, PartialEq)]
pub struct RenderInstance {
    pub node: Entity,
    pub world: Mat4,
    pub bounds: MeshBounds,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderLight {
    pub light: LightNode,
    pub position: Vec3,
}

/// Everything a renderer needs for one frame, already resolved to world space.
#[derive(Clone, Debug)]
pub struct RenderFrame {
    pub index: u64,
    pub viewport: PhysicalSize<u32>,
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub environment: SceneEnvironment,
    pub instances: Vec<RenderInstance>,
    pub lights: Vec<RenderLight>,
    pub helpers: Vec<(Helper, Mat4)>,
}

impl RenderFrame {
    pub fn capture(world: &mut World, camera: &Camera3D, viewport: PhysicalSize<u32>, index: u64) -> Self {
        let aspect = if viewport.height > 0 { viewport.width as f32 / viewport.height as f32 } else { 1.0 };
        let environment = world.get_resource::<SceneEnvironment>().copied().unwrap_or_default();

        let mut meshes = world.query::<(Entity, &NodeMesh, &WorldTransform3D)>();
        let instances = meshes
            .iter(world)
            .map(|(node, mesh, transform)| RenderInstance {
                node,
                world: transform.0,
                bounds: mesh.bounds(),
                cast_shadows: mesh.cast_shadows,
                receive_shadows: mesh.receive_shadows,
            })
            .collect();
        let mut light_query = world.query::<(&LightNode, &WorldTransform3D)>();
        let lights = light_query
            .iter(world)
            .map(|(light, transform)| RenderLight { light: *light, position: transform.0.w_axis.truncate() })
            .collect();
        let mut helper_query = world.query::<(&Helper, &WorldTransform3D)>();
        let helpers = helper_query.iter(world).map(|(helper, transform)| (*helper, transform.0)).collect();

        Self {
            index,
            viewport,
            view: camera.view_matrix(),
            projection: camera.projection_matrix(aspect),
            camera_position: camera.position,
            environment,
            instances,
            lights,
            helpers,
        }
    }
}

pub trait SceneRenderer {
    fn render(&mut self, frame: &RenderFrame);
}

/// Renderer that draws nothing and only keeps counters; used by the runner and tests.
#[derive(Debug, Default, Clone)]
pub struct HeadlessRenderer {
    frames: u64,
    last_instances: usize,
    last_lights: usize,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_instance_count(&self) -> usize {
        self.last_instances
    }

    pub fn last_light_count(&self) -> usize {
        self.last_lights
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn render(&mut self, frame: &RenderFrame) {
        self.frames += 1;
        self.last_instances = frame.instances.len();
        self.last_lights = frame.lights.len();
        tracing::trace!(frame = frame.index, instances = frame.instances.len(), "headless frame");
    }
}
