use crate::animation::{AnimationRig, BlendPolicy};
use crate::assets::{AssetLoadError, AssetPath};
use crate::binding::EntityId;
use crate::camera3d::Camera3D;
use crate::config::{EngineConfig, ProxyPolicy};
use crate::model::{MeshBounds, ModelBundle};
use crate::physics::{BodyDef, PhysicsError, PhysicsMaterial, ProxyShape};
use crate::picking::{pick_scene, ray_plane_y};
use crate::scene::{spawn_model, Transform3D};
use crate::world::{NewEntity, WorldPair};
use glam::{Mat4, Vec2, Vec3};
use thiserror::Error;
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;

/// Extent given to models without any mesh so they still get a usable proxy.
const EMPTY_MODEL_SIZE: f32 = 1.0;
const MIN_HULL_THICKNESS: f32 = 1e-4;

#[derive(Clone, Debug, PartialEq)]
pub struct PlacementRequest {
    pub asset_type: String,
    pub file_name: String,
    pub screen_position: Vec2,
    pub scale: Option<f32>,
    pub y_offset: Option<f32>,
    /// Set when the catalog marks the asset as a controllable character.
    pub character: bool,
}

impl PlacementRequest {
    pub fn new(asset_type: impl Into<String>, file_name: impl Into<String>, screen_position: Vec2) -> Self {
        Self {
            asset_type: asset_type.into(),
            file_name: file_name.into(),
            screen_position,
            scale: None,
            y_offset: None,
            character: false,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_y_offset(mut self, y_offset: f32) -> Self {
        self.y_offset = Some(y_offset);
        self
    }

    pub fn asset_path(&self) -> AssetPath {
        AssetPath::new(self.asset_type.clone(), self.file_name.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropSource {
    /// The ray hit pickable scene geometry.
    SurfaceHit,
    /// The ray missed everything and crossed the reference plane.
    ReferencePlane,
    /// The ray never reaches the reference plane; a point along the ray was used.
    RayFallback,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedPoint {
    pub position: Vec3,
    pub source: DropSource,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlacementError {
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),
    #[error("session ended before '{file_name}' finished loading")]
    SessionEnded { file_name: String },
    #[error("no viewport is mounted")]
    NotMounted,
    #[error("collision proxy rejected: {0}")]
    Proxy(#[from] PhysicsError),
}

/// Tunables the pipeline reads on every placement.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementSettings {
    pub reference_plane_height: f32,
    pub fallback_distance: f32,
    pub proxy_mass: f32,
    pub proxy_policy: ProxyPolicy,
    pub lift_on_surface_hit: bool,
    pub character_asset: String,
    pub character_ground_friction: f32,
    pub blend_policy: BlendPolicy,
}

impl PlacementSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            reference_plane_height: config.placement.reference_plane_height,
            fallback_distance: config.placement.fallback_distance,
            proxy_mass: config.placement.proxy_mass,
            proxy_policy: config.placement.proxy_policy,
            lift_on_surface_hit: config.placement.lift_on_surface_hit,
            character_asset: config.character.asset.clone(),
            character_ground_friction: config.character.ground_friction,
            blend_policy: config.character.blend_policy(),
        }
    }

    pub fn is_character(&self, file_name: &str) -> bool {
        file_name.eq_ignore_ascii_case(&self.character_asset)
    }
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Casts the drop ray against pickable geometry, falling back to the reference plane. Never fails.
pub fn resolve_drop_point(
    world: &mut WorldPair,
    camera: &Camera3D,
    viewport: PhysicalSize<u32>,
    screen: Vec2,
    settings: &PlacementSettings,
) -> ResolvedPoint {
    let height = settings.reference_plane_height;
    let Some((origin, dir)) = camera.screen_ray(screen, viewport) else {
        // Degenerate viewport: drop straight above the camera target.
        let position = Vec3::new(camera.target.x, height, camera.target.z);
        return ResolvedPoint { position, source: DropSource::RayFallback };
    };
    world.propagate_transforms();
    if let Some(hit) = pick_scene(&mut world.world, origin, dir) {
        return ResolvedPoint { position: hit.point, source: DropSource::SurfaceHit };
    }
    if let Some(position) = ray_plane_y(origin, dir, height) {
        return ResolvedPoint { position, source: DropSource::ReferencePlane };
    }
    let along = origin + dir * settings.fallback_distance;
    ResolvedPoint { position: Vec3::new(along.x, height, along.z), source: DropSource::RayFallback }
}

/// Bounds of the whole hierarchy with the root at the origin and the given uniform scale.
pub fn model_bounds(bundle: &ModelBundle, scale: f32) -> MeshBounds {
    bundle.root.subtree_bounds(Mat4::from_scale(Vec3::splat(scale))).unwrap_or_else(|| {
        let half = Vec3::splat(EMPTY_MODEL_SIZE * 0.5 * scale);
        MeshBounds::from_points(&[-half, half])
    })
}

fn derive_proxy(bundle: &ModelBundle, scale: f32, bounds: &MeshBounds, policy: ProxyPolicy) -> ProxyShape {
    let boxed = ProxyShape::Cuboid { half_extents: bounds.half_extents() };
    match policy {
        ProxyPolicy::BoundingBox => boxed,
        ProxyPolicy::ConvexHull => {
            let mut points = Vec::new();
            bundle.root.collect_points(Mat4::from_scale(Vec3::splat(scale)), &mut points);
            // Flat or near-empty meshes enclose no volume.
            if points.len() < 4 || bounds.size().min_element() <= MIN_HULL_THICKNESS {
                debug!(target: "placement", points = points.len(), "mesh too thin for a hull; using bounding box");
                return boxed;
            }
            ProxyShape::ConvexHull { points }
        }
    }
}

/// Turns a loaded bundle into a registered entity at `point`. Body and node are created together.
pub fn instantiate(
    world: &mut WorldPair,
    request: &PlacementRequest,
    point: ResolvedPoint,
    bundle: &ModelBundle,
    settings: &PlacementSettings,
) -> Result<EntityId, PlacementError> {
    let scale = request.scale.filter(|s| s.is_finite() && *s > 0.0).unwrap_or(1.0);
    let y_offset = request.y_offset.unwrap_or(0.0);
    let is_character = request.character || settings.is_character(&request.file_name);
    let bounds = model_bounds(bundle, scale);
    let dimensions = bounds.size();
    let proxy = derive_proxy(bundle, scale, &bounds, settings.proxy_policy);

    let mut position = point.position;
    if point.source == DropSource::SurfaceHit && settings.lift_on_surface_hit {
        position.y += proxy.half_height();
    }

    let mut def = BodyDef::dynamic(proxy, position).with_mass(settings.proxy_mass);
    if is_character {
        world.physics_mut().set_pair_friction(
            PhysicsMaterial::CHARACTER,
            PhysicsMaterial::GROUND,
            settings.character_ground_friction,
        );
        def = def.with_material(PhysicsMaterial::CHARACTER).with_locked_rotations();
    }
    let handles = match world.physics_mut().spawn_body(&def) {
        Ok(handles) => handles,
        Err(err) => {
            warn!(target: "placement", file = %request.file_name, "{err}; using bounding box proxy");
            def.shape = ProxyShape::Cuboid { half_extents: bounds.half_extents() };
            world.physics_mut().spawn_body(&def)?
        }
    };

    let offset = Vec3::new(0.0, y_offset * dimensions.y, 0.0);
    let transform = Transform3D { translation: position + offset, scale: Vec3::splat(scale), ..Default::default() };
    let root = world.root();
    let node = spawn_model(&mut world.world, root, &bundle.root, transform);

    let rig = AnimationRig::from_clips(&bundle.clips, is_character, settings.blend_policy);
    let has_rig = rig.is_some();
    if let Some(rig) = rig {
        world.world.entity_mut(node).insert(rig);
    }

    let id = world.add_entity(NewEntity {
        node,
        body: handles,
        dimensions,
        y_offset,
        is_character,
        has_rig,
        file_name: request.file_name.clone(),
    });
    info!(
        target: "placement",
        %id,
        file = %request.file_name,
        source = ?point.source,
        position = ?position,
        dimensions = ?dimensions,
        is_character,
        "entity placed"
    );
    debug!(target: "placement", clips = bundle.clips.len(), has_rig, "placement details");
    Ok(id)
}
