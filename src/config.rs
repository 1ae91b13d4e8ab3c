use crate::animation::BlendPolicy;
use crate::physics::PhysicsParams;
use crate::scene::{SceneEnvironment, ShadowQuality};
use anyhow::{Context, Result};
use glam::Vec3;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "ViewportConfig::default_width")]
    pub width: u32,
    #[serde(default = "ViewportConfig::default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default = "PhysicsConfig::default_gravity")]
    pub gravity: [f32; 3],
    #[serde(default = "PhysicsConfig::default_max_substep")]
    pub max_substep: f32,
    /// Upper bound on the delta handed to one tick, in seconds.
    #[serde(default = "PhysicsConfig::default_max_frame_delta")]
    pub max_frame_delta: f32,
    #[serde(default = "PhysicsConfig::default_friction")]
    pub default_friction: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_position")]
    pub position: [f32; 3],
    #[serde(default = "CameraConfig::default_target_height")]
    pub target_height: f32,
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default)]
    pub follow_character: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyPolicy {
    #[default]
    BoundingBox,
    ConvexHull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacementConfig {
    #[serde(default = "PlacementConfig::default_reference_plane_height")]
    pub reference_plane_height: f32,
    /// Distance along the drop ray used when the ray never reaches the reference plane.
    #[serde(default = "PlacementConfig::default_fallback_distance")]
    pub fallback_distance: f32,
    #[serde(default = "PlacementConfig::default_proxy_mass")]
    pub proxy_mass: f32,
    #[serde(default)]
    pub proxy_policy: ProxyPolicy,
    #[serde(default = "PlacementConfig::default_lift_on_surface_hit")]
    pub lift_on_surface_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Switch,
    Crossfade,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterConfig {
    /// File name of the asset that becomes the controlled character.
    #[serde(default = "CharacterConfig::default_asset")]
    pub asset: String,
    #[serde(default = "CharacterConfig::default_speed")]
    pub speed: f32,
    #[serde(default = "CharacterConfig::default_run_multiplier")]
    pub run_multiplier: f32,
    #[serde(default = "CharacterConfig::default_ground_friction")]
    pub ground_friction: f32,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default = "CharacterConfig::default_crossfade_seconds")]
    pub crossfade_seconds: f32,
    #[serde(default = "CharacterConfig::default_gate_on_obstacles")]
    pub gate_on_obstacles: bool,
    #[serde(default)]
    pub bindings_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    #[serde(default = "StageConfig::default_background")]
    pub background: u32,
    #[serde(default = "StageConfig::default_true")]
    pub shadows: bool,
    #[serde(default = "StageConfig::default_true")]
    pub ground: bool,
    #[serde(default = "StageConfig::default_ground_size")]
    pub ground_size: f32,
    #[serde(default = "StageConfig::default_true")]
    pub wall: bool,
    #[serde(default = "StageConfig::default_wall_position")]
    pub wall_position: [f32; 3],
    #[serde(default = "StageConfig::default_wall_size")]
    pub wall_size: [f32; 3],
    #[serde(default = "StageConfig::default_true")]
    pub spot_light: bool,
    #[serde(default = "StageConfig::default_spot_light_position")]
    pub spot_light_position: [f32; 3],
    #[serde(default = "StageConfig::default_true")]
    pub ambient_light: bool,
    #[serde(default = "StageConfig::default_axes_length")]
    pub axes_length: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "AssetsConfig::default_root")]
    pub root: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub character: CharacterConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub assets_root: Option<String>,
}

impl ViewportConfig {
    const fn default_width() -> u32 {
        800
    }

    const fn default_height() -> u32 {
        600
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { width: Self::default_width(), height: Self::default_height() }
    }
}

impl PhysicsConfig {
    const fn default_gravity() -> [f32; 3] {
        [0.0, -9.82, 0.0]
    }

    fn default_max_substep() -> f32 {
        1.0 / 60.0
    }

    const fn default_max_frame_delta() -> f32 {
        0.1
    }

    const fn default_friction() -> f32 {
        0.3
    }

    pub fn params(&self) -> PhysicsParams {
        PhysicsParams {
            gravity: Vec3::from_array(self.gravity),
            max_substep: self.max_substep,
            default_friction: self.default_friction,
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Self::default_gravity(),
            max_substep: Self::default_max_substep(),
            max_frame_delta: Self::default_max_frame_delta(),
            default_friction: Self::default_friction(),
        }
    }
}

impl CameraConfig {
    const fn default_position() -> [f32; 3] {
        [-25.0, 25.0, 0.0]
    }

    const fn default_target_height() -> f32 {
        2.0
    }

    const fn default_fov_degrees() -> f32 {
        75.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        1000.0
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Self::default_position(),
            target_height: Self::default_target_height(),
            fov_degrees: Self::default_fov_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
            follow_character: false,
        }
    }
}

impl PlacementConfig {
    const fn default_reference_plane_height() -> f32 {
        15.0
    }

    const fn default_fallback_distance() -> f32 {
        50.0
    }

    const fn default_proxy_mass() -> f32 {
        78.0
    }

    const fn default_lift_on_surface_hit() -> bool {
        true
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            reference_plane_height: Self::default_reference_plane_height(),
            fallback_distance: Self::default_fallback_distance(),
            proxy_mass: Self::default_proxy_mass(),
            proxy_policy: ProxyPolicy::default(),
            lift_on_surface_hit: Self::default_lift_on_surface_hit(),
        }
    }
}

impl CharacterConfig {
    fn default_asset() -> String {
        "Soldier.glb".to_string()
    }

    const fn default_speed() -> f32 {
        10.0
    }

    const fn default_run_multiplier() -> f32 {
        1.5
    }

    const fn default_ground_friction() -> f32 {
        0.02
    }

    const fn default_crossfade_seconds() -> f32 {
        0.2
    }

    const fn default_gate_on_obstacles() -> bool {
        true
    }

    pub fn blend_policy(&self) -> BlendPolicy {
        match self.blend {
            BlendMode::Switch => BlendPolicy::Switch,
            BlendMode::Crossfade => BlendPolicy::Crossfade { duration: self.crossfade_seconds },
        }
    }
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            asset: Self::default_asset(),
            speed: Self::default_speed(),
            run_multiplier: Self::default_run_multiplier(),
            ground_friction: Self::default_ground_friction(),
            blend: BlendMode::default(),
            crossfade_seconds: Self::default_crossfade_seconds(),
            gate_on_obstacles: Self::default_gate_on_obstacles(),
            bindings_path: None,
        }
    }
}

impl StageConfig {
    const fn default_background() -> u32 {
        0xaaaaaa
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_ground_size() -> f32 {
        1000.0
    }

    const fn default_wall_position() -> [f32; 3] {
        [10.0, 5.0, 0.0]
    }

    const fn default_wall_size() -> [f32; 3] {
        [1.0, 10.0, 25.0]
    }

    const fn default_spot_light_position() -> [f32; 3] {
        [0.0, 20.0, 0.0]
    }

    const fn default_axes_length() -> Option<f32> {
        Some(50.0)
    }

    pub fn environment(&self) -> SceneEnvironment {
        SceneEnvironment {
            background: self.background,
            shadows_enabled: self.shadows,
            shadow_quality: ShadowQuality::SoftPcf,
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            background: Self::default_background(),
            shadows: true,
            ground: true,
            ground_size: Self::default_ground_size(),
            wall: true,
            wall_position: Self::default_wall_position(),
            wall_size: Self::default_wall_size(),
            spot_light: true,
            spot_light_position: Self::default_spot_light_position(),
            ambient_light: true,
            axes_length: Self::default_axes_length(),
        }
    }
}

impl AssetsConfig {
    fn default_root() -> String {
        "assets".to_string()
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { root: Self::default_root() }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg =
            serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(target: "config", "Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &EngineConfigOverrides) {
        if let Some(width) = overrides.width {
            self.viewport.width = width;
        }
        if let Some(height) = overrides.height {
            self.viewport.height = height;
        }
        if let Some(root) = &overrides.assets_root {
            self.assets.root = root.clone();
        }
    }
}

impl EngineConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.assets_root.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.assets_root.is_some() {
            fields.push("assets");
        }
        fields
    }
}
