use crate::config::CameraConfig;
use glam::{Mat4, Vec2, Vec3, Vec4};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;

/// Perspective camera the viewport renders through and drop rays are cast from.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(
            Vec3::from_array(config.position),
            Vec3::new(0.0, config.target_height, 0.0),
            config.fov_degrees.to_radians(),
            config.near,
            config.far,
        )
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        self.projection_matrix(aspect(viewport)) * self.view_matrix()
    }

    /// World-space ray from the camera through a pixel position (origin top-left).
    pub fn screen_ray(&self, screen: Vec2, viewport: PhysicalSize<u32>) -> Option<(Vec3, Vec3)> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let ndc_x = (2.0 * screen.x / viewport.width as f32) - 1.0;
        let ndc_y = 1.0 - (2.0 * screen.y / viewport.height as f32);
        let inv_view_proj = self.view_projection(viewport).inverse();
        let world = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        if world.w.abs() < f32::EPSILON {
            return None;
        }
        let dir = ((world.truncate() / world.w) - self.position).try_normalize()?;
        Some((self.position, dir))
    }

    pub fn project_point(&self, point: Vec3, viewport: PhysicalSize<u32>) -> Option<Vec2> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let clip = self.view_projection(viewport) * point.extend(1.0);
        if clip.w.abs() < f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x + 1.0) * 0.5 * viewport.width as f32;
        let y = (1.0 - ndc.y) * 0.5 * viewport.height as f32;
        Some(Vec2::new(x, y))
    }
}

fn aspect(viewport: PhysicalSize<u32>) -> f32 {
    if viewport.height > 0 {
        viewport.width as f32 / viewport.height as f32
    } else {
        1.0
    }
}

/// Keeps the camera at a fixed offset from a followed point.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRig {
    pub offset: Vec3,
    pub target_height: f32,
    pub follow: bool,
}

impl CameraRig {
    pub fn from_config(config: &CameraConfig) -> Self {
        let position = Vec3::from_array(config.position);
        let target = Vec3::new(0.0, config.target_height, 0.0);
        Self { offset: position - target, target_height: config.target_height, follow: config.follow_character }
    }

    /// Re-aims `camera` at `focus` (raised to the target height) when following is enabled.
    pub fn track(&self, camera: &mut Camera3D, focus: Vec3) -> bool {
        if !self.follow {
            return false;
        }
        let target = Vec3::new(focus.x, focus.y + self.target_height, focus.z);
        camera.target = target;
        camera.position = target + self.offset;
        true
    }
}
