use crate::model::MeshBounds;
use crate::scene::{NodeMesh, Pickable, WorldTransform3D};
use bevy_ecs::prelude::*;
use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneHit {
    pub entity: Entity,
    pub distance: f32,
    pub point: Vec3,
}

/// Distance along `dir` to the first intersection with the oriented box `bounds` under `world`.
pub fn ray_hit_obb(origin: Vec3, dir: Vec3, world: &Mat4, bounds: &MeshBounds) -> Option<f32> {
    let inv = world.inverse();
    if !matrix_is_finite(&inv) {
        return None;
    }
    let origin_local = inv.transform_point3(origin);
    let dir_local = inv.transform_vector3(dir);
    if dir_local.length_squared() <= f32::EPSILON {
        return None;
    }
    let dir_local = dir_local.normalize();
    let (t_local, hit_local) = ray_aabb_intersection(origin_local, dir_local, bounds.min, bounds.max)?;
    if t_local < 0.0 {
        return None;
    }
    let hit_world = world.transform_point3(hit_local);
    Some((hit_world - origin).length())
}

pub fn matrix_is_finite(mat: &Mat4) -> bool {
    mat.to_cols_array().iter().all(|v| v.is_finite())
}

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    for axis in 0..3 {
        let (o, d) = (origin[axis], dir[axis]);
        let (lo, hi) = (min[axis], max[axis]);
        if d.abs() < 1e-6 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut t1 = (lo - o) * inv_d;
        let mut t2 = (hi - o) * inv_d;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    if t_max < 0.0 {
        return None;
    }
    let t_hit = if t_min >= 0.0 { t_min } else { t_max };
    Some((t_hit, origin + dir * t_hit))
}

/// Intersection of a ray with the horizontal plane `y = height`, if the ray reaches it going forward.
pub fn ray_plane_y(origin: Vec3, dir: Vec3, height: f32) -> Option<Vec3> {
    if dir.y.abs() < 1e-6 {
        return None;
    }
    let t = (height - origin.y) / dir.y;
    if !(t >= 0.0) || !t.is_finite() {
        return None;
    }
    Some(origin + dir * t)
}

/// Nearest pickable mesh node hit by the ray, using each node's world transform and local bounds.
pub fn pick_scene(world: &mut World, origin: Vec3, dir: Vec3) -> Option<SceneHit> {
    let mut query = world.query_filtered::<(Entity, &NodeMesh, &WorldTransform3D), With<Pickable>>();
    let mut best: Option<SceneHit> = None;
    for (entity, mesh, transform) in query.iter(world) {
        let Some(distance) = ray_hit_obb(origin, dir, &transform.0, &mesh.bounds()) else {
            continue;
        };
        if best.map_or(true, |hit| distance < hit.distance) {
            best = Some(SceneHit { entity, distance, point: origin + dir * distance });
        }
    }
    best
}
