use glam::{Mat4, Quat, Vec3};

/// Axis-aligned bounds of a set of points, plus a bounding sphere around the box centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl MeshBounds {
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return MeshBounds { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for &point in points {
            min = min.min(point);
            max = max.max(point);
        }
        let center = (min + max) * 0.5;
        let mut radius: f32 = 0.0;
        for &point in points {
            radius = radius.max((point - center).length());
        }
        MeshBounds { min, max, center, radius }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after transforming its corners.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        let corners = self.corners().map(|corner| matrix.transform_point3(corner));
        Self::from_points(&corners)
    }

    pub fn union(&self, other: &MeshBounds) -> Self {
        let min = self.min.min(other.min);
        let max = self.max.max(other.max);
        let center = (min + max) * 0.5;
        MeshBounds { min, max, center, radius: (max - center).length() }
    }
}

/// Triangle geometry of a single mesh node, in node-local space.
#[derive(Clone, Debug)]
pub struct MeshGeometry {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub bounds: MeshBounds,
}

impl MeshGeometry {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = MeshBounds::from_points(&positions);
        Self { positions, indices, bounds }
    }

    /// Box centred on the origin with the given full size.
    pub fn cuboid(size: Vec3) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices = vec![
            0, 3, 2, 0, 2, 1, // back
            4, 5, 6, 4, 6, 7, // front
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
            3, 7, 6, 3, 6, 2, // top
            0, 1, 5, 0, 5, 4, // bottom
        ];
        Self::new(positions, indices)
    }

    /// Flat XZ quad facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        let positions = vec![
            Vec3::new(-hw, 0.0, -hd),
            Vec3::new(hw, 0.0, -hd),
            Vec3::new(hw, 0.0, hd),
            Vec3::new(-hw, 0.0, hd),
        ];
        Self::new(positions, vec![0, 2, 1, 0, 3, 2])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl NodeTransform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// One node of a loaded model hierarchy.
#[derive(Clone, Debug, Default)]
pub struct ModelNode {
    pub name: Option<String>,
    pub transform: NodeTransform,
    pub mesh: Option<MeshGeometry>,
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn with_mesh(mut self, mesh: MeshGeometry) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: NodeTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: ModelNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ModelNode::node_count).sum::<usize>()
    }

    /// World-space bounds of every mesh in this subtree, with `parent` as the transform above this node.
    pub fn subtree_bounds(&self, parent: Mat4) -> Option<MeshBounds> {
        let world = parent * self.transform.matrix();
        let mut bounds = self.mesh.as_ref().map(|mesh| mesh.bounds.transformed(world));
        for child in &self.children {
            if let Some(child_bounds) = child.subtree_bounds(world) {
                bounds = Some(match bounds {
                    Some(existing) => existing.union(&child_bounds),
                    None => child_bounds,
                });
            }
        }
        bounds
    }

    /// All mesh vertices of this subtree, transformed into the space above `parent`.
    pub fn collect_points(&self, parent: Mat4, out: &mut Vec<Vec3>) {
        let world = parent * self.transform.matrix();
        if let Some(mesh) = &self.mesh {
            out.extend(mesh.positions.iter().map(|p| world.transform_point3(*p)));
        }
        for child in &self.children {
            child.collect_points(world, out);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClipInfo {
    pub name: String,
    pub duration: f32,
}

/// What the model loader hands back: a node hierarchy plus its animation clips.
#[derive(Clone, Debug)]
pub struct ModelBundle {
    pub root: ModelNode,
    pub clips: Vec<AnimationClipInfo>,
}

impl ModelBundle {
    pub fn new(root: ModelNode) -> Self {
        Self { root, clips: Vec::new() }
    }

    pub fn with_clip(mut self, name: impl Into<String>, duration: f32) -> Self {
        self.clips.push(AnimationClipInfo { name: name.into(), duration });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_bounds_include_child_transforms() {
        let child = ModelNode::named("child")
            .with_mesh(MeshGeometry::cuboid(Vec3::ONE))
            .with_transform(NodeTransform { translation: Vec3::new(0.0, 2.0, 0.0), ..Default::default() });
        let root = ModelNode::named("root").with_mesh(MeshGeometry::cuboid(Vec3::ONE)).with_child(child);
        let bounds = root.subtree_bounds(Mat4::from_scale(Vec3::splat(2.0))).expect("bounds");
        assert!((bounds.min - Vec3::new(-1.0, -1.0, -1.0)).length() < 1e-5);
        assert!((bounds.max - Vec3::new(1.0, 5.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn empty_hierarchy_has_no_bounds() {
        let root = ModelNode::named("empty").with_child(ModelNode::named("also_empty"));
        assert!(root.subtree_bounds(Mat4::IDENTITY).is_none());
        assert_eq!(root.node_count(), 2);
    }
}
