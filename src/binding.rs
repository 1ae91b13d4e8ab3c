use crate::physics::PhysicsWorld;
use crate::scene::Transform3D;
use bevy_ecs::prelude::*;
use glam::Vec3;
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a binding owns the pose each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyAuthority {
    /// Body pose is copied onto the node.
    #[default]
    PhysicsDriven,
    /// Node pose is copied onto the body, with the body held still.
    ManuallyDriven,
}

/// Tag on the root node of every bound entity.
#[derive(Component, Clone, Copy, Debug)]
pub struct BoundEntity {
    pub id: EntityId,
    pub body: RigidBodyHandle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityRow {
    pub id: EntityId,
    pub node: Entity,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    /// Full size of the hierarchy's bounding box at creation. Never updated.
    pub dimensions: Vec3,
    pub y_offset: f32,
    pub is_character: bool,
    pub has_rig: bool,
    pub authority: BodyAuthority,
    pub file_name: String,
}

impl EntityRow {
    /// Vertical offset between body centre and node origin.
    pub fn node_offset(&self) -> Vec3 {
        Vec3::new(0.0, self.y_offset * self.dimensions.y, 0.0)
    }
}

/// All registered entities, in registration order.
#[derive(Resource, Default, Debug)]
pub struct BindingTable {
    rows: HashMap<EntityId, EntityRow>,
    order: Vec<EntityId>,
    by_body: HashMap<RigidBodyHandle, EntityId>,
}

impl BindingTable {
    pub fn insert(&mut self, row: EntityRow) {
        let id = row.id;
        self.by_body.insert(row.body, id);
        if self.rows.insert(id, row).is_none() {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<EntityRow> {
        let row = self.rows.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        self.by_body.remove(&row.body);
        Some(row)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRow> {
        self.rows.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRow> {
        self.rows.get_mut(&id)
    }

    pub fn id_for_body(&self, body: RigidBodyHandle) -> Option<EntityId> {
        self.by_body.get(&body).copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRow> + '_ {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }

    pub fn for_each(&self, mut f: impl FnMut(&EntityRow)) {
        for row in self.iter() {
            f(row);
        }
    }

    /// First registered character, if any.
    pub fn character(&self) -> Option<&EntityRow> {
        self.iter().find(|row| row.is_character)
    }

    pub fn set_authority(&mut self, id: EntityId, authority: BodyAuthority) -> bool {
        match self.rows.get_mut(&id) {
            Some(row) => {
                row.authority = authority;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) -> Vec<EntityRow> {
        let order = std::mem::take(&mut self.order);
        self.by_body.clear();
        let mut rows = Vec::with_capacity(order.len());
        for id in order {
            if let Some(row) = self.rows.remove(&id) {
                rows.push(row);
            }
        }
        rows
    }
}

/// Applies one tick of the transfer contract to a single row.
pub fn transfer_row(row: &EntityRow, physics: &mut PhysicsWorld, node: &mut Transform3D) {
    match row.authority {
        BodyAuthority::PhysicsDriven => {
            if let Some((position, rotation)) = physics.body_pose(row.body) {
                node.translation = position + row.node_offset();
                node.rotation = rotation;
            }
        }
        BodyAuthority::ManuallyDriven => {
            physics.set_body_pose(row.body, node.translation - row.node_offset(), node.rotation);
            physics.set_linvel(row.body, Vec3::ZERO);
            physics.set_angvel(row.body, Vec3::ZERO);
        }
    }
}

pub fn sys_transfer_body_transforms(
    table: Res<BindingTable>,
    mut physics: ResMut<PhysicsWorld>,
    mut nodes: Query<&mut Transform3D>,
) {
    let _span = tracing::trace_span!("sys_transfer_body_transforms").entered();
    for row in table.iter() {
        if let Ok(mut node) = nodes.get_mut(row.node) {
            transfer_row(row, &mut physics, &mut node);
        }
    }
}
