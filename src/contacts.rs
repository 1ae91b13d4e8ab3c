use crate::physics::PhysicsWorld;
use rapier3d::prelude::RigidBodyHandle;

/// True when `a` and `b` share an active contact pair this tick. Order does not matter.
pub fn is_in_contact(physics: &PhysicsWorld, a: RigidBodyHandle, b: RigidBodyHandle) -> bool {
    physics.active_contact_pairs().any(|(first, second)| (first == a && second == b) || (first == b && second == a))
}

/// Every body currently touching `body`, without duplicates.
pub fn contacts_of(physics: &PhysicsWorld, body: RigidBodyHandle) -> Vec<RigidBodyHandle> {
    let mut partners = Vec::new();
    for (first, second) in physics.active_contact_pairs() {
        let partner = if first == body {
            second
        } else if second == body {
            first
        } else {
            continue;
        };
        if partner != body && !partners.contains(&partner) {
            partners.push(partner);
        }
    }
    partners
}

/// True when `body` touches any of `others`.
pub fn touches_any(physics: &PhysicsWorld, body: RigidBodyHandle, others: &[RigidBodyHandle]) -> bool {
    others.iter().any(|other| is_in_contact(physics, body, *other))
}
