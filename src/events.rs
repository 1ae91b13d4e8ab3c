use crate::binding::EntityId;
use bevy_ecs::prelude::Resource;
use glam::Vec3;
use std::fmt;

/// One side of a contact: a registered entity or a piece of the stage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContactParty {
    Entity(EntityId),
    Stage(String),
}

impl fmt::Display for ContactParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactParty::Entity(id) => write!(f, "entity:{id}"),
            ContactParty::Stage(name) => write!(f, "stage:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    EntityPlaced { id: EntityId, file_name: String, position: Vec3 },
    EntityRemoved { id: EntityId },
    PlacementFailed { file_name: String, reason: String },
    /// A load finished after its session had ended; nothing was registered.
    PlacementDiscarded { file_name: String },
    ContactStarted { a: ContactParty, b: ContactParty },
    ContactEnded { a: ContactParty, b: ContactParty },
}

impl SessionEvent {
    fn ordered_pair(a: ContactParty, b: ContactParty) -> (ContactParty, ContactParty) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn contact_started(a: ContactParty, b: ContactParty) -> Self {
        let (a, b) = Self::ordered_pair(a, b);
        SessionEvent::ContactStarted { a, b }
    }

    pub fn contact_ended(a: ContactParty, b: ContactParty) -> Self {
        let (a, b) = Self::ordered_pair(a, b);
        SessionEvent::ContactEnded { a, b }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::EntityPlaced { id, file_name, position } => write!(
                f,
                "EntityPlaced id={id} file={file_name} at=({:.2}, {:.2}, {:.2})",
                position.x, position.y, position.z
            ),
            SessionEvent::EntityRemoved { id } => write!(f, "EntityRemoved id={id}"),
            SessionEvent::PlacementFailed { file_name, reason } => {
                write!(f, "PlacementFailed file={file_name} reason={reason}")
            }
            SessionEvent::PlacementDiscarded { file_name } => write!(f, "PlacementDiscarded file={file_name}"),
            SessionEvent::ContactStarted { a, b } => write!(f, "ContactStarted a={a} b={b}"),
            SessionEvent::ContactEnded { a, b } => write!(f, "ContactEnded a={a} b={b}"),
        }
    }
}

#[derive(Default, Resource)]
pub struct EventBus {
    events: Vec<SessionEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
