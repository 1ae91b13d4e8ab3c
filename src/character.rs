use crate::animation::{AnimationRig, MovementState};
use crate::binding::EntityId;
use crate::config::CharacterConfig;
use crate::contacts::is_in_contact;
use crate::input::{Input, InputAction};
use crate::world::WorldPair;
use glam::{Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, PI};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub fn from_action(action: InputAction) -> Option<Self> {
        match action {
            InputAction::MoveForward => Some(Direction::Forward),
            InputAction::MoveBackward => Some(Direction::Backward),
            InputAction::MoveLeft => Some(Direction::Left),
            InputAction::MoveRight => Some(Direction::Right),
            InputAction::Reset | InputAction::Boost => None,
        }
    }

    /// Unit travel direction in world space.
    pub fn axis(self) -> Vec3 {
        match self {
            Direction::Forward => Vec3::X,
            Direction::Backward => Vec3::NEG_X,
            Direction::Left => Vec3::NEG_Z,
            Direction::Right => Vec3::Z,
        }
    }

    /// Snapped body orientation while moving this way.
    pub fn facing(self) -> Quat {
        match self {
            Direction::Forward => Quat::from_rotation_y(-FRAC_PI_2),
            Direction::Backward => Quat::from_rotation_y(FRAC_PI_2),
            Direction::Left => Quat::from_rotation_y(0.0),
            Direction::Right => Quat::from_rotation_y(PI),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlOutcome {
    /// No character, or the action does not move anything.
    Ignored,
    Moved { direction: Direction, velocity: Vec3, gated: bool },
    Reset,
    /// Only the animation state changed.
    Animated(MovementState),
}

/// Drives the designated character body from key actions. Writes velocity and orientation only.
#[derive(Clone, Debug)]
pub struct CharacterController {
    target: Option<EntityId>,
    speed: f32,
    run_multiplier: f32,
    gate_on_obstacles: bool,
    movement: MovementState,
}

impl CharacterController {
    pub fn new(config: &CharacterConfig) -> Self {
        Self {
            target: None,
            speed: config.speed,
            run_multiplier: config.run_multiplier,
            gate_on_obstacles: config.gate_on_obstacles,
            movement: MovementState::Idle,
        }
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    /// Takes control of `id` unless another character is already controlled.
    pub fn attach(&mut self, id: EntityId) -> bool {
        if self.target.is_some() {
            return false;
        }
        debug!(target: "input", %id, "character attached");
        self.target = Some(id);
        true
    }

    pub fn detach(&mut self) {
        self.target = None;
        self.movement = MovementState::Idle;
    }

    pub fn movement(&self) -> MovementState {
        self.movement
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn handle_action(
        &mut self,
        world: &mut WorldPair,
        input: &Input,
        action: InputAction,
        pressed: bool,
    ) -> ControlOutcome {
        let Some(id) = self.target else {
            return ControlOutcome::Ignored;
        };
        let Some(row) = world.entity(id).cloned() else {
            self.detach();
            return ControlOutcome::Ignored;
        };

        let outcome = match (action, pressed) {
            (InputAction::Reset, true) => {
                let mut physics = world.physics_mut();
                physics.set_body_translation(row.body, Vec3::ZERO);
                physics.set_linvel(row.body, Vec3::ZERO);
                physics.set_angvel(row.body, Vec3::ZERO);
                ControlOutcome::Reset
            }
            (action, true) => match Direction::from_action(action) {
                Some(direction) => {
                    let speed = if input.boost_held() { self.speed * self.run_multiplier } else { self.speed };
                    let gated = self.gate_on_obstacles && self.blocked(world, row.body, direction);
                    let vertical = world.physics().linvel(row.body).map_or(0.0, |v| v.y);
                    let velocity = if gated {
                        Vec3::new(0.0, vertical, 0.0)
                    } else {
                        let axis = direction.axis();
                        Vec3::new(axis.x * speed, vertical, axis.z * speed)
                    };
                    let mut physics = world.physics_mut();
                    physics.set_linvel(row.body, velocity);
                    physics.set_body_rotation(row.body, direction.facing());
                    ControlOutcome::Moved { direction, velocity, gated }
                }
                None => ControlOutcome::Ignored,
            },
            _ => ControlOutcome::Ignored,
        };

        let movement = match (input.movement_held(), input.boost_held()) {
            (false, _) => MovementState::Idle,
            (true, false) => MovementState::Walking,
            (true, true) => MovementState::Running,
        };
        if movement != self.movement {
            self.movement = movement;
            if let Some(mut rig) = world.world.get_mut::<AnimationRig>(row.node) {
                rig.set_movement(movement);
            }
            if outcome == ControlOutcome::Ignored {
                return ControlOutcome::Animated(movement);
            }
        }
        outcome
    }

    /// True when the character touches an obstacle lying in `direction`.
    fn blocked(&self, world: &WorldPair, body: rapier3d::prelude::RigidBodyHandle, direction: Direction) -> bool {
        let physics = world.physics();
        let Some((position, _)) = physics.body_pose(body) else {
            return false;
        };
        world.fixtures().obstacles().into_iter().any(|obstacle| {
            if !is_in_contact(physics, body, obstacle) {
                return false;
            }
            let Some((min, max)) = physics.body_aabb(obstacle) else {
                return false;
            };
            let mut toward = position.clamp(min, max) - position;
            toward.y = 0.0;
            toward.dot(direction.axis()) > 1e-4
        })
    }
}
