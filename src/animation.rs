use crate::model::AnimationClipInfo;
use crate::world::TimeDelta;
use bevy_ecs::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendAction {
    Idle,
    Walk,
    Run,
}

impl BlendAction {
    pub const ALL: [BlendAction; 3] = [BlendAction::Idle, BlendAction::Walk, BlendAction::Run];

    pub fn name(self) -> &'static str {
        match self {
            BlendAction::Idle => "idle",
            BlendAction::Walk => "walk",
            BlendAction::Run => "run",
        }
    }

    fn index(self) -> usize {
        match self {
            BlendAction::Idle => 0,
            BlendAction::Walk => 1,
            BlendAction::Run => 2,
        }
    }

    /// Clip slot used when a rig's clips carry no recognisable names.
    fn fallback_clip_index(self) -> usize {
        match self {
            BlendAction::Idle => 0,
            BlendAction::Walk => 3,
            BlendAction::Run => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlendPolicy {
    /// Exactly one action fully weighted at a time.
    Switch,
    /// Weights move linearly toward the target over `duration` seconds.
    Crossfade { duration: f32 },
}

impl Default for BlendPolicy {
    fn default() -> Self {
        BlendPolicy::Switch
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MovementState {
    #[default]
    Idle,
    Walking,
    Running,
}

impl MovementState {
    pub fn action(self) -> BlendAction {
        match self {
            MovementState::Idle => BlendAction::Idle,
            MovementState::Walking => BlendAction::Walk,
            MovementState::Running => BlendAction::Run,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionTrack {
    pub clip: String,
    pub duration: f32,
    pub time: f32,
    pub weight: f32,
}

impl ActionTrack {
    fn new(clip: &AnimationClipInfo) -> Self {
        Self { clip: clip.name.clone(), duration: clip.duration, time: 0.0, weight: 0.0 }
    }

    fn advance(&mut self, dt: f32) {
        self.time += dt;
        if self.duration > 0.0 {
            self.time %= self.duration;
        } else {
            self.time = 0.0;
        }
    }
}

/// Named idle/walk/run actions and their blend weights. Weights of present actions always sum to 1.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct AnimationRig {
    tracks: [Option<ActionTrack>; 3],
    policy: BlendPolicy,
    target: BlendAction,
}

impl AnimationRig {
    /// Builds a rig by matching clip names against the action names. With `index_fallback`, actions
    /// whose name matched nothing take the conventional clip slots instead.
    pub fn from_clips(clips: &[AnimationClipInfo], index_fallback: bool, policy: BlendPolicy) -> Option<Self> {
        let mut tracks: [Option<ActionTrack>; 3] = [None, None, None];
        for action in BlendAction::ALL {
            let by_name = clips.iter().find(|clip| clip.name.to_ascii_lowercase().contains(action.name()));
            let clip = by_name.or_else(|| {
                if index_fallback {
                    clips.get(action.fallback_clip_index())
                } else {
                    None
                }
            });
            tracks[action.index()] = clip.map(ActionTrack::new);
        }
        if tracks.iter().all(Option::is_none) {
            return None;
        }
        let mut rig = Self { tracks, policy, target: BlendAction::Idle };
        rig.target = rig.resolve(BlendAction::Idle);
        rig.snap_to_target();
        Some(rig)
    }

    pub fn policy(&self) -> BlendPolicy {
        self.policy
    }

    pub fn has_action(&self, action: BlendAction) -> bool {
        self.tracks[action.index()].is_some()
    }

    pub fn track(&self, action: BlendAction) -> Option<&ActionTrack> {
        self.tracks[action.index()].as_ref()
    }

    pub fn target(&self) -> BlendAction {
        self.target
    }

    pub fn weight(&self, action: BlendAction) -> f32 {
        self.track(action).map_or(0.0, |track| track.weight)
    }

    pub fn weights(&self) -> [f32; 3] {
        BlendAction::ALL.map(|action| self.weight(action))
    }

    /// Action with the largest weight.
    pub fn dominant(&self) -> BlendAction {
        let mut best = self.target;
        let mut best_weight = f32::NEG_INFINITY;
        for action in BlendAction::ALL {
            if let Some(track) = self.track(action) {
                if track.weight > best_weight {
                    best = action;
                    best_weight = track.weight;
                }
            }
        }
        best
    }

    pub fn set_movement(&mut self, movement: MovementState) {
        self.set_target(movement.action());
    }

    pub fn set_target(&mut self, action: BlendAction) {
        self.target = self.resolve(action);
        if matches!(self.policy, BlendPolicy::Switch) {
            self.snap_to_target();
        }
    }

    pub fn advance(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }
        for track in self.tracks.iter_mut().flatten() {
            track.advance(dt);
        }
        match self.policy {
            BlendPolicy::Switch => self.snap_to_target(),
            BlendPolicy::Crossfade { duration } => {
                if duration <= 0.0 {
                    self.snap_to_target();
                } else {
                    self.fade_toward_target(dt / duration);
                }
            }
        }
    }

    /// Missing actions degrade run -> walk -> idle and back up again.
    fn resolve(&self, action: BlendAction) -> BlendAction {
        let preference: &[BlendAction] = match action {
            BlendAction::Run => &[BlendAction::Run, BlendAction::Walk, BlendAction::Idle],
            BlendAction::Walk => &[BlendAction::Walk, BlendAction::Run, BlendAction::Idle],
            BlendAction::Idle => &[BlendAction::Idle, BlendAction::Walk, BlendAction::Run],
        };
        preference.iter().copied().find(|candidate| self.has_action(*candidate)).unwrap_or(action)
    }

    fn snap_to_target(&mut self) {
        let target = self.target.index();
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if let Some(track) = track {
                track.weight = if index == target { 1.0 } else { 0.0 };
            }
        }
    }

    fn fade_toward_target(&mut self, step: f32) {
        let target = self.target.index();
        let Some(current) = self.tracks[target].as_ref().map(|track| track.weight) else {
            return;
        };
        let new_target = (current + step).min(1.0);
        let others: f32 =
            self.tracks.iter().enumerate().filter(|(i, _)| *i != target).flat_map(|(_, t)| t).map(|t| t.weight).sum();
        let remaining = 1.0 - new_target;
        for (index, track) in self.tracks.iter_mut().enumerate() {
            let Some(track) = track else { continue };
            if index == target {
                track.weight = new_target;
            } else if others > 0.0 {
                track.weight = track.weight / others * remaining;
            } else {
                track.weight = 0.0;
            }
        }
        if others <= 0.0 {
            if let Some(track) = self.tracks[target].as_mut() {
                track.weight = 1.0;
            }
        }
    }
}

pub fn sys_advance_animation_rigs(mut rigs: Query<&mut AnimationRig>, dt: Res<TimeDelta>) {
    let _span = tracing::trace_span!("sys_advance_animation_rigs").entered();
    for mut rig in &mut rigs {
        rig.advance(dt.0);
    }
}
