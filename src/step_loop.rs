use crate::camera3d::{Camera3D, CameraRig};
use crate::render::{RenderFrame, SceneRenderer};
use crate::world::WorldPair;
use tracing::{debug, trace};
use winit::dpi::PhysicalSize;

pub const DEFAULT_MAX_FRAME_DELTA: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub index: u64,
    pub wall_dt: f32,
    /// Delta actually simulated, after clamping.
    pub dt: f32,
    pub clamped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    Ran(TickReport),
    Skipped(LoopState),
}

impl TickOutcome {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Ran(report) => Some(report),
            TickOutcome::Skipped(_) => None,
        }
    }
}

/// What one tick renders through.
pub struct FrameTarget<'a> {
    pub renderer: &'a mut dyn SceneRenderer,
    pub camera: &'a mut Camera3D,
    pub rig: Option<&'a CameraRig>,
    pub viewport: PhysicalSize<u32>,
}

/// Idle -> Running -> Stopped. A stopped loop never runs again.
#[derive(Debug, Clone)]
pub struct StepLoop {
    state: LoopState,
    max_frame_delta: f32,
    ticks: u64,
}

impl Default for StepLoop {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_DELTA)
    }
}

impl StepLoop {
    pub fn new(max_frame_delta: f32) -> Self {
        Self { state: LoopState::Idle, max_frame_delta, ticks: 0 }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn start(&mut self) -> bool {
        if self.state != LoopState::Idle {
            return false;
        }
        self.state = LoopState::Running;
        debug!(target: "physics", "step loop started");
        true
    }

    pub fn stop(&mut self) {
        if self.state != LoopState::Stopped {
            debug!(target: "physics", ticks = self.ticks, "step loop stopped");
        }
        self.state = LoopState::Stopped;
    }

    pub fn clamp_delta(&self, wall_dt: f32) -> f32 {
        if !wall_dt.is_finite() || wall_dt <= 0.0 {
            return 0.0;
        }
        wall_dt.min(self.max_frame_delta)
    }

    /// Physics, animation, transfer and propagation, then one render.
    pub fn tick(&mut self, world: &mut WorldPair, wall_dt: f32, target: FrameTarget<'_>) -> TickOutcome {
        if self.state != LoopState::Running || !world.is_live() {
            return TickOutcome::Skipped(self.state);
        }
        let dt = self.clamp_delta(wall_dt);
        world.run_tick(dt);
        if let (Some(rig), Some(focus)) = (target.rig, world.character_position()) {
            rig.track(target.camera, focus);
        }
        let frame = RenderFrame::capture(&mut world.world, target.camera, target.viewport, self.ticks);
        target.renderer.render(&frame);
        self.ticks += 1;
        let report = TickReport { index: self.ticks, wall_dt, dt, clamped: dt < wall_dt };
        trace!(target: "physics", tick = report.index, dt, clamped = report.clamped, "tick");
        TickOutcome::Ran(report)
    }
}
