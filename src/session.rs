use crate::assets::{AssetLoadError, LoadFuture, ModelLoader};
use crate::binding::EntityId;
use crate::camera3d::{Camera3D, CameraRig};
use crate::catalog::{AssetCatalog, DropEvent, PlacedAsset};
use crate::character::{CharacterController, ControlOutcome};
use crate::config::EngineConfig;
use crate::events::{EventBus, SessionEvent};
use crate::input::{Input, InputEvent};
use crate::listeners::{ListenerKind, ListenerScope, SharedListenerHost};
use crate::model::ModelBundle;
use crate::placement::{instantiate, resolve_drop_point, PlacementError, PlacementRequest, PlacementSettings, ResolvedPoint};
use crate::render::SceneRenderer;
use crate::step_loop::{FrameTarget, LoopState, StepLoop, TickOutcome};
use crate::world::WorldPair;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use tracing::{debug, info, warn};
use uuid::Uuid;
use winit::dpi::PhysicalSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlacementTicket(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed { ticket: PlacementTicket, id: EntityId },
    Failed { ticket: PlacementTicket, error: PlacementError },
    /// The load finished after its session ended or after its store record changed.
    Discarded { ticket: PlacementTicket, file_name: String },
}

impl PlacementOutcome {
    pub fn ticket(&self) -> PlacementTicket {
        match self {
            PlacementOutcome::Placed { ticket, .. }
            | PlacementOutcome::Failed { ticket, .. }
            | PlacementOutcome::Discarded { ticket, .. } => *ticket,
        }
    }

    pub fn placed(&self) -> Option<EntityId> {
        match self {
            PlacementOutcome::Placed { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlacementOrigin {
    Direct,
    Synced(usize),
}

struct PendingPlacement {
    ticket: PlacementTicket,
    session_id: Uuid,
    request: PlacementRequest,
    point: ResolvedPoint,
    future: LoadFuture,
    origin: PlacementOrigin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyncState {
    Pending(PlacementTicket),
    Placed(EntityId),
    Failed,
}

#[derive(Clone, Debug)]
struct SyncSlot {
    record: PlacedAsset,
    state: SyncState,
}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// One viewport: mounts a world pair, feeds it input and placements and drives its step loop.
pub struct Session {
    config: EngineConfig,
    loader: Box<dyn ModelLoader>,
    renderer: Box<dyn SceneRenderer>,
    host: SharedListenerHost,
    world: Option<WorldPair>,
    step_loop: StepLoop,
    camera: Camera3D,
    rig: CameraRig,
    viewport: PhysicalSize<u32>,
    input: Input,
    controller: CharacterController,
    catalog: AssetCatalog,
    settings: PlacementSettings,
    pending: Vec<PendingPlacement>,
    synced: Vec<SyncSlot>,
    listeners: Vec<ListenerScope>,
    events: EventBus,
    next_ticket: u64,
}

impl Session {
    pub fn new(
        config: EngineConfig,
        loader: Box<dyn ModelLoader>,
        renderer: Box<dyn SceneRenderer>,
        host: SharedListenerHost,
    ) -> Self {
        let input = match &config.character.bindings_path {
            Some(path) => Input::from_config(path),
            None => Input::new(),
        };
        Self {
            step_loop: StepLoop::new(config.physics.max_frame_delta),
            camera: Camera3D::from_config(&config.camera),
            rig: CameraRig::from_config(&config.camera),
            viewport: PhysicalSize::new(config.viewport.width, config.viewport.height),
            controller: CharacterController::new(&config.character),
            settings: PlacementSettings::from_config(&config),
            catalog: AssetCatalog::builtin(),
            input,
            config,
            loader,
            renderer,
            host,
            world: None,
            pending: Vec::new(),
            synced: Vec::new(),
            listeners: Vec::new(),
            events: EventBus::default(),
            next_ticket: 0,
        }
    }

    pub fn with_catalog(mut self, catalog: AssetCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn is_mounted(&self) -> bool {
        self.world.as_ref().is_some_and(WorldPair::is_live)
    }

    /// Creates and configures the world pair, registers listeners and starts the loop.
    /// Returns false when already mounted.
    pub fn mount(&mut self) -> bool {
        if self.is_mounted() {
            return false;
        }
        let mut world = WorldPair::new(self.config.physics.params());
        world.configure(self.config.stage.environment(), &self.config.stage);
        self.listeners = vec![
            ListenerScope::register(&self.host, ListenerKind::Resize),
            ListenerScope::register(&self.host, ListenerKind::Key),
        ];
        self.camera = Camera3D::from_config(&self.config.camera);
        self.input.release_all();
        self.step_loop = StepLoop::new(self.config.physics.max_frame_delta);
        self.step_loop.start();
        info!(
            target: "physics",
            session_id = %world.session_id(),
            width = self.viewport.width,
            height = self.viewport.height,
            "session mounted"
        );
        self.world = Some(world);
        true
    }

    /// Stops the loop and destroys every entity, node and body. In-flight loads stay pending and are
    /// discarded when they resolve.
    pub fn unmount(&mut self) -> bool {
        let Some(mut world) = self.world.take() else {
            return false;
        };
        self.step_loop.stop();
        for event in world.drain_events() {
            self.events.push(event);
        }
        world.teardown();
        self.listeners.clear();
        self.controller.detach();
        self.input.release_all();
        self.synced.clear();
        info!(target: "physics", pending = self.pending.len(), "session unmounted");
        true
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = PhysicalSize::new(width, height);
        debug!(target: "input", width, height, "viewport resized");
    }

    /// Routes a window event to the viewport or the character. Ignored while unmounted.
    pub fn handle_input(&mut self, event: &InputEvent) -> Vec<ControlOutcome> {
        if !self.is_mounted() {
            return Vec::new();
        }
        if let InputEvent::Resize { width, height } = event {
            self.resize(*width, *height);
            return Vec::new();
        }
        let changed = self.input.push(event);
        let Some(world) = self.world.as_mut() else {
            return Vec::new();
        };
        changed
            .into_iter()
            .map(|(action, pressed)| self.controller.handle_action(world, &self.input, action, pressed))
            .collect()
    }

    fn with_catalog_defaults(&self, mut request: PlacementRequest) -> PlacementRequest {
        if let Some(entry) = self.catalog.by_name(&request.file_name) {
            request.scale = request.scale.or(entry.scale);
            request.y_offset = request.y_offset.or(entry.y_diff);
            request.character |= entry.can_be_character;
        }
        request
    }

    /// Resolves the drop point now and starts the load; the entity appears on a later frame.
    pub fn request_placement(&mut self, request: PlacementRequest) -> Result<PlacementTicket, PlacementError> {
        self.start_placement(request, PlacementOrigin::Direct)
    }

    fn start_placement(
        &mut self,
        request: PlacementRequest,
        origin: PlacementOrigin,
    ) -> Result<PlacementTicket, PlacementError> {
        let request = self.with_catalog_defaults(request);
        let world = self.world.as_mut().filter(|world| world.is_live()).ok_or(PlacementError::NotMounted)?;
        let point = resolve_drop_point(world, &self.camera, self.viewport, request.screen_position, &self.settings);
        let session_id = world.session_id();
        let future = self.loader.load(&request.asset_path());
        self.next_ticket += 1;
        let ticket = PlacementTicket(self.next_ticket);
        debug!(
            target: "placement",
            ticket = ticket.0,
            file = %request.file_name,
            source = ?point.source,
            point = ?point.position,
            "placement requested"
        );
        self.pending.push(PendingPlacement { ticket, session_id, request, point, future, origin });
        Ok(ticket)
    }

    /// Polls every in-flight load once and registers those that finished, in completion order.
    pub fn poll_placements(&mut self) -> Vec<PlacementOutcome> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let waker = Waker::from(Arc::new(NoopWake));
        let mut cx = Context::from_waker(&waker);
        let mut outcomes = Vec::new();
        let mut still_pending = Vec::new();
        for mut pending in std::mem::take(&mut self.pending) {
            match pending.future.as_mut().poll(&mut cx) {
                Poll::Pending => still_pending.push(pending),
                Poll::Ready(loaded) => outcomes.push(self.resolve_pending(pending, loaded)),
            }
        }
        self.pending = still_pending;
        outcomes
    }

    fn resolve_pending(
        &mut self,
        pending: PendingPlacement,
        loaded: Result<ModelBundle, AssetLoadError>,
    ) -> PlacementOutcome {
        let PendingPlacement { ticket, session_id, request, point, origin, .. } = pending;
        if let PlacementOrigin::Synced(index) = origin {
            let wanted = self.synced.get(index).is_some_and(|slot| slot.state == SyncState::Pending(ticket));
            if !wanted {
                debug!(target: "placement", ticket = ticket.0, file = %request.file_name, "superseded load discarded");
                self.events.push(SessionEvent::PlacementDiscarded { file_name: request.file_name.clone() });
                return PlacementOutcome::Discarded { ticket, file_name: request.file_name };
            }
        }
        let result = self.complete_placement(session_id, &request, point, loaded);
        if let PlacementOrigin::Synced(index) = origin {
            if let Some(slot) = self.synced.get_mut(index) {
                slot.state = match &result {
                    Ok(id) => SyncState::Placed(*id),
                    Err(_) => SyncState::Failed,
                };
            }
        }
        match result {
            Ok(id) => PlacementOutcome::Placed { ticket, id },
            Err(PlacementError::SessionEnded { file_name }) => PlacementOutcome::Discarded { ticket, file_name },
            Err(error) => PlacementOutcome::Failed { ticket, error },
        }
    }

    fn complete_placement(
        &mut self,
        session_id: Uuid,
        request: &PlacementRequest,
        point: ResolvedPoint,
        loaded: Result<ModelBundle, AssetLoadError>,
    ) -> Result<EntityId, PlacementError> {
        let file_name = request.file_name.clone();
        let Some(world) =
            self.world.as_mut().filter(|world| world.is_live() && world.session_id() == session_id)
        else {
            info!(target: "placement", file = %file_name, "load finished after its session ended; discarded");
            self.events.push(SessionEvent::PlacementDiscarded { file_name: file_name.clone() });
            return Err(PlacementError::SessionEnded { file_name });
        };
        let placed = loaded
            .map_err(PlacementError::from)
            .and_then(|bundle| instantiate(world, request, point, &bundle, &self.settings));
        match placed {
            Ok(id) => {
                let row = world.entity(id).cloned();
                let position = row
                    .as_ref()
                    .and_then(|row| world.physics().body_pose(row.body))
                    .map_or(point.position, |(position, _)| position);
                if row.is_some_and(|row| row.is_character) {
                    self.controller.attach(id);
                }
                self.events.push(SessionEvent::EntityPlaced { id, file_name, position });
                Ok(id)
            }
            Err(err) => {
                warn!(target: "placement", file = %file_name, "placement failed: {err}");
                self.events.push(SessionEvent::PlacementFailed { file_name, reason: err.to_string() });
                Err(err)
            }
        }
    }

    /// Places one asset and blocks until it is registered or has failed.
    pub fn place(&mut self, request: PlacementRequest) -> Result<EntityId, PlacementError> {
        let request = self.with_catalog_defaults(request);
        let world = self.world.as_mut().filter(|world| world.is_live()).ok_or(PlacementError::NotMounted)?;
        let point = resolve_drop_point(world, &self.camera, self.viewport, request.screen_position, &self.settings);
        let session_id = world.session_id();
        let loaded = pollster::block_on(self.loader.load(&request.asset_path()));
        self.complete_placement(session_id, &request, point, loaded)
    }

    /// Drag-drop entry point. Returns None for drops that map to no request.
    pub fn drop_asset(&mut self, drop: &DropEvent) -> Option<Result<PlacementTicket, PlacementError>> {
        let request = self.catalog.request_for_drop(drop, self.viewport)?;
        Some(self.request_placement(request))
    }

    /// Reconciles placements with the store's records by index. Unchanged records are skipped, changed
    /// ones are re-placed and records that disappeared are removed. Returns the number of new loads.
    pub fn sync_placements(&mut self, records: &[PlacedAsset]) -> Result<usize, PlacementError> {
        if !self.is_mounted() {
            return Err(PlacementError::NotMounted);
        }
        let mut requested = 0;
        for (index, record) in records.iter().enumerate() {
            if let Some(slot) = self.synced.get(index) {
                if slot.record == *record {
                    continue;
                }
                let state = slot.state;
                self.retire_sync_state(state);
            }
            let ticket = self.start_placement(record.to_request(), PlacementOrigin::Synced(index))?;
            let slot = SyncSlot { record: record.clone(), state: SyncState::Pending(ticket) };
            if index < self.synced.len() {
                self.synced[index] = slot;
            } else {
                self.synced.push(slot);
            }
            requested += 1;
        }
        if self.synced.len() > records.len() {
            let stale: Vec<SyncSlot> = self.synced.drain(records.len()..).collect();
            for slot in stale {
                self.retire_sync_state(slot.state);
            }
        }
        debug!(target: "placement", records = records.len(), requested, "placements synced");
        Ok(requested)
    }

    fn retire_sync_state(&mut self, state: SyncState) {
        if let SyncState::Placed(id) = state {
            self.remove_entity(id);
        }
    }

    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(world) = self.world.as_mut() else {
            return false;
        };
        if self.controller.target() == Some(id) {
            self.controller.detach();
        }
        world.remove_entity(id)
    }

    /// One displayed frame: finished loads are registered first, then the world ticks and renders.
    pub fn frame(&mut self, wall_dt: f32) -> TickOutcome {
        self.poll_placements();
        let Some(world) = self.world.as_mut() else {
            return TickOutcome::Skipped(self.step_loop.state());
        };
        let target = FrameTarget {
            renderer: self.renderer.as_mut(),
            camera: &mut self.camera,
            rig: Some(&self.rig),
            viewport: self.viewport,
        };
        let outcome = self.step_loop.tick(world, wall_dt, target);
        for event in world.drain_events() {
            self.events.push(event);
        }
        outcome
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        if let Some(world) = self.world.as_mut() {
            for event in world.drain_events() {
                self.events.push(event);
            }
        }
        self.events.drain()
    }

    pub fn world(&self) -> Option<&WorldPair> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut WorldPair> {
        self.world.as_mut()
    }

    pub fn camera(&self) -> &Camera3D {
        &self.camera
    }

    pub fn viewport(&self) -> PhysicalSize<u32> {
        self.viewport
    }

    pub fn controller(&self) -> &CharacterController {
        &self.controller
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loop_state(&self) -> LoopState {
        self.step_loop.state()
    }

    pub fn ticks(&self) -> u64 {
        self.step_loop.ticks()
    }

    pub fn pending_placements(&self) -> usize {
        self.pending.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unmount();
    }
}
