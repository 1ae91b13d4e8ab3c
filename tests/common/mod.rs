#![allow(dead_code)]

use glam::{Mat4, Vec3};
use scenedrop::assets::{AssetLoadError, AssetPath, LoadFuture, ModelLoader};
use scenedrop::config::EngineConfig;
use scenedrop::listeners::{ListenerHost, ListenerId, ListenerKind, NullListenerHost, SharedListenerHost};
use scenedrop::model::{MeshGeometry, ModelBundle, ModelNode};
use scenedrop::render::{RenderFrame, SceneRenderer};
use scenedrop::Session;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

pub const FRAME_DT: f32 = 1.0 / 60.0;

/// A single cuboid mesh on the root node plus idle/walk/run clips.
pub fn cube_bundle(name: &str, size: Vec3) -> ModelBundle {
    ModelBundle::new(ModelNode::named(name).with_mesh(MeshGeometry::cuboid(size)))
        .with_clip("Idle", 1.0)
        .with_clip("Walk", 1.2)
        .with_clip("Run", 0.8)
}

/// Resolves every load immediately with a cube, sized per file name when configured.
#[derive(Clone, Default)]
pub struct CubeLoader {
    sizes: HashMap<String, Vec3>,
    loads: Rc<Cell<usize>>,
}

impl CubeLoader {
    pub const DEFAULT_SIZE: Vec3 = Vec3::new(1.0, 2.0, 1.0);

    pub fn with_size(mut self, file_name: &str, size: Vec3) -> Self {
        self.sizes.insert(file_name.to_string(), size);
        self
    }

    pub fn loads(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.loads)
    }
}

impl ModelLoader for CubeLoader {
    fn load(&self, path: &AssetPath) -> LoadFuture {
        self.loads.set(self.loads.get() + 1);
        let size = self.sizes.get(&path.file_name).copied().unwrap_or(Self::DEFAULT_SIZE);
        let bundle = cube_bundle(&path.file_name, size);
        Box::pin(async move { Ok::<_, AssetLoadError>(bundle) })
    }
}

pub struct FailingLoader;

impl ModelLoader for FailingLoader {
    fn load(&self, path: &AssetPath) -> LoadFuture {
        let error = AssetLoadError::new(path.file_name.clone(), "file not found");
        Box::pin(async move { Err::<ModelBundle, _>(error) })
    }
}

/// Loads stay pending until the shared gate opens.
#[derive(Clone, Default)]
pub struct DeferredLoader {
    gate: Rc<Cell<bool>>,
}

impl DeferredLoader {
    pub fn gate(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.gate)
    }
}

struct GatedLoad {
    gate: Rc<Cell<bool>>,
    bundle: Option<ModelBundle>,
}

impl Future for GatedLoad {
    type Output = Result<ModelBundle, AssetLoadError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.gate.get() {
            return Poll::Pending;
        }
        match this.bundle.take() {
            Some(bundle) => Poll::Ready(Ok(bundle)),
            None => Poll::Ready(Err(AssetLoadError::new("gated", "polled after completion"))),
        }
    }
}

impl ModelLoader for DeferredLoader {
    fn load(&self, path: &AssetPath) -> LoadFuture {
        Box::pin(GatedLoad {
            gate: Rc::clone(&self.gate),
            bundle: Some(cube_bundle(&path.file_name, CubeLoader::DEFAULT_SIZE)),
        })
    }
}

#[derive(Clone, Debug)]
pub struct RecordedFrame {
    pub index: u64,
    pub instances: Vec<(bevy_ecs::entity::Entity, Mat4)>,
    pub camera_position: Vec3,
}

/// Keeps a summary of every rendered frame behind a shared handle.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    frames: Rc<RefCell<Vec<RecordedFrame>>>,
}

impl RecordingRenderer {
    pub fn frames(&self) -> Rc<RefCell<Vec<RecordedFrame>>> {
        Rc::clone(&self.frames)
    }
}

impl SceneRenderer for RecordingRenderer {
    fn render(&mut self, frame: &RenderFrame) {
        self.frames.borrow_mut().push(RecordedFrame {
            index: frame.index,
            instances: frame.instances.iter().map(|instance| (instance.node, instance.world)).collect(),
            camera_position: frame.camera_position,
        });
    }
}

/// Tracks which listener ids are currently registered.
#[derive(Default)]
pub struct RecordingHost {
    next: u64,
    pub active: Vec<(ListenerId, ListenerKind)>,
    pub removed: Vec<ListenerId>,
}

impl ListenerHost for RecordingHost {
    fn register(&mut self, kind: ListenerKind) -> ListenerId {
        self.next += 1;
        let id = ListenerId(self.next);
        self.active.push((id, kind));
        id
    }

    fn deregister(&mut self, id: ListenerId) {
        self.active.retain(|(active, _)| *active != id);
        self.removed.push(id);
    }
}

pub fn session_with(loader: impl ModelLoader + 'static) -> (Session, RecordingRenderer) {
    session_with_config(EngineConfig::default(), loader)
}

pub fn session_with_config(config: EngineConfig, loader: impl ModelLoader + 'static) -> (Session, RecordingRenderer) {
    let renderer = RecordingRenderer::default();
    let host: SharedListenerHost = NullListenerHost::shared();
    let mut session = Session::new(config, Box::new(loader), Box::new(renderer.clone()), host);
    assert!(session.mount());
    (session, renderer)
}

pub fn run_frames(session: &mut Session, frames: usize) {
    for _ in 0..frames {
        session.frame(FRAME_DT);
    }
}

pub fn assert_vec3_near(a: Vec3, b: Vec3, epsilon: f32) {
    assert!((a - b).length() <= epsilon, "vectors differed: left={a:?}, right={b:?}, epsilon={epsilon}");
}
