use crate::model::{AnimationClipInfo, MeshGeometry, ModelBundle, ModelNode, NodeTransform};
use anyhow::{anyhow, Context as _, Result};
use glam::{Quat, Vec3};
use gltf::mesh::Mode;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to load asset '{file_name}': {reason}")]
pub struct AssetLoadError {
    pub file_name: String,
    pub reason: String,
}

impl AssetLoadError {
    pub fn new(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { file_name: file_name.into(), reason: reason.into() }
    }
}

pub type LoadFuture = Pin<Box<dyn Future<Output = Result<ModelBundle, AssetLoadError>>>>;

/// Where an asset lives relative to the asset root: `<asset_type>/<file_name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetPath {
    pub asset_type: String,
    pub file_name: String,
}

impl AssetPath {
    pub fn new(asset_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self { asset_type: asset_type.into(), file_name: file_name.into() }
    }

    /// Derives the type directory from the file extension (`Cat.glb` -> `glb/Cat.glb`).
    pub fn from_file_name(file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let asset_type = Path::new(&file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Self { asset_type, file_name }
    }

    pub fn relative(&self) -> PathBuf {
        if self.asset_type.is_empty() {
            PathBuf::from(&self.file_name)
        } else {
            Path::new(&self.asset_type).join(&self.file_name)
        }
    }
}

/// Source of model bundles. Loads may complete immediately or after any number of polls.
pub trait ModelLoader {
    fn load(&self, path: &AssetPath) -> LoadFuture;
}

/// Reads glTF/GLB files from disk: node hierarchy, triangle positions and animation clip lengths.
#[derive(Debug, Clone)]
pub struct GltfModelLoader {
    root: PathBuf,
}

impl GltfModelLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &AssetPath) -> PathBuf {
        self.root.join(path.relative())
    }
}

impl ModelLoader for GltfModelLoader {
    fn load(&self, path: &AssetPath) -> LoadFuture {
        let full_path = self.resolve(path);
        let file_name = path.file_name.clone();
        let error_name = file_name.clone();
        spawn_import(file_name, move || {
            import_model(&full_path).map_err(|err| AssetLoadError::new(error_name, format!("{err:#}")))
        })
    }
}

/// Runs `job` on its own worker thread. The returned future stays pending until the job reports back.
pub fn spawn_import<F>(file_name: String, job: F) -> LoadFuture
where
    F: FnOnce() -> Result<ModelBundle, AssetLoadError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let waker: Arc<Mutex<Option<Waker>>> = Arc::new(Mutex::new(None));
    let thread_waker = Arc::clone(&waker);
    let spawned = thread::Builder::new().name(format!("model-import-{file_name}")).spawn(move || {
        // A closed receiver means the placement was dropped; nobody is waiting for the result.
        let _ = tx.send(job());
        if let Some(waker) = thread_waker.lock().ok().and_then(|mut slot| slot.take()) {
            waker.wake();
        }
    });
    if let Err(err) = spawned {
        warn!(target: "placement", file = %file_name, "failed to spawn import worker: {err}");
        let error = AssetLoadError::new(file_name, format!("failed to spawn import worker: {err}"));
        return Box::pin(std::future::ready(Err(error)));
    }
    Box::pin(WorkerLoad { file_name, rx, waker })
}

/// Resolves once the import worker sends its result; pending until then.
struct WorkerLoad {
    file_name: String,
    rx: Receiver<Result<ModelBundle, AssetLoadError>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

impl WorkerLoad {
    fn try_take(&self) -> Option<Result<ModelBundle, AssetLoadError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(AssetLoadError::new(self.file_name.clone(), "import worker exited without a result")))
            }
        }
    }
}

impl Future for WorkerLoad {
    type Output = Result<ModelBundle, AssetLoadError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(result) = this.try_take() {
            return Poll::Ready(result);
        }
        if let Ok(mut slot) = this.waker.lock() {
            *slot = Some(cx.waker().clone());
        }
        // The worker may have finished between the first check and storing the waker.
        match this.try_take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

pub fn import_model(path: &Path) -> Result<ModelBundle> {
    let (document, buffers, _images) =
        gltf::import(path).with_context(|| format!("Failed to import glTF from {}", path.display()))?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("glTF file {} contains no scenes", path.display()))?;

    let mut root = ModelNode::named(scene.name().unwrap_or("model"));
    for node in scene.nodes() {
        root.children.push(convert_node(&node, &buffers)?);
    }

    let mut clips = Vec::new();
    for (index, animation) in document.animations().enumerate() {
        let name = animation.name().map(str::to_string).unwrap_or_else(|| format!("clip{index}"));
        let mut duration = 0.0_f32;
        for channel in animation.channels() {
            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            if let Some(inputs) = reader.read_inputs() {
                duration = inputs.fold(duration, f32::max);
            }
        }
        clips.push(AnimationClipInfo { name, duration });
    }

    debug!(target: "placement", path = %path.display(), nodes = root.node_count(), clips = clips.len(), "glTF imported");
    Ok(ModelBundle { root, clips })
}

fn convert_node(node: &gltf::Node<'_>, buffers: &[gltf::buffer::Data]) -> Result<ModelNode> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = NodeTransform {
        translation: Vec3::from_array(translation),
        rotation: Quat::from_array(rotation).normalize(),
        scale: Vec3::from_array(scale),
    };
    let mesh = match node.mesh() {
        Some(mesh) => read_mesh(&mesh, buffers)?,
        None => None,
    };
    let mut children = Vec::new();
    for child in node.children() {
        children.push(convert_node(&child, buffers)?);
    }
    Ok(ModelNode { name: node.name().map(str::to_string), transform, mesh, children })
}

fn read_mesh(mesh: &gltf::Mesh<'_>, buffers: &[gltf::buffer::Data]) -> Result<Option<MeshGeometry>> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            continue;
        }
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let primitive_positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| anyhow!("Mesh '{}' primitive is missing positions", mesh.name().unwrap_or("unnamed")))?
            .map(Vec3::from_array)
            .collect();
        let base = positions.len() as u32;
        let count = primitive_positions.len() as u32;
        let primitive_indices: Vec<u32> =
            reader.read_indices().map(|read| read.into_u32().collect()).unwrap_or_else(|| (0..count).collect());
        positions.extend(primitive_positions);
        indices.extend(primitive_indices.into_iter().map(|index| base + index));
    }
    if positions.is_empty() {
        return Ok(None);
    }
    Ok(Some(MeshGeometry::new(positions, indices)))
}
