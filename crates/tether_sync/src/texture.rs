//! Texture preparation for materials and lights.
//!
//! Shaders reference texture files by path. Before a render the manager
//! checks that every referenced image can be read and records where the
//! renderer should load it from. Preparation runs on the rayon pool: a
//! full export blocks on it, incremental sync polls for finished jobs and
//! re-translates their owners.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use rayon::prelude::*;
use tether_core::EntityId;
use thiserror::Error;

/// Path written into shaders whose texture failed to prepare.
pub const PLACEHOLDER_TEXTURE: &str = "placeholder.tex";

/// File extensions treated as texture references in string parameters.
const TEXTURE_EXTENSIONS: [&str; 10] = ["tex", "tx", "exr", "png", "jpg", "jpeg", "tif", "tiff", "hdr", "tga"];

/// Errors that can occur during texture preparation.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to load texture: {0}")]
    LoadError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Unsupported texture format: {0}")]
    UnsupportedFormat(String),
}

pub type TextureResult<T> = Result<T, TextureError>;

/// Entity a texture belongs to; re-translated when the texture is ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureOwner {
    Material(EntityId),
    Light(EntityId),
    World,
}

impl fmt::Display for TextureOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureOwner::Material(id) => write!(f, "material:{}", id),
            TextureOwner::Light(id) => write!(f, "light:{}", id),
            TextureOwner::World => f.write_str("world"),
        }
    }
}

/// A texture the renderer can load.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedTexture {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TextureStatus {
    Pending,
    Ready(PreparedTexture),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureRequest {
    pub id: String,
    pub owner: TextureOwner,
    pub param: String,
    /// Expanded source path
    pub source: String,
}

/// One finished preparation job.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureEvent {
    pub id: String,
    pub owner: TextureOwner,
    pub param: String,
    /// Source the job prepared
    pub source: String,
    pub status: TextureStatus,
}

/// Turns a source image into something the renderer can load.
pub trait TexturePreparer: Send + Sync {
    fn prepare(&self, source: &Path) -> TextureResult<PreparedTexture>;
}

/// Validates images by reading their header with the `image` crate.
/// Renderer-native `.tex`/`.tx` files only need to exist.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageHeaderPreparer;

impl TexturePreparer for ImageHeaderPreparer {
    fn prepare(&self, source: &Path) -> TextureResult<PreparedTexture> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "tex" | "tx" => {
                std::fs::metadata(source)?;
                Ok(PreparedTexture {
                    path: source.to_path_buf(),
                    width: 0,
                    height: 0,
                })
            }
            "" => Err(TextureError::UnsupportedFormat(source.display().to_string())),
            _ => {
                let (width, height) = image::image_dimensions(source).map_err(|e| {
                    TextureError::LoadError(format!("Failed to open {}: {}", source.display(), e))
                })?;
                Ok(PreparedTexture {
                    path: source.to_path_buf(),
                    width,
                    height,
                })
            }
        }
    }
}

/// Does a string parameter look like a texture file?
pub fn is_texture_path(value: &str) -> bool {
    Path::new(value)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXTURE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Tracks every texture the exported scene references.
pub struct TextureManager {
    /// Base directory for resolving relative paths
    base_dir: Option<PathBuf>,
    preparer: Arc<dyn TexturePreparer>,
    requests: BTreeMap<String, TextureRequest>,
    status: HashMap<String, TextureStatus>,
    queued: Vec<String>,
    result_tx: mpsc::Sender<TextureEvent>,
    result_rx: mpsc::Receiver<TextureEvent>,
    in_flight: usize,
}

impl TextureManager {
    pub fn new(preparer: Arc<dyn TexturePreparer>) -> Self {
        let (result_tx, result_rx) = mpsc::channel();
        Self {
            base_dir: None,
            preparer,
            requests: BTreeMap::new(),
            status: HashMap::new(),
            queued: Vec::new(),
            result_tx,
            result_rx,
            in_flight: 0,
        }
    }

    /// Set the base directory for resolving relative paths.
    pub fn set_base_dir(&mut self, base_dir: impl Into<PathBuf>) {
        self.base_dir = Some(base_dir.into());
    }

    /// Register a texture reference and return its id (`owner|param`).
    ///
    /// Re-registering the same source is a no-op; a new source replaces the
    /// old one and queues it for preparation.
    pub fn register(&mut self, owner: TextureOwner, param: &str, source: &str) -> String {
        let id = format!("{}|{}", owner, param);
        if self.requests.get(&id).is_some_and(|r| r.source == source) {
            return id;
        }

        log::debug!("Texture {} -> {}", id, source);
        self.requests.insert(
            id.clone(),
            TextureRequest {
                id: id.clone(),
                owner,
                param: param.to_string(),
                source: source.to_string(),
            },
        );
        self.status.insert(id.clone(), TextureStatus::Pending);
        if !self.queued.contains(&id) {
            self.queued.push(id.clone());
        }
        id
    }

    /// Path a shader should use for a registered texture.
    ///
    /// Pending textures already point at their final location; failed ones
    /// fall back to [`PLACEHOLDER_TEXTURE`].
    pub fn resolve(&self, id: &str) -> Option<String> {
        let request = self.requests.get(id)?;
        match self.status.get(id) {
            Some(TextureStatus::Ready(prepared)) => Some(prepared.path.to_string_lossy().into_owned()),
            Some(TextureStatus::Failed(_)) => Some(PLACEHOLDER_TEXTURE.to_string()),
            _ => Some(self.resolve_path(&request.source).to_string_lossy().into_owned()),
        }
    }

    pub fn status(&self, id: &str) -> Option<&TextureStatus> {
        self.status.get(id)
    }

    pub fn request(&self, id: &str) -> Option<&TextureRequest> {
        self.requests.get(id)
    }

    /// Forget every texture of an owner.
    pub fn remove_owner(&mut self, owner: TextureOwner) {
        let ids: Vec<String> = self
            .requests
            .values()
            .filter(|r| r.owner == owner)
            .map(|r| r.id.clone())
            .collect();
        for id in ids {
            self.requests.remove(&id);
            self.status.remove(&id);
            self.queued.retain(|q| *q != id);
        }
    }

    /// Number of queued plus in-flight jobs.
    pub fn pending(&self) -> usize {
        self.queued.len() + self.in_flight
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.status.clear();
        self.queued.clear();
    }

    /// Prepare every queued texture.
    ///
    /// Blocking: runs the batch in parallel and returns when all are done,
    /// with their events. Non-blocking: hands each job to the pool and
    /// returns immediately; finished jobs come back from [`poll_events`].
    ///
    /// [`poll_events`]: TextureManager::poll_events
    pub fn prepare_all(&mut self, blocking: bool) -> Vec<TextureEvent> {
        let batch: Vec<TextureRequest> = std::mem::take(&mut self.queued)
            .into_iter()
            .filter_map(|id| self.requests.get(&id).cloned())
            .collect();
        if batch.is_empty() {
            return Vec::new();
        }
        log::info!(
            "Preparing {} texture(s){}",
            batch.len(),
            if blocking { "" } else { " in the background" }
        );

        if blocking {
            let jobs: Vec<(TextureRequest, PathBuf)> = batch
                .into_iter()
                .map(|request| {
                    let path = self.resolve_path(&request.source);
                    (request, path)
                })
                .collect();
            let preparer = self.preparer.as_ref();
            let events: Vec<TextureEvent> = jobs
                .into_par_iter()
                .map(|(request, path)| run_job(preparer, &request, path))
                .collect();
            for event in &events {
                self.record(event);
            }
            return events;
        }

        for request in batch {
            let preparer = Arc::clone(&self.preparer);
            let tx = self.result_tx.clone();
            let path = self.resolve_path(&request.source);
            self.in_flight += 1;
            rayon::spawn(move || {
                let event = run_job(preparer.as_ref(), &request, path);
                let _ = tx.send(event);
            });
        }
        Vec::new()
    }

    /// Drain every job that finished since the last call.
    pub fn poll_events(&mut self) -> Vec<TextureEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.result_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if self.accept(&event) {
                events.push(event);
            }
        }
        events
    }

    /// Block until every in-flight job finished.
    pub fn wait_idle(&mut self) -> Vec<TextureEvent> {
        let mut events = Vec::new();
        while self.in_flight > 0 {
            match self.result_rx.recv() {
                Ok(event) => {
                    self.in_flight -= 1;
                    if self.accept(&event) {
                        events.push(event);
                    }
                }
                Err(_) => break,
            }
        }
        events
    }

    /// Record a finished job unless its request was replaced or removed
    /// while it ran.
    fn accept(&mut self, event: &TextureEvent) -> bool {
        match self.requests.get(&event.id) {
            None => {
                log::trace!("Dropping result for removed texture {}", event.id);
                return false;
            }
            Some(request) if request.source != event.source => {
                log::trace!("Dropping stale result {} for texture {}", event.source, event.id);
                return false;
            }
            Some(_) => {}
        }
        self.record(event);
        true
    }

    fn record(&mut self, event: &TextureEvent) {
        match &event.status {
            TextureStatus::Failed(reason) => log::warn!("Texture {} failed: {}", event.id, reason),
            TextureStatus::Ready(prepared) => log::debug!(
                "Texture {} ready: {} ({}x{})",
                event.id,
                prepared.path.display(),
                prepared.width,
                prepared.height
            ),
            TextureStatus::Pending => {}
        }
        self.status.insert(event.id.clone(), event.status.clone());
    }

    /// Resolve a path relative to the base directory.
    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);

        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(base) = &self.base_dir {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

impl Default for TextureManager {
    fn default() -> Self {
        Self::new(Arc::new(ImageHeaderPreparer))
    }
}

impl fmt::Debug for TextureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureManager")
            .field("base_dir", &self.base_dir)
            .field("textures", &self.requests.len())
            .field("queued", &self.queued.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

fn run_job(preparer: &dyn TexturePreparer, request: &TextureRequest, path: PathBuf) -> TextureEvent {
    let status = match preparer.prepare(&path) {
        Ok(prepared) => TextureStatus::Ready(prepared),
        Err(e) => TextureStatus::Failed(e.to_string()),
    };
    TextureEvent {
        id: request.id.clone(),
        owner: request.owner,
        param: request.param.clone(),
        source: request.source.clone(),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts anything under `ok/`.
    struct FakePreparer;

    impl TexturePreparer for FakePreparer {
        fn prepare(&self, source: &Path) -> TextureResult<PreparedTexture> {
            if source.starts_with("ok") {
                Ok(PreparedTexture {
                    path: source.with_extension("tex"),
                    width: 4,
                    height: 4,
                })
            } else {
                Err(TextureError::LoadError(source.display().to_string()))
            }
        }
    }

    fn manager() -> TextureManager {
        TextureManager::new(Arc::new(FakePreparer))
    }

    #[test]
    fn test_blocking_prepare() {
        let mut textures = manager();
        let good = textures.register(TextureOwner::Material(EntityId(1)), "diffuseColor", "ok/wood.png");
        let bad = textures.register(TextureOwner::Material(EntityId(1)), "bump", "missing/bump.png");
        assert_eq!(textures.pending(), 2);
        assert_eq!(textures.resolve(&good).as_deref(), Some("ok/wood.png"));

        let events = textures.prepare_all(true);
        assert_eq!(events.len(), 2);
        assert_eq!(textures.pending(), 0);
        assert_eq!(textures.resolve(&good).as_deref(), Some("ok/wood.tex"));
        assert_eq!(textures.resolve(&bad).as_deref(), Some(PLACEHOLDER_TEXTURE));
    }

    #[test]
    fn test_register_same_source_is_noop() {
        let mut textures = manager();
        let a = textures.register(TextureOwner::World, "map", "ok/sky.exr");
        textures.prepare_all(true);
        let b = textures.register(TextureOwner::World, "map", "ok/sky.exr");
        assert_eq!(a, b);
        assert_eq!(textures.pending(), 0);

        textures.register(TextureOwner::World, "map", "ok/sky.0002.exr");
        assert_eq!(textures.pending(), 1);
        assert_eq!(textures.status(&a), Some(&TextureStatus::Pending));
    }

    #[test]
    fn test_background_prepare() {
        let mut textures = manager();
        let id = textures.register(TextureOwner::Light(EntityId(3)), "lightColorMap", "ok/hdri.exr");
        assert!(textures.prepare_all(false).is_empty());
        let events = textures.wait_idle();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner, TextureOwner::Light(EntityId(3)));
        assert!(matches!(textures.status(&id), Some(TextureStatus::Ready(_))));
        assert!(textures.poll_events().is_empty());
    }

    #[test]
    fn test_removed_owner_results_dropped() {
        let mut textures = manager();
        textures.register(TextureOwner::Material(EntityId(9)), "map", "ok/a.png");
        textures.prepare_all(false);
        textures.remove_owner(TextureOwner::Material(EntityId(9)));
        assert!(textures.wait_idle().is_empty());
        assert!(textures.is_empty());
    }

    /// Takes a while on anything under `slow/`.
    struct SlowPreparer;

    impl TexturePreparer for SlowPreparer {
        fn prepare(&self, source: &Path) -> TextureResult<PreparedTexture> {
            if source.starts_with("slow") {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            Ok(PreparedTexture {
                path: source.to_path_buf(),
                width: 1,
                height: 1,
            })
        }
    }

    #[test]
    fn test_late_result_for_replaced_source_dropped() {
        let mut textures = TextureManager::new(Arc::new(SlowPreparer));
        let owner = TextureOwner::Material(EntityId(2));
        let id = textures.register(owner, "diffuseColor", "slow/wood.0001.tex");
        textures.prepare_all(false);

        // Frame change: the same slot now points at the next frame's file
        textures.register(owner, "diffuseColor", "fast/wood.0002.tex");
        textures.prepare_all(false);
        let events = textures.wait_idle();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "fast/wood.0002.tex");
        assert_eq!(textures.pending(), 0);
        assert_eq!(textures.resolve(&id).as_deref(), Some("fast/wood.0002.tex"));
    }

    #[test]
    fn test_base_dir() {
        let mut textures = manager();
        textures.set_base_dir("/show/tex");
        let id = textures.register(TextureOwner::World, "map", "sky.exr");
        assert_eq!(textures.resolve(&id).as_deref(), Some("/show/tex/sky.exr"));
    }

    #[test]
    fn test_texture_path_detection() {
        assert!(is_texture_path("wood.<f4>.png"));
        assert!(is_texture_path("a/b/c.TEX"));
        assert!(!is_texture_path("label"));
        assert!(!is_texture_path("scene.rib"));
    }

    #[test]
    fn test_header_preparer_missing_file() {
        let result = ImageHeaderPreparer.prepare(Path::new("does/not/exist.png"));
        assert!(result.is_err());
        let result = ImageHeaderPreparer.prepare(Path::new("does/not/exist.tex"));
        assert!(matches!(result, Err(TextureError::Io(_))));
    }
}
