//! In-process platform used by the `simulate` command and by the test suite.
//!
//! Every adapter writes what it was asked to do into a shared [`Journal`],
//! so callers can assert on ordering without reaching into the session.

use crate::core::preparator::PLACEHOLDER_URL;
use crate::domain::channel::AnchorBus;
use crate::domain::events::{AnalyticsEvent, AnalyticsKind};
use crate::domain::model::{Dimensions, TargetAsset, TargetKind};
use crate::domain::ports::{
    AnalyticsSink, AssetFetcher, CameraAccess, CameraError, EngineError, EngineFactory, EngineInstance,
    EngineOptions, FacingMode, GeometryId, LibraryHost, LibraryPresence, MaterialId, MediaFactory,
    MediaHandle, MediaStream, MeshId, MountPoint, PlatformError, PlatformResult, Platform, PlayError,
    Renderer, TextureId, TrackingEngine, VideoElement,
};
use crate::utils::error::{ArError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const SIM_TRACKING_VERSION: &str = "1.2.5";
pub const SIM_RENDERING_VERSION: &str = "0.150.0";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Journal

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Substring match over every entry.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.0).iter().any(|e| e.contains(needle))
    }

    /// Entries whose operation name is exactly `op` (arguments after a space are ignored).
    pub fn count(&self, op: &str) -> usize {
        lock(&self.0).iter().filter(|e| op_name(e) == op).count()
    }

    /// Index of the first entry for each operation, `usize::MAX` when absent.
    pub fn positions(&self, ops: &[&str]) -> Vec<usize> {
        let entries = lock(&self.0);
        ops.iter()
            .map(|op| entries.iter().position(|e| op_name(e) == *op).unwrap_or(usize::MAX))
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

fn op_name(entry: &str) -> &str {
    entry.split_once(' ').map(|(op, _)| op).unwrap_or(entry)
}

// ---------------------------------------------------------------------------
// Libraries

pub struct SimLibraryHost {
    journal: Journal,
    ready_after: Option<u32>,
    fallback_works: bool,
    probes: AtomicU32,
    fallback_loaded: AtomicBool,
}

impl SimLibraryHost {
    /// Both engines registered from the first probe.
    pub fn ready(journal: Journal) -> Self {
        Self::ready_after(journal, 1)
    }

    pub fn ready_after(journal: Journal, probes: u32) -> Self {
        Self {
            journal,
            ready_after: Some(probes),
            fallback_works: false,
            probes: AtomicU32::new(0),
            fallback_loaded: AtomicBool::new(false),
        }
    }

    /// Never registered by the page; only the fallback source can help.
    pub fn missing(journal: Journal, fallback_works: bool) -> Self {
        Self {
            journal,
            ready_after: None,
            fallback_works,
            probes: AtomicU32::new(0),
            fallback_loaded: AtomicBool::new(false),
        }
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LibraryHost for SimLibraryHost {
    fn probe(&self) -> LibraryPresence {
        let probe = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        let present = self.fallback_loaded.load(Ordering::SeqCst)
            || self.ready_after.map(|n| probe >= n).unwrap_or(false);
        if present {
            LibraryPresence {
                tracking: Some(SIM_TRACKING_VERSION.to_string()),
                rendering: Some(SIM_RENDERING_VERSION.to_string()),
            }
        } else {
            LibraryPresence::default()
        }
    }

    async fn load_from(&self, source_url: &str) -> PlatformResult<()> {
        self.journal.record(format!("libraries.load_from {}", source_url));
        if self.fallback_works {
            self.fallback_loaded.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(PlatformError::new(format!("script {} failed to load", source_url)))
        }
    }
}

// ---------------------------------------------------------------------------
// Assets

/// URL → bytes map standing in for the network.
#[derive(Default)]
pub struct MemoryFetcher {
    assets: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        lock(&self.assets).insert(url.into(), bytes);
        self
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        lock(&self.assets).get(url).cloned().ok_or_else(|| {
            ArError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no asset registered for {}", url),
            ))
        })
    }
}

/// Gradient PNG of the requested size.
pub fn sample_png(width: u32, height: u32) -> Result<Vec<u8>> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Minimal msgpack map that passes the precompiled-target signature check.
pub fn sample_precompiled() -> Vec<u8> {
    let mut bytes = vec![0x81, 0xa4, b'd', b'a', b't', b'a', 0xc4, 0x10];
    bytes.extend(std::iter::repeat(0x2a).take(16));
    bytes
}

// ---------------------------------------------------------------------------
// Mount point & camera

pub struct SimMount {
    id: String,
    journal: Journal,
    size: Dimensions,
    zero_checks: u32,
    checks: AtomicU32,
}

impl SimMount {
    pub fn new(id: impl Into<String>, journal: Journal) -> Self {
        Self {
            id: id.into(),
            journal,
            size: Dimensions::new(640, 480),
            zero_checks: 0,
            checks: AtomicU32::new(0),
        }
    }

    /// The first `checks` measurements report 0x0.
    pub fn with_zero_checks(mut self, checks: u32) -> Self {
        self.zero_checks = checks;
        self
    }

    pub fn with_size(mut self, size: Dimensions) -> Self {
        self.size = size;
        self
    }

    pub fn size_checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

impl MountPoint for SimMount {
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> Dimensions {
        let check = self.checks.fetch_add(1, Ordering::SeqCst);
        let size = if check < self.zero_checks {
            Dimensions::new(0, 0)
        } else {
            self.size
        };
        self.journal.record(format!("mount.size {}", size));
        size
    }

    fn normalize_layout(&mut self) -> PlatformResult<()> {
        self.journal.record("mount.normalize_layout");
        Ok(())
    }

    fn detach_injected(&mut self) -> PlatformResult<()> {
        self.journal.record("mount.detach_injected");
        Ok(())
    }
}

pub struct SimStream {
    journal: Journal,
}

impl MediaStream for SimStream {
    fn stop_tracks(&mut self) {
        self.journal.record("camera.stop_tracks");
    }
}

pub struct SimCamera {
    journal: Journal,
    denied: bool,
    /// `None` means every facing mode is available.
    available: Option<Vec<FacingMode>>,
}

impl SimCamera {
    pub fn granted(journal: Journal) -> Self {
        Self {
            journal,
            denied: false,
            available: None,
        }
    }

    pub fn denied(journal: Journal) -> Self {
        Self {
            journal,
            denied: true,
            available: None,
        }
    }

    /// Only the listed cameras exist; an empty list means no camera at all.
    pub fn only(journal: Journal, available: Vec<FacingMode>) -> Self {
        Self {
            journal,
            denied: false,
            available: Some(available),
        }
    }
}

#[async_trait]
impl CameraAccess for SimCamera {
    async fn request(&self, facing: FacingMode) -> std::result::Result<Box<dyn MediaStream>, CameraError> {
        self.journal.record(format!("camera.request {:?}", facing));
        if self.denied {
            return Err(CameraError::Denied("NotAllowedError".to_string()));
        }
        let found = match &self.available {
            None => true,
            Some(list) if facing == FacingMode::Any => !list.is_empty(),
            Some(list) => list.contains(&facing),
        };
        if !found {
            return Err(CameraError::NotFound(format!("OverconstrainedError: {:?}", facing)));
        }
        Ok(Box::new(SimStream {
            journal: self.journal.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Tracking engine

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineScript {
    Start,
    Malformed,
    InitFail,
    /// `start()` never resolves.
    Hang,
    /// `start()` resolves after the given delay.
    Delay(Duration),
}

pub struct SimEngine {
    journal: Journal,
    behavior: EngineScript,
    stop_fails: bool,
}

impl SimEngine {
    pub fn running(journal: Journal) -> Self {
        Self::scripted(journal, EngineScript::Start)
    }

    pub fn failing_stop(journal: Journal) -> Self {
        Self {
            stop_fails: true,
            ..Self::running(journal)
        }
    }

    pub fn scripted(journal: Journal, behavior: EngineScript) -> Self {
        Self {
            journal,
            behavior,
            stop_fails: false,
        }
    }
}

#[async_trait]
impl TrackingEngine for SimEngine {
    async fn start(&mut self) -> std::result::Result<(), EngineError> {
        self.journal.record("engine.start");
        match &self.behavior {
            EngineScript::Hang => std::future::pending().await,
            EngineScript::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                self.journal.record("engine.started");
                Ok(())
            }
            _ => {
                self.journal.record("engine.started");
                Ok(())
            }
        }
    }

    async fn stop(&mut self) -> PlatformResult<()> {
        self.journal.record("engine.stop");
        if self.stop_fails {
            Err(PlatformError::new("camera track refused to stop"))
        } else {
            Ok(())
        }
    }
}

/// What the factory was asked to build.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineAttempt {
    pub source_url: String,
    pub kind: TargetKind,
    pub placeholder: bool,
    pub simplified: bool,
    pub payload_addr: usize,
}

pub struct SimEngineFactory {
    journal: Journal,
    script: Mutex<VecDeque<EngineScript>>,
    corrupt_targets: bool,
    renderer_fail_on: Option<String>,
    attempts: Mutex<Vec<EngineAttempt>>,
    last_bus: Mutex<Option<AnchorBus>>,
}

impl SimEngineFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            script: Mutex::new(VecDeque::new()),
            corrupt_targets: false,
            renderer_fail_on: None,
            attempts: Mutex::new(Vec::new()),
            last_bus: Mutex::new(None),
        }
    }

    /// Outcomes consumed one per `create`; afterwards every engine starts normally.
    pub fn with_script(self, script: Vec<EngineScript>) -> Self {
        *lock(&self.script) = script.into();
        self
    }

    /// Reject every real target as malformed; the placeholder still works.
    pub fn with_corrupt_targets(mut self) -> Self {
        self.corrupt_targets = true;
        self
    }

    pub fn with_renderer_failure(mut self, op: impl Into<String>) -> Self {
        self.renderer_fail_on = Some(op.into());
        self
    }

    pub fn attempts(&self) -> Vec<EngineAttempt> {
        lock(&self.attempts).clone()
    }

    pub fn last_bus(&self) -> Option<AnchorBus> {
        lock(&self.last_bus).clone()
    }
}

impl EngineFactory for SimEngineFactory {
    fn create(
        &self,
        target: &TargetAsset,
        options: &EngineOptions,
        anchors: AnchorBus,
    ) -> std::result::Result<EngineInstance, EngineError> {
        self.journal.record(format!("engine.create {}", target.source_url()));
        lock(&self.attempts).push(EngineAttempt {
            source_url: target.source_url().to_string(),
            kind: target.kind(),
            placeholder: target.is_placeholder(),
            simplified: options.simplified,
            payload_addr: target.payload().as_ptr() as usize,
        });

        let scripted = lock(&self.script).pop_front();
        let behavior = match scripted {
            Some(step) => step,
            None if self.corrupt_targets && target.source_url() != PLACEHOLDER_URL => EngineScript::Malformed,
            None => EngineScript::Start,
        };

        match behavior {
            EngineScript::Malformed => Err(EngineError::MalformedBuffer(format!(
                "RangeError: offset is out of bounds ({})",
                target.source_url()
            ))),
            EngineScript::InitFail => Err(EngineError::Init("WebGL context could not be created".to_string())),
            behavior => {
                *lock(&self.last_bus) = Some(anchors);
                let mut renderer = SimRenderer::new(self.journal.clone());
                if let Some(op) = &self.renderer_fail_on {
                    renderer.fail_on(op);
                }
                Ok(EngineInstance {
                    tracker: Box::new(SimEngine::scripted(self.journal.clone(), behavior)),
                    renderer: Box::new(renderer),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer

pub struct SimRenderer {
    journal: Journal,
    next_id: u64,
    live: HashSet<(&'static str, u64)>,
    visible: HashMap<u64, bool>,
    scales: HashMap<u64, f32>,
    fail_on: HashSet<String>,
    disposed: bool,
}

impl SimRenderer {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            next_id: 1,
            live: HashSet::new(),
            visible: HashMap::new(),
            scales: HashMap::new(),
            fail_on: HashSet::new(),
            disposed: false,
        }
    }

    /// Make the named operation fail from now on.
    pub fn fail_on(&mut self, op: &str) {
        self.fail_on.insert(op.to_string());
    }

    pub fn is_visible(&self, mesh: MeshId) -> Option<bool> {
        self.visible.get(&mesh.0).copied()
    }

    pub fn scale_of(&self, mesh: MeshId) -> Option<f32> {
        self.scales.get(&mesh.0).copied()
    }

    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    fn call(&mut self, op: &str) -> PlatformResult<()> {
        self.journal.record(format!("renderer.{}", op));
        if self.fail_on.contains(op) {
            return Err(PlatformError::new(format!("{} failed", op)));
        }
        Ok(())
    }

    fn allocate(&mut self, kind: &'static str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert((kind, id));
        id
    }

    fn release(&mut self, kind: &'static str, id: u64) -> PlatformResult<()> {
        if self.live.remove(&(kind, id)) {
            Ok(())
        } else {
            self.journal.record(format!("renderer.error double free: {} {}", kind, id));
            Err(PlatformError::new(format!("{} {} already released", kind, id)))
        }
    }
}

impl Renderer for SimRenderer {
    fn create_video_texture(&mut self, _video: MediaHandle) -> PlatformResult<TextureId> {
        self.call("create_video_texture")?;
        Ok(TextureId(self.allocate("texture")))
    }

    fn create_material(&mut self, _texture: TextureId) -> PlatformResult<MaterialId> {
        self.call("create_material")?;
        Ok(MaterialId(self.allocate("material")))
    }

    fn create_plane_geometry(&mut self, _width: f32, _height: f32) -> PlatformResult<GeometryId> {
        self.call("create_plane_geometry")?;
        Ok(GeometryId(self.allocate("geometry")))
    }

    fn create_mesh(&mut self, _geometry: GeometryId, _material: MaterialId) -> PlatformResult<MeshId> {
        self.call("create_mesh")?;
        let id = self.allocate("mesh");
        self.visible.insert(id, true);
        Ok(MeshId(id))
    }

    fn attach_to_anchor(&mut self, _mesh: MeshId, _anchor_index: usize) -> PlatformResult<()> {
        self.call("attach_to_anchor")
    }

    fn set_visible(&mut self, mesh: MeshId, visible: bool) {
        self.journal.record(format!("renderer.set_visible {}", visible));
        self.visible.insert(mesh.0, visible);
    }

    fn set_scale(&mut self, mesh: MeshId, scale: f32) {
        self.journal.record(format!("renderer.set_scale {:.3}", scale));
        self.scales.insert(mesh.0, scale);
    }

    fn dispose_texture(&mut self, texture: TextureId) -> PlatformResult<()> {
        self.call("dispose_texture")?;
        self.release("texture", texture.0)
    }

    fn dispose_material(&mut self, material: MaterialId) -> PlatformResult<()> {
        self.call("dispose_material")?;
        self.release("material", material.0)
    }

    fn remove_mesh(&mut self, mesh: MeshId) -> PlatformResult<()> {
        self.call("remove_mesh")?;
        self.visible.remove(&mesh.0);
        self.release("mesh", mesh.0)
    }

    fn dispose_geometry(&mut self, geometry: GeometryId) -> PlatformResult<()> {
        self.call("dispose_geometry")?;
        self.release("geometry", geometry.0)
    }

    fn dispose(&mut self) -> PlatformResult<()> {
        self.call("dispose")?;
        if std::mem::replace(&mut self.disposed, true) {
            self.journal.record("renderer.error double free: context");
            return Err(PlatformError::new("context already disposed"));
        }
        if !self.live.is_empty() {
            self.journal
                .record(format!("renderer.leak {} handle(s) still live", self.live.len()));
        }
        Ok(())
    }

    fn detach_canvas(&mut self) -> PlatformResult<()> {
        self.call("detach_canvas")
    }
}

// ---------------------------------------------------------------------------
// Media

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayPolicy {
    Allow,
    /// Only muted playback may start without a gesture.
    MutedOnly,
    Deny,
}

#[derive(Debug)]
struct VideoState {
    time: f64,
    muted: bool,
    playing: bool,
    has_source: bool,
}

/// Cloning shares the same underlying element.
#[derive(Clone)]
pub struct SimVideo {
    id: u64,
    policy: AutoplayPolicy,
    journal: Journal,
    state: Arc<Mutex<VideoState>>,
}

impl SimVideo {
    pub fn new(id: u64, policy: AutoplayPolicy, journal: Journal) -> Self {
        Self {
            id,
            policy,
            journal,
            state: Arc::new(Mutex::new(VideoState {
                time: 0.0,
                muted: false,
                playing: false,
                has_source: true,
            })),
        }
    }

    /// Move the playhead as if the video had been playing for `seconds`.
    pub fn advance(&self, seconds: f64) {
        let mut state = lock(&self.state);
        if state.playing {
            state.time += seconds;
        }
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn has_source(&self) -> bool {
        lock(&self.state).has_source
    }
}

#[async_trait]
impl VideoElement for SimVideo {
    fn handle(&self) -> MediaHandle {
        MediaHandle(self.id)
    }

    async fn play(&mut self) -> std::result::Result<(), PlayError> {
        self.journal.record("video.play");
        let mut state = lock(&self.state);
        if !state.has_source {
            return Err(PlayError::Failed("no source".to_string()));
        }
        let allowed = match self.policy {
            AutoplayPolicy::Allow => true,
            AutoplayPolicy::MutedOnly => state.muted,
            AutoplayPolicy::Deny => false,
        };
        if !allowed {
            return Err(PlayError::NotAllowed(
                "play() failed because the user didn't interact with the document first".to_string(),
            ));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.journal.record("video.pause");
        lock(&self.state).playing = false;
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).time
    }

    fn seek(&mut self, seconds: f64) {
        self.journal.record(format!("video.seek {:.3}", seconds));
        lock(&self.state).time = seconds;
    }

    fn set_muted(&mut self, muted: bool) {
        self.journal.record(format!("video.set_muted {}", muted));
        lock(&self.state).muted = muted;
    }

    fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    fn clear_source(&mut self) {
        self.journal.record("video.clear_source");
        let mut state = lock(&self.state);
        state.has_source = false;
        state.playing = false;
    }
}

pub struct SimMediaFactory {
    journal: Journal,
    policy: AutoplayPolicy,
    next_id: AtomicU64,
    videos: Mutex<Vec<SimVideo>>,
}

impl SimMediaFactory {
    pub fn new(journal: Journal, policy: AutoplayPolicy) -> Self {
        Self {
            journal,
            policy,
            next_id: AtomicU64::new(1),
            videos: Mutex::new(Vec::new()),
        }
    }

    pub fn last_video(&self) -> Option<SimVideo> {
        lock(&self.videos).last().cloned()
    }

    pub fn created(&self) -> usize {
        lock(&self.videos).len()
    }
}

impl MediaFactory for SimMediaFactory {
    fn create_video(&self, source_url: &str, looped: bool) -> Box<dyn VideoElement> {
        self.journal
            .record(format!("media.create_video {} loop={}", source_url, looped));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let video = SimVideo::new(id, self.policy, self.journal.clone());
        lock(&self.videos).push(video.clone());
        Box::new(video)
    }
}

// ---------------------------------------------------------------------------
// Analytics

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        lock(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<AnalyticsKind> {
        lock(&self.events).iter().map(|e| e.kind).collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        lock(&self.events).push(event);
    }
}

// ---------------------------------------------------------------------------
// Builder

/// Concrete handles to every simulated adapter, plus the [`Platform`] view of them.
pub struct SimulatedPlatform {
    pub journal: Journal,
    pub libraries: Arc<SimLibraryHost>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub camera: Arc<SimCamera>,
    pub engines: Arc<SimEngineFactory>,
    pub media: Arc<SimMediaFactory>,
    pub analytics: Arc<RecordingAnalytics>,
}

impl SimulatedPlatform {
    /// Libraries present, camera granted, autoplay allowed, every engine starts.
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        let journal = Journal::default();
        Self {
            libraries: Arc::new(SimLibraryHost::ready(journal.clone())),
            fetcher,
            camera: Arc::new(SimCamera::granted(journal.clone())),
            engines: Arc::new(SimEngineFactory::new(journal.clone())),
            media: Arc::new(SimMediaFactory::new(journal.clone(), AutoplayPolicy::Allow)),
            analytics: Arc::new(RecordingAnalytics::default()),
            journal,
        }
    }

    pub fn with_libraries(mut self, build: impl FnOnce(Journal) -> SimLibraryHost) -> Self {
        self.libraries = Arc::new(build(self.journal.clone()));
        self
    }

    pub fn with_camera(mut self, build: impl FnOnce(Journal) -> SimCamera) -> Self {
        self.camera = Arc::new(build(self.journal.clone()));
        self
    }

    pub fn with_engines(mut self, build: impl FnOnce(SimEngineFactory) -> SimEngineFactory) -> Self {
        self.engines = Arc::new(build(SimEngineFactory::new(self.journal.clone())));
        self
    }

    pub fn with_autoplay(mut self, policy: AutoplayPolicy) -> Self {
        self.media = Arc::new(SimMediaFactory::new(self.journal.clone(), policy));
        self
    }

    pub fn mount(&self, id: &str) -> SimMount {
        SimMount::new(id, self.journal.clone())
    }

    pub fn platform(&self) -> Platform {
        Platform {
            libraries: self.libraries.clone(),
            fetcher: self.fetcher.clone(),
            camera: self.camera.clone(),
            engines: self.engines.clone(),
            media: self.media.clone(),
            analytics: self.analytics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_queries() {
        let journal = Journal::default();
        journal.record("video.play");
        journal.record("video.seek 1.000");
        journal.record("video.play");

        assert_eq!(journal.count("video.play"), 2);
        assert_eq!(journal.count("video.seek"), 1);
        assert!(journal.contains("seek 1.0"));
        assert_eq!(journal.positions(&["video.seek", "video.pause"]), vec![1, usize::MAX]);
    }

    #[test]
    fn test_renderer_reports_double_free() {
        let journal = Journal::default();
        let mut renderer = SimRenderer::new(journal.clone());
        let texture = renderer.create_video_texture(MediaHandle(1)).unwrap();
        assert!(renderer.dispose_texture(texture).is_ok());
        assert!(renderer.dispose_texture(texture).is_err());
        assert!(journal.contains("double free"));
    }

    #[tokio::test]
    async fn test_video_autoplay_policies() {
        let journal = Journal::default();
        let mut muted_only = SimVideo::new(1, AutoplayPolicy::MutedOnly, journal.clone());
        assert!(matches!(muted_only.play().await, Err(PlayError::NotAllowed(_))));
        muted_only.set_muted(true);
        assert!(muted_only.play().await.is_ok());

        let mut denied = SimVideo::new(2, AutoplayPolicy::Deny, journal);
        denied.set_muted(true);
        assert!(denied.play().await.is_err());
    }

    #[tokio::test]
    async fn test_camera_fallback_availability() {
        let camera = SimCamera::only(Journal::default(), vec![FacingMode::User]);
        assert!(matches!(
            camera.request(FacingMode::Environment).await,
            Err(CameraError::NotFound(_))
        ));
        assert!(camera.request(FacingMode::Any).await.is_ok());

        let none = SimCamera::only(Journal::default(), vec![]);
        assert!(none.request(FacingMode::Any).await.is_err());
    }

    #[test]
    fn test_mount_zero_checks() {
        let mount = SimMount::new("m", Journal::default()).with_zero_checks(2);
        assert!(mount.size().is_zero());
        assert!(mount.size().is_zero());
        assert_eq!(mount.size(), Dimensions::new(640, 480));
        assert_eq!(mount.size_checks(), 3);
    }

    #[test]
    fn test_sample_precompiled_passes_signature() {
        assert!(crate::core::preparator::check_precompiled_signature(&sample_precompiled()).is_ok());
    }
}
