use crate::config::toml_config::SessionConfig;
use crate::core::binder::{OverlayBinder, OverlayBuildError};
use crate::core::capability::CapabilityLoader;
use crate::core::playback::PlaybackSynchronizer;
use crate::core::preparator::{placeholder_target, TargetPreparator};
use crate::core::signal::StopSignal;
use crate::core::state::{DetectionPhase, SessionState};
use crate::core::teardown::{discard_instance, teardown, SessionResources, TeardownReport};
use crate::domain::channel::{AnchorBus, AnchorConcern, AnchorSubscription};
use crate::domain::events::{AnalyticsEvent, AnalyticsKind, LifecycleEvent};
use crate::domain::model::{
    AnchorEvent, CampaignMetadata, Capabilities, Dimensions, PlaybackState, TargetAsset, TargetKind,
};
use crate::domain::ports::{
    CameraError, EngineError, EngineInstance, EngineOptions, FacingMode, MountPoint, Platform,
};
use crate::utils::debug_log::DebugLog;
use crate::utils::error::{ArError, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const LIFECYCLE_CAPACITY: usize = 64;

/// `lastError` 的可複製摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub kind: &'static str,
    pub message: String,
    pub blocking: bool,
    pub recoverable: bool,
}

impl From<&ArError> for ErrorSummary {
    fn from(error: &ArError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            blocking: error.is_blocking(),
            recoverable: error.is_recoverable(),
        }
    }
}

/// session 訂閱的兩個 anchor handler
pub struct AnchorSubscriptions {
    pub overlay: AnchorSubscription,
    pub playback: AnchorSubscription,
}

#[derive(Debug, Default)]
struct Milestones {
    detected: bool,
    playing: bool,
}

enum AttemptFailure {
    /// 目標 bytes 被拒或啟動逾時，換一個目標可能成功
    Corrupt(ArError),
    Init(String),
    Cancelled,
}

impl From<EngineError> for AttemptFailure {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::MalformedBuffer(message) => {
                AttemptFailure::Corrupt(ArError::AssetCorruptionError { message })
            }
            EngineError::Init(message) | EngineError::Start(message) => AttemptFailure::Init(message),
        }
    }
}

/// 綁定在單一掛載點上的 AR session。
///
/// session 擁有它建立的所有引擎、GPU 與媒體 handle，
/// 停止、失敗或重啟時一律經由 teardown 模組釋放。
pub struct Session {
    id: String,
    config: SessionConfig,
    platform: Platform,
    mount: Box<dyn MountPoint>,

    state: SessionState,
    detection: DetectionPhase,
    degraded: bool,
    retry_count: u32,
    max_retries: u32,
    backoff_ms: u64,
    total_backoff_ms: u64,
    last_error: Option<ErrorSummary>,

    campaign: Option<CampaignMetadata>,
    capabilities: Option<Capabilities>,
    target: Option<TargetAsset>,

    resources: SessionResources,
    binder: Option<OverlayBinder>,
    playback: Option<PlaybackSynchronizer>,
    anchors: AnchorBus,
    subscriptions: Option<AnchorSubscriptions>,

    log: DebugLog,
    events: broadcast::Sender<LifecycleEvent>,
    stop: StopSignal,
    milestones: Milestones,
}

impl Session {
    pub fn new(mount: Box<dyn MountPoint>, platform: Platform, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let log = DebugLog::new(config.diagnostics.debug_log_capacity);
        Self {
            id: format!("ar-{}", chrono::Utc::now().timestamp_millis()),
            max_retries: config.retry.max_retries,
            config,
            platform,
            mount,
            state: SessionState::Idle,
            detection: DetectionPhase::Scanning,
            degraded: false,
            retry_count: 0,
            backoff_ms: 0,
            total_backoff_ms: 0,
            last_error: None,
            campaign: None,
            capabilities: None,
            target: None,
            resources: SessionResources::default(),
            binder: None,
            playback: None,
            anchors: AnchorBus::default(),
            subscriptions: None,
            log,
            events,
            stop: StopSignal::new(),
            milestones: Milestones::default(),
        }
    }

    // ------------------------------------------------------------------
    // 存取

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn detection(&self) -> DetectionPhase {
        self.detection
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 最近一次容器重試使用的延遲
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }

    pub fn total_backoff_ms(&self) -> u64 {
        self.total_backoff_ms
    }

    pub fn last_error(&self) -> Option<&ErrorSummary> {
        self.last_error.as_ref()
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    pub fn active_target(&self) -> Option<&TargetAsset> {
        self.target.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn debug_log(&self) -> DebugLog {
        self.log.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn lifecycle_sender(&self) -> broadcast::Sender<LifecycleEvent> {
        self.events.clone()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn anchor_bus(&self) -> &AnchorBus {
        &self.anchors
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback
            .as_ref()
            .map(|p| p.state())
            .unwrap_or(PlaybackState::Stopped)
    }

    pub fn is_muted(&self) -> bool {
        self.playback.as_ref().map(|p| p.is_muted()).unwrap_or(false)
    }

    pub fn needs_tap_to_play(&self) -> bool {
        self.playback.as_ref().map(|p| p.needs_tap_to_play()).unwrap_or(false)
    }

    pub fn overlay_visible(&self) -> bool {
        self.binder.as_ref().map(|b| b.is_visible()).unwrap_or(false)
    }

    pub fn overlay_scale(&self) -> Option<f32> {
        self.binder.as_ref().map(|b| b.scale())
    }

    // ------------------------------------------------------------------
    // 生命週期

    /// 執行完整的初始化流程直到 Ready。
    ///
    /// 失敗時 session 停在 Error (若是停止請求則為 Stopped)，
    /// 已建立的部分資源都會被釋放。
    pub async fn start(&mut self, campaign: CampaignMetadata) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(ArError::InvalidTransition {
                from: self.state.to_string(),
                to: SessionState::LoadingLibraries.to_string(),
            });
        }

        self.log.info(format!(
            "Session {} starting in container '{}'",
            self.id,
            self.mount.id()
        ));
        self.track(AnalyticsEvent::new(&self.id, AnalyticsKind::SessionStart));
        self.campaign = Some(campaign.clone());
        self.anchors = AnchorBus::default();

        match self.initialize(&campaign).await {
            Ok(()) => Ok(()),
            Err(ArError::Cancelled) => {
                self.log.info("Initialization cancelled by stop request");
                self.stop().await;
                Err(ArError::Cancelled)
            }
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// 可重複呼叫。先取消進行中的初始化步驟，再釋放所有資源。
    pub async fn stop(&mut self) {
        self.stop.request();
        let report = self.release_resources().await;

        if self.transition(SessionState::Stopped).is_ok() {
            self.log.info(format!("Session {} stopped", self.id));
            self.emit(LifecycleEvent::Stopped);
        } else if report.is_noop() {
            self.log.debug("Stop requested on an already stopped session");
        }
    }

    /// 完整停止後，以同一份活動資料重新開始
    pub async fn restart(&mut self) -> Result<()> {
        let Some(campaign) = self.campaign.clone() else {
            return Err(ArError::MissingConfigError {
                field: "campaign".to_string(),
            });
        };

        self.log.info(format!("Restarting session {}", self.id));
        self.stop().await;
        self.reset()?;
        self.start(campaign).await
    }

    /// 停止 session 並把掛載點交還給呼叫端
    pub async fn release(mut self) -> Box<dyn MountPoint> {
        self.stop().await;
        self.mount
    }

    async fn initialize(&mut self, campaign: &CampaignMetadata) -> Result<()> {
        // 1. 函式庫
        self.transition(SessionState::LoadingLibraries)?;
        let loader = CapabilityLoader::new(
            self.platform.libraries.clone(),
            self.config.libraries.clone(),
            self.log.clone(),
        );
        let capabilities = with_stop(&self.stop, loader.ensure_libraries()).await??;
        self.capabilities = Some(capabilities);

        // 2. 目標資產
        self.transition(SessionState::ValidatingAsset)?;
        let preparator = TargetPreparator::new(
            self.platform.fetcher.clone(),
            self.config.asset.clone(),
            self.log.clone(),
        );
        let raw = with_stop(
            &self.stop,
            preparator.prepare(&campaign.target_image_url, TargetKind::RawImage),
        )
        .await?;
        let precompiled = match campaign.precompiled_target_url.as_deref() {
            Some(url) => Some(
                with_stop(&self.stop, preparator.prepare(url, TargetKind::PrecompiledTarget)).await?,
            ),
            None => None,
        };

        // 3. 相機權限
        self.transition(SessionState::AcquiringPermission)?;
        self.acquire_camera().await?;

        // 4. 引擎
        self.transition(SessionState::Initializing)?;
        self.wait_for_container().await?;
        // 引擎一啟動就可能送出 anchor 事件，先訂閱；Ready 前收到的會排隊
        self.subscriptions = self.subscribe_anchors();
        let (instance, target) = self.instantiate_engine(raw, precompiled).await?;

        if self.stop.is_requested() {
            self.log.info("Engine started after stop was requested; discarding it");
            discard_instance(instance, self.mount.as_mut(), &self.log).await;
            return Err(ArError::Cancelled);
        }

        self.resources = SessionResources::from_instance(instance);
        self.target = Some(target);
        self.emit(LifecycleEvent::CameraActive);

        if let Err(e) = self.mount.normalize_layout() {
            self.log.warn(format!("Layout normalization failed: {}", e));
        }

        self.bind_overlay(campaign)?;
        self.transition(SessionState::Ready)?;
        self.detection = DetectionPhase::Scanning;

        self.log.info(format!(
            "Session {} ready{} after {} container retr{}",
            self.id,
            if self.degraded { " (degraded)" } else { "" },
            self.retry_count,
            if self.retry_count == 1 { "y" } else { "ies" }
        ));
        self.emit(LifecycleEvent::ArReady {
            degraded: self.degraded,
        });
        Ok(())
    }

    /// 先要求一次相機以觸發權限提示，再釋放探測用的串流
    async fn acquire_camera(&mut self) -> Result<()> {
        let camera = self.platform.camera.clone();
        let preferred = self.config.camera.facing;
        let mut outcome = with_stop(&self.stop, camera.request(preferred)).await?;

        let missing = matches!(outcome, Err(CameraError::NotFound(_)));
        if missing && self.config.camera.fallback_to_any && preferred != FacingMode::Any {
            self.log.warn(format!("No {:?} camera found; trying any camera", preferred));
            outcome = with_stop(&self.stop, camera.request(FacingMode::Any)).await?;
        }

        match outcome {
            Ok(mut stream) => {
                stream.stop_tracks();
                self.log.info("Camera permission granted; probe stream released");
                Ok(())
            }
            Err(CameraError::Denied(message)) => Err(ArError::PermissionDeniedError { message }),
            Err(CameraError::NotFound(message)) | Err(CameraError::Other(message)) => {
                Err(ArError::CameraUnavailableError { message })
            }
        }
    }

    /// 容器尺寸為 0 時以指數退避重新檢查，最多 max_retries 次
    async fn wait_for_container(&mut self) -> Result<()> {
        loop {
            let size = self.mount.size();
            if !size.is_zero() {
                self.log.debug(format!("Container '{}' measured {}", self.mount.id(), size));
                return Ok(());
            }

            if self.retry_count >= self.max_retries {
                return Err(ArError::ContainerNotReadyError {
                    attempts: self.retry_count + 1,
                    width: size.width,
                    height: size.height,
                });
            }

            let delay = self.config.retry.delay_for(self.retry_count);
            self.retry_count += 1;
            self.backoff_ms = delay.as_millis() as u64;
            self.total_backoff_ms += self.backoff_ms;
            self.log.warn(format!(
                "Container '{}' is {}; retry {}/{} in {}ms",
                self.mount.id(),
                size,
                self.retry_count,
                self.max_retries,
                self.backoff_ms
            ));

            with_stop(&self.stop, tokio::time::sleep(delay)).await?;
        }
    }

    /// 依序嘗試每個有效目標，最後才用棋盤格。
    ///
    /// 目標被判定為格式錯誤 (或啟動逾時) 就換下一個；
    /// 引擎初始化失敗則先以簡化設定重試一次。
    async fn instantiate_engine(
        &mut self,
        raw: TargetAsset,
        precompiled: Option<TargetAsset>,
    ) -> Result<(EngineInstance, TargetAsset)> {
        let mut candidates: Vec<TargetAsset> = match (self.config.engine.prefer_precompiled, precompiled) {
            (true, Some(precompiled)) => vec![precompiled, raw],
            (_, precompiled) => std::iter::once(raw).chain(precompiled).collect(),
        };

        let total = candidates.len();
        candidates.retain(|candidate| {
            if !candidate.is_valid() {
                self.log.warn(format!(
                    "Skipping {} target {}: failed validation",
                    kind_label(candidate.kind()),
                    candidate.source_url()
                ));
            }
            candidate.is_valid()
        });

        let single_candidate = candidates.len() == 1;
        let mut corrupted = candidates.len() < total;
        let mut queue: VecDeque<TargetAsset> = candidates.into();
        let mut options = self.config.engine.options();
        let mut simplified = false;
        let mut fresh_copy_used = false;
        let mut init_failure = None;

        while let Some(target) = queue.pop_front() {
            match self.attempt_engine(&target, &options).await {
                Ok(instance) => return Ok((instance, target)),
                Err(AttemptFailure::Cancelled) => return Err(ArError::Cancelled),
                Err(AttemptFailure::Corrupt(error)) => {
                    corrupted = true;
                    self.note_recoverable(&error);
                    if single_candidate
                        && !fresh_copy_used
                        && target.kind() == TargetKind::PrecompiledTarget
                    {
                        fresh_copy_used = true;
                        self.log.info("Retrying precompiled target once with a fresh buffer copy");
                        queue.push_back(target.fresh_copy());
                    }
                }
                Err(AttemptFailure::Init(message)) => {
                    if simplified {
                        self.log.warn(format!(
                            "Engine init failed again for {}: {}",
                            target.source_url(),
                            message
                        ));
                        init_failure = Some(message);
                    } else {
                        simplified = true;
                        self.log.warn(format!(
                            "Engine init failed ({}); retrying once with simplified options",
                            message
                        ));
                        options = EngineOptions::simplified();
                        queue.push_front(target);
                    }
                }
            }
        }

        if !corrupted {
            // 只有引擎本身的錯誤，換成棋盤格也不會成功
            return Err(ArError::EngineInitError {
                message: init_failure.unwrap_or_else(|| "no target candidates".to_string()),
            });
        }

        self.enter_degraded(&options).await
    }

    async fn enter_degraded(&mut self, options: &EngineOptions) -> Result<(EngineInstance, TargetAsset)> {
        let placeholder = placeholder_target().map_err(|e| ArError::EngineInitError {
            message: format!("placeholder target could not be generated: {}", e),
        })?;
        self.log.warn("All targets rejected; entering degraded mode with placeholder target");

        match self.attempt_engine(&placeholder, options).await {
            Ok(instance) => {
                self.degraded = true;
                let warning = ArError::AssetCorruptionError {
                    message: "running on placeholder target".to_string(),
                };
                self.emit(LifecycleEvent::Error {
                    kind: warning.kind().to_string(),
                    message: warning.user_friendly_message(),
                    blocking: warning.is_blocking(),
                });
                self.track(
                    AnalyticsEvent::new(&self.id, AnalyticsKind::DegradedMode)
                        .with_detail(placeholder.source_url()),
                );
                Ok((instance, placeholder))
            }
            Err(AttemptFailure::Cancelled) => Err(ArError::Cancelled),
            Err(AttemptFailure::Corrupt(error)) => Err(ArError::EngineInitError {
                message: format!("placeholder target rejected: {}", error),
            }),
            Err(AttemptFailure::Init(message)) => Err(ArError::EngineInitError {
                message: format!("placeholder target failed: {}", message),
            }),
        }
    }

    async fn attempt_engine(
        &mut self,
        target: &TargetAsset,
        options: &EngineOptions,
    ) -> std::result::Result<EngineInstance, AttemptFailure> {
        self.log.debug(format!(
            "Creating engine for {} target {}{}",
            kind_label(target.kind()),
            target.source_url(),
            if options.simplified { " (simplified)" } else { "" }
        ));

        let mut instance = self
            .platform
            .engines
            .create(target, options, self.anchors.clone())
            .map_err(AttemptFailure::from)?;

        let warn_after = Duration::from_millis(self.config.engine.warn_timeout_ms);
        let give_up_after = Duration::from_millis(self.config.engine.give_up_timeout_ms);
        let started = race_start(&mut instance, &self.stop, &self.log, warn_after, give_up_after).await;

        match started {
            Ok(()) => Ok(instance),
            Err(failure) => {
                discard_instance(instance, self.mount.as_mut(), &self.log).await;
                Err(failure)
            }
        }
    }

    fn bind_overlay(&mut self, campaign: &CampaignMetadata) -> Result<()> {
        let video = self
            .platform
            .media
            .create_video(&campaign.video_url, self.config.playback.loop_video);
        let handle = video.handle();
        self.resources.video = Some(video);

        let authored = self.authored_dimensions(campaign);
        let Some(renderer) = self.resources.renderer.as_deref_mut() else {
            return Err(ArError::EngineInitError {
                message: "renderer missing after engine start".to_string(),
            });
        };

        match OverlayBinder::create(renderer, handle, authored, &self.config.overlay) {
            Ok(binder) => self.binder = Some(binder),
            Err(OverlayBuildError { error, partial }) => {
                self.resources.overlay = Some(partial);
                return Err(ArError::EngineInitError {
                    message: format!("overlay setup failed: {}", error),
                });
            }
        }

        self.playback = Some(PlaybackSynchronizer::new(self.config.debounce(), self.log.clone()));
        Ok(())
    }

    fn authored_dimensions(&self, campaign: &CampaignMetadata) -> Dimensions {
        let design = campaign.design_dimensions();
        if !design.is_zero() {
            return design;
        }
        self.target
            .as_ref()
            .and_then(|t| t.dimensions())
            .unwrap_or_else(|| Dimensions::new(1, 1))
    }

    fn subscribe_anchors(&self) -> Option<AnchorSubscriptions> {
        let overlay = self.anchors.subscribe(AnchorConcern::Overlay)?;
        let playback = self.anchors.subscribe(AnchorConcern::Playback)?;
        Some(AnchorSubscriptions { overlay, playback })
    }

    fn reset(&mut self) -> Result<()> {
        self.transition(SessionState::Idle)?;
        self.stop.reset();
        self.detection = DetectionPhase::Scanning;
        self.degraded = false;
        self.retry_count = 0;
        self.backoff_ms = 0;
        self.total_backoff_ms = 0;
        self.last_error = None;
        self.capabilities = None;
        self.target = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Anchor 與播放

    /// 把 anchor 訂閱交給外部事件迴圈
    pub fn take_anchor_subscriptions(&mut self) -> Option<AnchorSubscriptions> {
        self.subscriptions.take()
    }

    /// 處理 session 自己的訂閱中已排隊的 anchor 事件
    pub fn pump_anchor_events(&mut self) -> usize {
        let Some(subscriptions) = self.subscriptions.as_mut() else {
            return 0;
        };

        let mut overlay = Vec::new();
        while let Some(event) = subscriptions.overlay.try_recv() {
            overlay.push(event);
        }
        let mut playback = Vec::new();
        while let Some(event) = subscriptions.playback.try_recv() {
            playback.push(event);
        }

        let handled = overlay.len() + playback.len();
        for event in &overlay {
            self.handle_overlay_anchor(event);
        }
        for event in &playback {
            self.handle_playback_anchor(event);
        }
        handled
    }

    pub fn handle_overlay_anchor(&mut self, event: &AnchorEvent) {
        if self.state != SessionState::Ready {
            return;
        }
        let (Some(binder), Some(renderer)) = (self.binder.as_mut(), self.resources.renderer.as_deref_mut())
        else {
            return;
        };
        let Some(visible) = binder.on_anchor(event, renderer) else {
            return;
        };

        self.detection = if visible {
            DetectionPhase::TargetDetected
        } else {
            DetectionPhase::Scanning
        };
        self.log.info(if visible { "Target detected" } else { "Target lost" });
        self.emit(LifecycleEvent::TargetDetected { detected: visible });

        if visible && !self.milestones.detected {
            self.milestones.detected = true;
            self.track(AnalyticsEvent::new(&self.id, AnalyticsKind::TargetDetected));
        }
    }

    pub fn handle_playback_anchor(&mut self, event: &AnchorEvent) {
        if self.state != SessionState::Ready {
            return;
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.observe(event.visible, Instant::now());
        }
    }

    /// 待定的可見性變化何時穩定
    pub fn playback_deadline(&self) -> Option<Instant> {
        self.playback.as_ref().and_then(|p| p.deadline())
    }

    pub async fn settle_playback(&mut self) {
        let (Some(playback), Some(video)) = (self.playback.as_mut(), self.resources.video.as_deref_mut()) else {
            return;
        };
        let events = playback.settle(Instant::now(), video).await;
        self.publish_playback(events);
    }

    pub async fn user_play(&mut self) {
        if self.state != SessionState::Ready {
            return;
        }
        let (Some(playback), Some(video)) = (self.playback.as_mut(), self.resources.video.as_deref_mut()) else {
            return;
        };
        let events = playback.user_play(video).await;
        self.publish_playback(events);
    }

    pub fn user_pause(&mut self) {
        if self.state != SessionState::Ready {
            return;
        }
        let (Some(playback), Some(video)) = (self.playback.as_mut(), self.resources.video.as_deref_mut()) else {
            return;
        };
        let events = playback.user_pause(video);
        self.publish_playback(events);
    }

    pub fn set_muted(&mut self, muted: bool) {
        let (Some(playback), Some(video)) = (self.playback.as_mut(), self.resources.video.as_deref_mut()) else {
            return;
        };
        let events = playback.set_muted(video, muted);
        self.publish_playback(events);
    }

    fn publish_playback(&mut self, events: Vec<LifecycleEvent>) {
        for event in events {
            if event == (LifecycleEvent::VideoPlaying { playing: true }) && !self.milestones.playing {
                self.milestones.playing = true;
                self.track(AnalyticsEvent::new(&self.id, AnalyticsKind::VideoPlaying));
            }
            self.emit(event);
        }
    }

    // ------------------------------------------------------------------
    // 內部

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ArError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.log.debug(format!("State {} -> {}", self.state, next));
        self.state = next;
        Ok(())
    }

    async fn fail(&mut self, error: ArError) -> ArError {
        // debug log 必須先於任何使用者可見的效果
        self.log.error(format!(
            "[{}] {} (blocking: {}); {}",
            error.kind(),
            error,
            error.is_blocking(),
            error.recovery_suggestion()
        ));
        self.last_error = Some(ErrorSummary::from(&error));

        if let Err(e) = self.transition(SessionState::Error) {
            self.log.debug(format!("Error transition skipped: {}", e));
        }
        self.release_resources().await;

        self.emit(LifecycleEvent::Error {
            kind: error.kind().to_string(),
            message: error.user_friendly_message(),
            blocking: error.is_blocking(),
        });
        self.track(AnalyticsEvent::new(&self.id, AnalyticsKind::SessionError).with_detail(error.kind()));
        error
    }

    fn note_recoverable(&mut self, error: &ArError) {
        self.log.warn(format!("[{}] {}", error.kind(), error));
        self.last_error = Some(ErrorSummary::from(error));
    }

    async fn release_resources(&mut self) -> TeardownReport {
        self.subscriptions = None;
        self.playback = None;
        if let Some(binder) = self.binder.take() {
            self.resources.overlay = Some(binder.into_resources());
        }
        teardown(&mut self.resources, self.mount.as_mut(), &self.log).await
    }

    fn emit(&self, event: LifecycleEvent) {
        // 沒有訂閱者也沒關係
        let _ = self.events.send(event);
    }

    fn track(&self, event: AnalyticsEvent) {
        self.platform.analytics.track(event);
    }
}

fn kind_label(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::RawImage => "raw image",
        TargetKind::PrecompiledTarget => "precompiled",
    }
}

/// `work` 與停止訊號競爭
async fn with_stop<T>(stop: &StopSignal, work: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = stop.requested() => Err(ArError::Cancelled),
        value = work => Ok(value),
    }
}

/// 啟動引擎：先有警告期限，再有放棄期限
async fn race_start(
    instance: &mut EngineInstance,
    stop: &StopSignal,
    log: &DebugLog,
    warn_after: Duration,
    give_up_after: Duration,
) -> std::result::Result<(), AttemptFailure> {
    let start = instance.tracker.start();
    tokio::pin!(start);
    let warn = tokio::time::sleep(warn_after);
    tokio::pin!(warn);
    let give_up = tokio::time::sleep(give_up_after);
    tokio::pin!(give_up);
    let mut warned = false;

    loop {
        tokio::select! {
            biased;
            _ = stop.requested() => return Err(AttemptFailure::Cancelled),
            result = &mut start => return result.map_err(AttemptFailure::from),
            _ = &mut give_up => {
                let after_ms = give_up_after.as_millis() as u64;
                log.error(format!("Engine start gave up after {}ms", after_ms));
                return Err(AttemptFailure::Corrupt(ArError::EngineStartTimeout { after_ms }));
            }
            _ = &mut warn, if !warned => {
                warned = true;
                log.warn(format!(
                    "Engine start has not completed after {}ms; camera or target likely stuck",
                    warn_after.as_millis()
                ));
            }
        }
    }
}
