use crate::domain::channel::AnchorBus;
use crate::domain::events::AnalyticsEvent;
use crate::domain::model::{CampaignMetadata, Dimensions, TargetAsset};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// 平台層 (瀏覽器、GPU、DOM) 回報的一般性失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

// ---------------------------------------------------------------------------
// 能力協商

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryPresence {
    pub tracking: Option<String>,
    pub rendering: Option<String>,
}

impl LibraryPresence {
    pub fn is_complete(&self) -> bool {
        self.tracking.is_some() && self.rendering.is_some()
    }
}

#[async_trait]
pub trait LibraryHost: Send + Sync {
    /// 回報目前已註冊的引擎與版本
    fn probe(&self) -> LibraryPresence;

    /// 從備援來源下載並註冊引擎
    async fn load_from(&self, source_url: &str) -> PlatformResult<()>;
}

// ---------------------------------------------------------------------------
// 協作者

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait CampaignProvider: Send + Sync {
    async fn fetch_campaign(&self) -> Result<CampaignMetadata>;
}

/// 不可阻塞、不可重試
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: AnalyticsEvent);
}

// ---------------------------------------------------------------------------
// 掛載點與相機

pub trait MountPoint: Send + Sync {
    fn id(&self) -> &str;
    fn size(&self) -> Dimensions;

    /// 讓引擎注入的 canvas/video 填滿容器
    fn normalize_layout(&mut self) -> PlatformResult<()>;

    /// 移除引擎注入容器的所有節點
    fn detach_injected(&mut self) -> PlatformResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("permission denied: {0}")]
    Denied(String),
    #[error("no matching camera: {0}")]
    NotFound(String),
    #[error("camera error: {0}")]
    Other(String),
}

pub trait MediaStream: Send + Sync {
    fn stop_tracks(&mut self);
}

#[async_trait]
pub trait CameraAccess: Send + Sync {
    async fn request(&self, facing: FacingMode) -> std::result::Result<Box<dyn MediaStream>, CameraError>;
}

// ---------------------------------------------------------------------------
// 追蹤引擎

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub max_track: u32,
    pub filter_min_cf: Option<f32>,
    pub filter_beta: Option<f32>,
    pub warmup_tolerance: Option<u32>,
    pub miss_tolerance: Option<u32>,
    pub simplified: bool,
}

impl EngineOptions {
    /// 最保守的設定，用於 EngineInit 失敗後的唯一一次重試
    pub fn simplified() -> Self {
        Self {
            max_track: 1,
            filter_min_cf: None,
            filter_beta: None,
            warmup_tolerance: None,
            miss_tolerance: None,
            simplified: true,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_track: 1,
            filter_min_cf: Some(0.0001),
            filter_beta: Some(0.001),
            warmup_tolerance: Some(5),
            miss_tolerance: Some(5),
            simplified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// 引擎無法解析目標 buffer (offset 或簽章錯誤等)
    #[error("malformed target buffer: {0}")]
    MalformedBuffer(String),
    #[error("engine initialization failed: {0}")]
    Init(String),
    #[error("engine start failed: {0}")]
    Start(String),
}

pub struct EngineInstance {
    pub tracker: Box<dyn TrackingEngine>,
    pub renderer: Box<dyn Renderer>,
}

pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        target: &TargetAsset,
        options: &EngineOptions,
        anchors: AnchorBus,
    ) -> std::result::Result<EngineInstance, EngineError>;
}

#[async_trait]
pub trait TrackingEngine: Send + Sync {
    /// 開啟引擎自己的相機串流並開始逐幀迴圈
    async fn start(&mut self) -> std::result::Result<(), EngineError>;

    /// 停止逐幀迴圈與引擎的相機串流
    async fn stop(&mut self) -> PlatformResult<()>;
}

// ---------------------------------------------------------------------------
// 渲染引擎

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub u64);

pub trait Renderer: Send + Sync {
    fn create_video_texture(&mut self, video: MediaHandle) -> PlatformResult<TextureId>;
    fn create_material(&mut self, texture: TextureId) -> PlatformResult<MaterialId>;
    fn create_plane_geometry(&mut self, width: f32, height: f32) -> PlatformResult<GeometryId>;
    fn create_mesh(&mut self, geometry: GeometryId, material: MaterialId) -> PlatformResult<MeshId>;
    fn attach_to_anchor(&mut self, mesh: MeshId, anchor_index: usize) -> PlatformResult<()>;
    fn set_visible(&mut self, mesh: MeshId, visible: bool);
    fn set_scale(&mut self, mesh: MeshId, scale: f32);

    fn dispose_texture(&mut self, texture: TextureId) -> PlatformResult<()>;
    fn dispose_material(&mut self, material: MaterialId) -> PlatformResult<()>;
    fn remove_mesh(&mut self, mesh: MeshId) -> PlatformResult<()>;
    fn dispose_geometry(&mut self, geometry: GeometryId) -> PlatformResult<()>;

    /// 釋放 GPU context
    fn dispose(&mut self) -> PlatformResult<()>;
    fn detach_canvas(&mut self) -> PlatformResult<()>;
}

// ---------------------------------------------------------------------------
// 媒體

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    /// 被瀏覽器自動播放政策拒絕
    #[error("autoplay not allowed: {0}")]
    NotAllowed(String),
    #[error("playback failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait VideoElement: Send + Sync {
    fn handle(&self) -> MediaHandle;
    async fn play(&mut self) -> std::result::Result<(), PlayError>;
    fn pause(&mut self);
    fn current_time(&self) -> f64;
    fn seek(&mut self, seconds: f64);
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
    fn clear_source(&mut self);
}

pub trait MediaFactory: Send + Sync {
    fn create_video(&self, source_url: &str, looped: bool) -> Box<dyn VideoElement>;
}

/// 一個 session 需要的所有外部協作者
#[derive(Clone)]
pub struct Platform {
    pub libraries: Arc<dyn LibraryHost>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub camera: Arc<dyn CameraAccess>,
    pub engines: Arc<dyn EngineFactory>,
    pub media: Arc<dyn MediaFactory>,
    pub analytics: Arc<dyn AnalyticsSink>,
}
