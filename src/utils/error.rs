use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArError {
    #[error("Tracking/rendering libraries unavailable: {message}")]
    LibraryLoadError { message: String },

    #[error("Container not ready after {attempts} checks (last size {width}x{height})")]
    ContainerNotReadyError {
        attempts: u32,
        width: u32,
        height: u32,
    },

    #[error("Camera permission denied: {message}")]
    PermissionDeniedError { message: String },

    #[error("No usable camera: {message}")]
    CameraUnavailableError { message: String },

    #[error("Target asset rejected by tracking engine: {message}")]
    AssetCorruptionError { message: String },

    #[error("Tracking engine failed to initialize: {message}")]
    EngineInitError { message: String },

    #[error("Tracking engine did not start within {after_ms}ms")]
    EngineStartTimeout { after_ms: u64 },

    #[error("Autoplay blocked: {message}")]
    PlaybackAutoplayBlocked { message: String },

    #[error("Session operation cancelled by stop request")]
    Cancelled,

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session task failed: {message}")]
    TaskFailed { message: String },

    #[error("Asset request failed: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Environment,
    Permission,
    Asset,
    Engine,
    Playback,
    Lifecycle,
    Network,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ArError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ArError::LibraryLoadError { .. } | ArError::ContainerNotReadyError { .. } => {
                ErrorCategory::Environment
            }
            ArError::PermissionDeniedError { .. } | ArError::CameraUnavailableError { .. } => {
                ErrorCategory::Permission
            }
            ArError::AssetCorruptionError { .. } | ArError::ImageError(_) => ErrorCategory::Asset,
            ArError::EngineInitError { .. } | ArError::EngineStartTimeout { .. } => {
                ErrorCategory::Engine
            }
            ArError::PlaybackAutoplayBlocked { .. } => ErrorCategory::Playback,
            ArError::Cancelled | ArError::InvalidTransition { .. } | ArError::TaskFailed { .. } => {
                ErrorCategory::Lifecycle
            }
            ArError::FetchError(_) | ArError::IoError(_) | ArError::SerializationError(_) => {
                ErrorCategory::Network
            }
            ArError::ConfigValidationError { .. }
            | ArError::InvalidConfigValueError { .. }
            | ArError::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ArError::PlaybackAutoplayBlocked { .. } | ArError::Cancelled => ErrorSeverity::Low,
            ArError::AssetCorruptionError { .. }
            | ArError::EngineStartTimeout { .. }
            | ArError::ImageError(_) => ErrorSeverity::Medium,
            ArError::LibraryLoadError { .. }
            | ArError::ContainerNotReadyError { .. }
            | ArError::PermissionDeniedError { .. }
            | ArError::CameraUnavailableError { .. }
            | ArError::EngineInitError { .. } => ErrorSeverity::High,
            ArError::InvalidTransition { .. } | ArError::TaskFailed { .. } => ErrorSeverity::Critical,
            ArError::FetchError(_) | ArError::IoError(_) | ArError::SerializationError(_) => {
                ErrorSeverity::High
            }
            ArError::ConfigValidationError { .. }
            | ArError::InvalidConfigValueError { .. }
            | ArError::MissingConfigError { .. } => ErrorSeverity::High,
        }
    }

    /// 可在 session 內部吸收的錯誤 (降級或靜音重試)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ArError::AssetCorruptionError { .. }
                | ArError::EngineStartTimeout { .. }
                | ArError::PlaybackAutoplayBlocked { .. }
        )
    }

    /// 需要以阻擋式錯誤畫面 (含重試按鈕) 呈現給使用者的錯誤
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ArError::LibraryLoadError { .. }
                | ArError::PermissionDeniedError { .. }
                | ArError::ContainerNotReadyError { .. }
        )
    }

    /// 機器可讀的錯誤種類，用於生命週期事件與 analytics
    pub fn kind(&self) -> &'static str {
        match self {
            ArError::LibraryLoadError { .. } => "library_load",
            ArError::ContainerNotReadyError { .. } => "container_not_ready",
            ArError::PermissionDeniedError { .. } => "permission_denied",
            ArError::CameraUnavailableError { .. } => "camera_unavailable",
            ArError::AssetCorruptionError { .. } => "asset_corruption",
            ArError::EngineInitError { .. } => "engine_init",
            ArError::EngineStartTimeout { .. } => "engine_start_timeout",
            ArError::PlaybackAutoplayBlocked { .. } => "autoplay_blocked",
            ArError::Cancelled => "cancelled",
            ArError::InvalidTransition { .. } => "invalid_transition",
            ArError::TaskFailed { .. } => "task_failed",
            ArError::FetchError(_) => "fetch",
            ArError::ImageError(_) => "image",
            ArError::IoError(_) => "io",
            ArError::SerializationError(_) => "serialization",
            ArError::ConfigValidationError { .. }
            | ArError::InvalidConfigValueError { .. }
            | ArError::MissingConfigError { .. } => "config",
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ArError::LibraryLoadError { .. } => {
                "Check the network connection and reload the page to fetch the AR libraries again"
            }
            ArError::ContainerNotReadyError { .. } => {
                "Make sure the AR view is visible on screen, then tap retry"
            }
            ArError::PermissionDeniedError { .. } => {
                "Allow camera access in the browser site settings, then tap retry"
            }
            ArError::CameraUnavailableError { .. } => {
                "Connect a camera or open the experience on a phone"
            }
            ArError::AssetCorruptionError { .. } => {
                "Re-export the target image (512-2048px) or recompile the target file"
            }
            ArError::EngineInitError { .. } => "Reload the page; if it persists use another browser",
            ArError::EngineStartTimeout { .. } => "Close other apps using the camera and retry",
            ArError::PlaybackAutoplayBlocked { .. } => "Tap the video to start playback",
            ArError::Cancelled => "No action needed",
            ArError::InvalidTransition { .. } | ArError::TaskFailed { .. } => "Restart the session",
            ArError::FetchError(_) => "Check that the asset URL is reachable",
            ArError::ImageError(_) => "Use a PNG, JPEG or WebP target image",
            ArError::IoError(_) => "Check file paths and permissions",
            ArError::SerializationError(_) => "Check that the campaign metadata is valid JSON",
            ArError::ConfigValidationError { .. }
            | ArError::InvalidConfigValueError { .. }
            | ArError::MissingConfigError { .. } => "Fix the session configuration file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ArError::LibraryLoadError { .. } => "The AR experience could not be loaded.".to_string(),
            ArError::ContainerNotReadyError { .. } => {
                "The AR view is not ready yet.".to_string()
            }
            ArError::PermissionDeniedError { .. } => {
                "Camera access is needed to scan the image.".to_string()
            }
            ArError::CameraUnavailableError { .. } => "No camera was found on this device.".to_string(),
            ArError::AssetCorruptionError { .. } | ArError::EngineStartTimeout { .. } => {
                "Image tracking is limited right now, the camera still works.".to_string()
            }
            ArError::EngineInitError { .. } => "The AR engine could not start.".to_string(),
            ArError::PlaybackAutoplayBlocked { .. } => "Tap to play the video.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArError>;
