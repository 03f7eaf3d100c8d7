use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Idle,
    LoadingLibraries,
    ValidatingAsset,
    AcquiringPermission,
    Initializing,
    Ready,
    Error,
    Stopped,
}

/// Ready 底下的子狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionPhase {
    Scanning,
    TargetDetected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Error | SessionState::Stopped)
    }

    pub fn is_initializing(self) -> bool {
        matches!(
            self,
            SessionState::LoadingLibraries
                | SessionState::ValidatingAsset
                | SessionState::AcquiringPermission
                | SessionState::Initializing
        )
    }

    /// 合法轉移：正向鏈、任何非終止狀態 → Error、任何狀態 → Stopped、
    /// 終止狀態 → Idle (restart)
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, LoadingLibraries)
            | (LoadingLibraries, ValidatingAsset)
            | (ValidatingAsset, AcquiringPermission)
            | (AcquiringPermission, Initializing)
            | (Initializing, Ready) => true,
            (from, Error) => !from.is_terminal(),
            (from, Stopped) => from != Stopped,
            (from, Idle) => from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::LoadingLibraries => "loading_libraries",
            SessionState::ValidatingAsset => "validating_asset",
            SessionState::AcquiringPermission => "acquiring_permission",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Error => "error",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
