use chrono::{DateTime, Utc};
use serde::Serialize;

/// 給呈現層的生命週期事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleEvent {
    CameraActive,
    ArReady { degraded: bool },
    TargetDetected { detected: bool },
    VideoPlaying { playing: bool },
    VideoMuted { muted: bool },
    TapToPlay,
    Error {
        kind: String,
        message: String,
        blocking: bool,
    },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsKind {
    SessionStart,
    SessionError,
    DegradedMode,
    TargetDetected,
    VideoPlaying,
}

/// 盡力送出的 analytics 事件，不重試
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub session_id: String,
    pub kind: AnalyticsKind,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(session_id: &str, kind: AnalyticsKind) -> Self {
        Self {
            session_id: session_id.to_string(),
            kind,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_event_serializes_with_tag() {
        let value = serde_json::to_value(LifecycleEvent::ArReady { degraded: true }).unwrap();
        assert_eq!(value["type"], "arReady");
        assert_eq!(value["degraded"], true);
    }

    #[test]
    fn test_analytics_event_payload() {
        let event = AnalyticsEvent::new("ar-1", AnalyticsKind::SessionError).with_detail("engine_init");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "session_error");
        assert_eq!(value["detail"], "engine_init");
        assert_eq!(value["session_id"], "ar-1");
    }
}
