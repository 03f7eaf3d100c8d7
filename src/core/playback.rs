use crate::core::debounce::Debouncer;
use crate::domain::events::LifecycleEvent;
use crate::domain::model::PlaybackState;
use crate::domain::ports::{PlayError, VideoElement};
use crate::utils::debug_log::DebugLog;
use crate::utils::error::ArError;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIntent {
    Play,
    Pause,
}

/// 依 anchor 可見性同步影片播放。播放狀態與靜音只能由這裡寫入。
pub struct PlaybackSynchronizer {
    state: PlaybackState,
    muted: bool,
    saved_time: f64,
    debounce: Debouncer<bool>,
    applied_visible: bool,
    user_override: Option<UserIntent>,
    tap_to_play: bool,
    log: DebugLog,
}

impl PlaybackSynchronizer {
    pub fn new(debounce: Duration, log: DebugLog) -> Self {
        Self {
            state: PlaybackState::Stopped,
            muted: false,
            saved_time: 0.0,
            debounce: Debouncer::new(debounce),
            applied_visible: false,
            user_override: None,
            tap_to_play: false,
            log,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn saved_time(&self) -> f64 {
        self.saved_time
    }

    pub fn needs_tap_to_play(&self) -> bool {
        self.tap_to_play
    }

    /// 送入 anchor 事件的可見性。只有與待定值(或已套用值)不同時才會重新計時。
    pub fn observe(&mut self, visible: bool, now: Instant) {
        let current = self.debounce.pending().copied().unwrap_or(self.applied_visible);
        if visible == current {
            return;
        }
        self.debounce.push(visible, now);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// 防抖時間到了才套用穩定下來的可見性
    pub async fn settle(&mut self, now: Instant, video: &mut dyn VideoElement) -> Vec<LifecycleEvent> {
        let Some(visible) = self.debounce.take_settled(now) else {
            return Vec::new();
        };
        if visible == self.applied_visible {
            return Vec::new();
        }
        self.applied_visible = visible;

        if let Some(intent) = self.user_override.take() {
            let contradicts = matches!(
                (intent, visible),
                (UserIntent::Play, false) | (UserIntent::Pause, true)
            );
            if contradicts {
                self.log.debug(format!(
                    "Skipping automatic {} after user {:?}",
                    if visible { "resume" } else { "pause" },
                    intent
                ));
                return Vec::new();
            }
        }

        if visible {
            self.resume(video).await
        } else {
            self.pause(video)
        }
    }

    pub async fn user_play(&mut self, video: &mut dyn VideoElement) -> Vec<LifecycleEvent> {
        self.user_override = Some(UserIntent::Play);
        self.tap_to_play = false;
        self.resume(video).await
    }

    pub fn user_pause(&mut self, video: &mut dyn VideoElement) -> Vec<LifecycleEvent> {
        self.user_override = Some(UserIntent::Pause);
        self.pause(video)
    }

    pub fn set_muted(&mut self, video: &mut dyn VideoElement, muted: bool) -> Vec<LifecycleEvent> {
        video.set_muted(muted);
        self.muted = muted;
        vec![LifecycleEvent::VideoMuted { muted }]
    }

    async fn resume(&mut self, video: &mut dyn VideoElement) -> Vec<LifecycleEvent> {
        if self.state == PlaybackState::Playing {
            return Vec::new();
        }

        let mut events = Vec::new();
        video.seek(self.saved_time);

        match video.play().await {
            Ok(()) => {
                self.mark_playing(&mut events);
            }
            Err(PlayError::NotAllowed(message)) => {
                let blocked = ArError::PlaybackAutoplayBlocked { message };
                self.log.warn(format!("{}; retrying muted", blocked));

                video.set_muted(true);
                self.muted = true;
                events.push(LifecycleEvent::VideoMuted { muted: true });

                // 只重試一次
                match video.play().await {
                    Ok(()) => self.mark_playing(&mut events),
                    Err(e) => {
                        self.log.warn(format!("Muted retry rejected ({}); waiting for tap", e));
                        self.mark_blocked(&mut events);
                    }
                }
            }
            Err(e @ PlayError::Failed(_)) => {
                self.log.warn(format!("Video play failed: {}", e));
                self.mark_blocked(&mut events);
            }
        }

        events
    }

    fn pause(&mut self, video: &mut dyn VideoElement) -> Vec<LifecycleEvent> {
        if self.state != PlaybackState::Playing {
            return Vec::new();
        }
        self.saved_time = video.current_time();
        video.pause();
        self.state = PlaybackState::Paused;
        self.log.debug(format!("Video paused at {:.3}s", self.saved_time));
        vec![LifecycleEvent::VideoPlaying { playing: false }]
    }

    fn mark_playing(&mut self, events: &mut Vec<LifecycleEvent>) {
        self.state = PlaybackState::Playing;
        self.tap_to_play = false;
        self.log.debug(format!("Video playing from {:.3}s", self.saved_time));
        events.push(LifecycleEvent::VideoPlaying { playing: true });
    }

    fn mark_blocked(&mut self, events: &mut Vec<LifecycleEvent>) {
        self.state = PlaybackState::Paused;
        self.tap_to_play = true;
        events.push(LifecycleEvent::TapToPlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulated::{AutoplayPolicy, Journal, SimVideo};

    const WINDOW: Duration = Duration::from_millis(100);

    fn sync() -> PlaybackSynchronizer {
        PlaybackSynchronizer::new(WINDOW, DebugLog::new(50))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_toggle_coalesces() {
        let journal = Journal::default();
        let mut video = SimVideo::new(1, AutoplayPolicy::Allow, journal.clone());
        let mut sync = sync();

        let t0 = Instant::now();
        sync.observe(true, t0);
        sync.observe(false, t0 + Duration::from_millis(20));
        sync.observe(true, t0 + Duration::from_millis(40));

        assert!(sync.settle(t0 + Duration::from_millis(100), &mut video).await.is_empty());
        let events = sync.settle(t0 + Duration::from_millis(140), &mut video).await;
        assert_eq!(events, vec![LifecycleEvent::VideoPlaying { playing: true }]);

        assert_eq!(journal.count("video.play"), 1);
        assert_eq!(journal.count("video.pause"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_visibility_does_not_extend_window() {
        let journal = Journal::default();
        let mut video = SimVideo::new(1, AutoplayPolicy::Allow, journal.clone());
        let mut sync = sync();
        let t0 = Instant::now();

        // 每 50ms 一個 pose 更新，可見性不變
        for tick in 0..10u64 {
            let now = t0 + Duration::from_millis(50 * tick);
            sync.observe(true, now);
            sync.settle(now, &mut video).await;
        }

        assert_eq!(sync.state(), PlaybackState::Playing);
        assert_eq!(journal.count("video.play"), 1);
        assert_eq!(sync.deadline(), None);

        sync.observe(true, t0 + Duration::from_secs(1));
        assert_eq!(sync.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_from_saved_time() {
        let journal = Journal::default();
        let mut video = SimVideo::new(1, AutoplayPolicy::Allow, journal.clone());
        let mut sync = sync();
        let t0 = Instant::now();

        sync.observe(true, t0);
        sync.settle(t0 + WINDOW, &mut video).await;
        video.advance(12.5);

        sync.observe(false, t0 + Duration::from_secs(1));
        sync.settle(t0 + Duration::from_secs(1) + WINDOW, &mut video).await;
        assert_eq!(sync.state(), PlaybackState::Paused);
        assert!((sync.saved_time() - 12.5).abs() < 1e-9);

        // 模擬其他程式把播放位置重設
        video.seek(0.0);

        sync.observe(true, t0 + Duration::from_secs(2));
        sync.settle(t0 + Duration::from_secs(2) + WINDOW, &mut video).await;
        assert_eq!(sync.state(), PlaybackState::Playing);
        assert!((video.current_time() - 12.5).abs() < 1.0 / 30.0);
    }

    #[tokio::test]
    async fn test_autoplay_muted_retry_succeeds() {
        let journal = Journal::default();
        let mut video = SimVideo::new(1, AutoplayPolicy::MutedOnly, journal.clone());
        let mut sync = sync();
        let t0 = Instant::now();

        sync.observe(true, t0);
        let events = sync.settle(t0 + WINDOW, &mut video).await;
        assert_eq!(
            events,
            vec![
                LifecycleEvent::VideoMuted { muted: true },
                LifecycleEvent::VideoPlaying { playing: true }
            ]
        );
        assert!(sync.is_muted());
        assert_eq!(journal.count("video.play"), 2);
    }

    #[tokio::test]
    async fn test_autoplay_denied_stops_after_one_retry() {
        let journal = Journal::default();
        let mut video = SimVideo::new(1, AutoplayPolicy::Deny, journal.clone());
        let mut sync = sync();
        let t0 = Instant::now();

        sync.observe(true, t0);
        let events = sync.settle(t0 + WINDOW, &mut video).await;

        assert_eq!(journal.count("video.play"), 2);
        assert_eq!(sync.state(), PlaybackState::Paused);
        assert!(sync.needs_tap_to_play());
        assert_eq!(events.last(), Some(&LifecycleEvent::TapToPlay));
    }

    #[tokio::test]
    async fn test_user_commands_bypass_debounce_and_take_precedence() {
        let journal = Journal::default();
        let mut video = SimVideo::new(1, AutoplayPolicy::Allow, journal.clone());
        let mut sync = sync();
        let t0 = Instant::now();

        sync.observe(true, t0);
        sync.settle(t0 + WINDOW, &mut video).await;
        assert_eq!(sync.state(), PlaybackState::Playing);

        let paused = sync.user_pause(&mut video);
        assert_eq!(paused, vec![LifecycleEvent::VideoPlaying { playing: false }]);
        let events = sync.user_play(&mut video).await;
        assert_eq!(events, vec![LifecycleEvent::VideoPlaying { playing: true }]);

        // 使用者剛按下播放，下一次自動暫停被略過
        sync.observe(false, t0 + Duration::from_secs(1));
        let skipped = sync.settle(t0 + Duration::from_secs(1) + WINDOW, &mut video).await;
        assert!(skipped.is_empty());
        assert_eq!(sync.state(), PlaybackState::Playing);

        let muted = sync.set_muted(&mut video, true);
        assert_eq!(muted, vec![LifecycleEvent::VideoMuted { muted: true }]);
        assert!(video.is_muted());
    }

    #[tokio::test]
    async fn test_user_pause_blocks_next_auto_resume() {
        let mut video = SimVideo::new(1, AutoplayPolicy::Allow, Journal::default());
        let mut sync = sync();
        let t0 = Instant::now();

        sync.user_play(&mut video).await;
        sync.user_pause(&mut video);
        sync.observe(true, t0);
        assert!(sync.settle(t0 + WINDOW, &mut video).await.is_empty());
        assert_eq!(sync.state(), PlaybackState::Paused);
    }
}
