use ar_session::adapters::simulated::{
    sample_png, AutoplayPolicy, EngineScript, MemoryFetcher, SimulatedPlatform,
};
use ar_session::domain::model::{AnchorEvent, CampaignMetadata, PlaybackState, SocialLinks};
use ar_session::{LifecycleEvent, Session, SessionConfig, SessionHandle, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const TARGET_URL: &str = "https://cdn.example.com/poster.png";
const VIDEO_URL: &str = "https://cdn.example.com/clip.mp4";

fn campaign() -> CampaignMetadata {
    CampaignMetadata {
        target_image_url: TARGET_URL.to_string(),
        precompiled_target_url: None,
        video_url: VIDEO_URL.to_string(),
        design_width: 1000,
        design_height: 1500,
        social: SocialLinks::default(),
    }
}

fn platform() -> SimulatedPlatform {
    let fetcher = MemoryFetcher::new().with_asset(TARGET_URL, sample_png(600, 900).unwrap());
    SimulatedPlatform::new(Arc::new(fetcher))
}

fn spawn(sim: &SimulatedPlatform) -> (SessionHandle, broadcast::Receiver<LifecycleEvent>) {
    let session = Session::new(Box::new(sim.mount("ar-container")), sim.platform(), SessionConfig::default());
    let rx = session.subscribe();
    (SessionHandle::spawn(session, campaign()), rx)
}

async fn next_event(rx: &mut broadcast::Receiver<LifecycleEvent>) -> LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for lifecycle event")
        .expect("lifecycle channel closed")
}

/// 收集事件，直到第一個符合 `stop_at` 的事件 (含)
async fn collect_until(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    stop_at: impl Fn(&LifecycleEvent) -> bool,
) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = stop_at(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

async fn wait_ready(rx: &mut broadcast::Receiver<LifecycleEvent>) {
    collect_until(rx, |e| matches!(e, LifecycleEvent::ArReady { .. })).await;
}

fn playing(playing: bool) -> impl Fn(&LifecycleEvent) -> bool {
    move |e| *e == LifecycleEvent::VideoPlaying { playing }
}

#[tokio::test(start_paused = true)]
async fn test_detection_starts_playback() {
    let sim = platform();
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;

    sim.engines.last_bus().unwrap().publish(AnchorEvent::found(800.0, 1200.0));

    assert_eq!(next_event(&mut rx).await, LifecycleEvent::TargetDetected { detected: true });
    assert_eq!(next_event(&mut rx).await, LifecycleEvent::VideoPlaying { playing: true });
    assert!(sim.media.last_video().unwrap().is_playing());
    assert!(sim.journal.contains("renderer.set_scale 0.800"));

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_toggles_coalesce_into_one_play() {
    let sim = platform();
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;

    let bus = sim.engines.last_bus().unwrap();
    bus.publish(AnchorEvent::found(500.0, 750.0));
    bus.publish(AnchorEvent::lost());
    bus.publish(AnchorEvent::found(500.0, 750.0));

    let events = collect_until(&mut rx, playing(true)).await;
    let detections = events
        .iter()
        .filter(|e| matches!(e, LifecycleEvent::TargetDetected { .. }))
        .count();
    assert_eq!(detections, 3);
    assert_eq!(sim.journal.count("video.play"), 1);
    assert_eq!(sim.journal.count("video.pause"), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_continuous_tracking_starts_playback_once() {
    let sim = platform();
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;
    let bus = sim.engines.last_bus().unwrap();

    // 每一幀都會送出 pose，可見性不變
    for _ in 0..40 {
        bus.publish(AnchorEvent::found(800.0, 1200.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(sim.journal.count("video.play"), 1);
    assert!(sim.media.last_video().unwrap().is_playing());

    let events = collect_until(&mut rx, playing(true)).await;
    let detections = events
        .iter()
        .filter(|e| matches!(e, LifecycleEvent::TargetDetected { .. }))
        .count();
    assert_eq!(detections, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lost_target_pauses_and_resumes_at_saved_time() {
    let sim = platform();
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;
    let bus = sim.engines.last_bus().unwrap();

    bus.publish(AnchorEvent::found(500.0, 750.0));
    collect_until(&mut rx, playing(true)).await;
    sim.media.last_video().unwrap().advance(3.0);

    bus.publish(AnchorEvent::lost());
    collect_until(&mut rx, playing(false)).await;
    assert_eq!(sim.journal.count("video.pause"), 1);
    assert!(!sim.media.last_video().unwrap().is_playing());

    bus.publish(AnchorEvent::found(500.0, 750.0));
    collect_until(&mut rx, playing(true)).await;
    assert!(sim.journal.contains("video.seek 3.000"));

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.playback_state(), PlaybackState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_user_commands_override_playback() {
    let sim = platform();
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;
    let bus = sim.engines.last_bus().unwrap();

    bus.publish(AnchorEvent::found(500.0, 750.0));
    collect_until(&mut rx, playing(true)).await;

    handle.pause();
    assert_eq!(next_event(&mut rx).await, LifecycleEvent::VideoPlaying { playing: false });

    handle.play();
    assert_eq!(next_event(&mut rx).await, LifecycleEvent::VideoPlaying { playing: true });

    handle.set_muted(true);
    assert_eq!(next_event(&mut rx).await, LifecycleEvent::VideoMuted { muted: true });

    let session = handle.shutdown().await.unwrap();
    assert!(session.debug_log().contains("stopped"));
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_retries_muted() {
    let sim = platform().with_autoplay(AutoplayPolicy::MutedOnly);
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;

    sim.engines.last_bus().unwrap().publish(AnchorEvent::found(500.0, 750.0));

    let events = collect_until(&mut rx, playing(true)).await;
    assert_eq!(
        &events[events.len() - 2..],
        &[
            LifecycleEvent::VideoMuted { muted: true },
            LifecycleEvent::VideoPlaying { playing: true }
        ]
    );
    assert_eq!(sim.journal.count("video.play"), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_blocked_autoplay_asks_for_tap() {
    let sim = platform().with_autoplay(AutoplayPolicy::Deny);
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;

    sim.engines.last_bus().unwrap().publish(AnchorEvent::found(500.0, 750.0));

    let events = collect_until(&mut rx, |e| *e == LifecycleEvent::TapToPlay).await;
    assert!(!events.contains(&LifecycleEvent::VideoPlaying { playing: true }));
    assert!(sim.media.last_video().unwrap().has_source());

    let session = handle.shutdown().await.unwrap();
    assert!(session.debug_log().contains("waiting for tap"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_initialization_is_queued() {
    let sim = platform().with_engines(|engines| {
        engines.with_script(vec![EngineScript::Delay(Duration::from_secs(5))])
    });
    let (handle, mut rx) = spawn(&sim);
    handle.restart();

    let events = collect_until(&mut rx, |e| matches!(e, LifecycleEvent::ArReady { .. })).await;
    assert_eq!(events.last(), Some(&LifecycleEvent::ArReady { degraded: false }));

    let events = collect_until(&mut rx, |e| matches!(e, LifecycleEvent::ArReady { .. })).await;
    assert_eq!(events.first(), Some(&LifecycleEvent::Stopped));
    assert_eq!(sim.journal.count("engine.create"), 2);

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_initialization() {
    let sim = platform().with_engines(|engines| {
        engines.with_script(vec![EngineScript::Delay(Duration::from_secs(5))])
    });
    let (handle, mut rx) = spawn(&sim);
    handle.stop();

    assert_eq!(next_event(&mut rx).await, LifecycleEvent::Stopped);

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!sim.journal.contains("engine.started"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_queued_restart_wins() {
    let sim = platform().with_engines(|engines| {
        engines.with_script(vec![EngineScript::Delay(Duration::from_secs(5))])
    });
    let (handle, mut rx) = spawn(&sim);
    // 讓初始化進到引擎啟動
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sim.journal.count("engine.create"), 1);
    handle.restart();
    handle.stop();

    assert_eq!(next_event(&mut rx).await, LifecycleEvent::Stopped);
    // 給佇列中的 Restart 與 Stop 處理時間
    tokio::time::sleep(Duration::from_secs(30)).await;

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(sim.journal.count("engine.create"), 1);
    assert!(!sim.journal.contains("engine.started"));
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, LifecycleEvent::ArReady { .. }), "restarted after stop: {:?}", event);
    }
    assert!(session.debug_log().contains("Dropping restart"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_video() {
    let sim = platform();
    let (handle, mut rx) = spawn(&sim);
    wait_ready(&mut rx).await;

    let session = handle.shutdown().await.unwrap();

    assert_eq!(next_event(&mut rx).await, LifecycleEvent::Stopped);
    assert_eq!(session.state(), SessionState::Stopped);
    let video = sim.media.last_video().unwrap();
    assert!(!video.has_source());
    assert!(!video.is_playing());
    assert!(!sim.journal.contains("leak"));
}
