use crate::core::session::{AnchorSubscriptions, Session};
use crate::core::signal::StopSignal;
use crate::domain::channel::AnchorSubscription;
use crate::domain::events::LifecycleEvent;
use crate::domain::model::{AnchorEvent, CampaignMetadata};
use crate::utils::debug_log::DebugLog;
use crate::utils::error::{ArError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// 呈現層送給 session 的指令，依序處理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Stop,
    Restart,
    Play,
    Pause,
    SetMuted(bool),
    Shutdown,
}

enum Wake {
    Command(Option<Queued>),
    Overlay(Option<AnchorEvent>),
    Playback(Option<AnchorEvent>),
    Debounce,
}

/// 每個指令附帶送出當下的 stop 次數
type Queued = (SessionCommand, u64);

/// 在獨立 task 上執行 [`Session`]。
///
/// 指令會排隊：初始化期間要求的重啟，會等目前這輪完成或被取消後才執行。
/// 排在之後某次 `stop()` 前面的重啟會被丟棄。
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Queued>,
    stop: StopSignal,
    stops: Arc<AtomicU64>,
    events: broadcast::Sender<LifecycleEvent>,
    log: DebugLog,
    task: JoinHandle<Session>,
}

impl SessionHandle {
    pub fn spawn(session: Session, campaign: CampaignMetadata) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let stop = session.stop_signal();
        let events = session.lifecycle_sender();
        let log = session.debug_log();
        let stops = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(session, campaign, rx, stops.clone()));

        Self {
            commands,
            stop,
            stops,
            events,
            log,
            task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn debug_log(&self) -> DebugLog {
        self.log.clone()
    }

    /// 進行中的初始化會在下一個 await 點生效
    pub fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop.request();
        self.send(SessionCommand::Stop);
    }

    pub fn restart(&self) {
        self.send(SessionCommand::Restart);
    }

    pub fn play(&self) {
        self.send(SessionCommand::Play);
    }

    pub fn pause(&self) {
        self.send(SessionCommand::Pause);
    }

    pub fn set_muted(&self, muted: bool) {
        self.send(SessionCommand::SetMuted(muted));
    }

    /// 停止 session 並等待 task 結束，回傳 session 供檢查
    pub async fn shutdown(self) -> Result<Session> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop.request();
        self.send(SessionCommand::Shutdown);
        self.task.await.map_err(|e| ArError::TaskFailed {
            message: e.to_string(),
        })
    }

    fn send(&self, command: SessionCommand) {
        let stops = self.stops.load(Ordering::SeqCst);
        if self.commands.send((command, stops)).is_err() {
            self.log.debug(format!("Session task gone; dropped {:?}", command));
        }
    }
}

async fn run(
    mut session: Session,
    campaign: CampaignMetadata,
    mut commands: mpsc::UnboundedReceiver<Queued>,
    stops: Arc<AtomicU64>,
) -> Session {
    // 錯誤已經透過 lifecycle 事件與 debug log 回報
    let _ = session.start(campaign).await;
    let (mut overlay, mut playback) = split(session.take_anchor_subscriptions());

    loop {
        let deadline = session.playback_deadline();
        let wake = tokio::select! {
            command = commands.recv() => Wake::Command(command),
            event = next_anchor(&mut overlay) => Wake::Overlay(event),
            event = next_anchor(&mut playback) => Wake::Playback(event),
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Debounce,
        };

        match wake {
            Wake::Command(None) | Wake::Command(Some((SessionCommand::Shutdown, _))) => {
                session.stop().await;
                break;
            }
            Wake::Command(Some((SessionCommand::Stop, _))) => {
                session.stop().await;
                overlay = None;
                playback = None;
            }
            Wake::Command(Some((SessionCommand::Restart, seen))) if stops.load(Ordering::SeqCst) > seen => {
                // 排隊期間又收到 stop：重啟作廢
                session.debug_log().info("Dropping restart queued before a later stop");
            }
            Wake::Command(Some((SessionCommand::Restart, _))) => {
                overlay = None;
                playback = None;
                let _ = session.restart().await;
                (overlay, playback) = split(session.take_anchor_subscriptions());
            }
            Wake::Command(Some((SessionCommand::Play, _))) => session.user_play().await,
            Wake::Command(Some((SessionCommand::Pause, _))) => session.user_pause(),
            Wake::Command(Some((SessionCommand::SetMuted(muted), _))) => session.set_muted(muted),
            Wake::Overlay(Some(event)) => session.handle_overlay_anchor(&event),
            Wake::Overlay(None) => overlay = None,
            Wake::Playback(Some(event)) => session.handle_playback_anchor(&event),
            Wake::Playback(None) => playback = None,
            Wake::Debounce => session.settle_playback().await,
        }
    }

    session
}

fn split(
    subscriptions: Option<AnchorSubscriptions>,
) -> (Option<AnchorSubscription>, Option<AnchorSubscription>) {
    match subscriptions {
        Some(s) => (Some(s.overlay), Some(s.playback)),
        None => (None, None),
    }
}

/// 訂閱不存在時永遠等待
async fn next_anchor(subscription: &mut Option<AnchorSubscription>) -> Option<AnchorEvent> {
    match subscription {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}
