use crate::domain::model::AnchorEvent;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// 每個關注點最多只能有一個 handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorConcern {
    Overlay,
    Playback,
}

/// 可訂閱的 anchor 通道。引擎依發出順序送出事件，
/// binder 與播放同步器各持有一個訂閱。
#[derive(Clone)]
pub struct AnchorBus {
    tx: broadcast::Sender<AnchorEvent>,
    concerns: Arc<Mutex<HashSet<AnchorConcern>>>,
}

impl AnchorBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            concerns: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 回傳收到事件的訂閱者數量
    pub fn publish(&self, event: AnchorEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// 該關注點已有訂閱時回傳 `None`
    pub fn subscribe(&self, concern: AnchorConcern) -> Option<AnchorSubscription> {
        let mut concerns = self.concerns.lock().ok()?;
        if !concerns.insert(concern) {
            return None;
        }
        Some(AnchorSubscription {
            concern,
            rx: self.tx.subscribe(),
            concerns: Arc::clone(&self.concerns),
        })
    }
}

impl Default for AnchorBus {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct AnchorSubscription {
    concern: AnchorConcern,
    rx: broadcast::Receiver<AnchorEvent>,
    concerns: Arc<Mutex<HashSet<AnchorConcern>>>,
}

impl AnchorSubscription {
    /// 引擎端關閉後回傳 `None`
    pub async fn recv(&mut self) -> Option<AnchorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("{:?} anchor subscriber lagged, skipped {} events", self.concern, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// [`recv`](Self::recv) 的非阻塞版本
    pub fn try_recv(&mut self) -> Option<AnchorEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("{:?} anchor subscriber lagged, skipped {} events", self.concern, skipped);
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for AnchorSubscription {
    fn drop(&mut self) {
        if let Ok(mut concerns) = self.concerns.lock() {
            concerns.remove(&self.concern);
        }
    }
}
