use std::sync::Arc;
use tokio::sync::watch;

/// 停止請求旗標。Session 的每個 await 點都會與它競爭。
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    /// 上一輪拆除完成後才能呼叫
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// 收到停止請求時完成；已經請求過則立即完成
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // sender 由 self 持有，不會關閉
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
