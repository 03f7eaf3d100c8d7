use crate::config::toml_config::LibraryConfig;
use crate::domain::model::{Capabilities, CapabilitySource};
use crate::domain::ports::{LibraryHost, LibraryPresence};
use crate::utils::debug_log::DebugLog;
use crate::utils::error::{ArError, Result};
use std::sync::Arc;
use std::time::Duration;

/// 確認追蹤引擎與 3D 渲染引擎都已載入，必要時從備援來源動態載入
pub struct CapabilityLoader {
    host: Arc<dyn LibraryHost>,
    config: LibraryConfig,
    log: DebugLog,
}

impl CapabilityLoader {
    pub fn new(host: Arc<dyn LibraryHost>, config: LibraryConfig, log: DebugLog) -> Self {
        Self { host, config, log }
    }

    pub async fn ensure_libraries(&self) -> Result<Capabilities> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        let (presence, attempts) = self.poll(self.config.max_poll_attempts, interval).await;
        if let Some(caps) = Self::negotiate(&presence, CapabilitySource::Preloaded, attempts) {
            self.log.info(format!(
                "Libraries ready after {} poll(s): tracking {}, rendering {}",
                attempts, caps.tracking_version, caps.rendering_version
            ));
            return Ok(caps);
        }

        self.log.warn(format!(
            "Libraries not present after {} polls (tracking: {}, rendering: {})",
            attempts,
            presence.tracking.is_some(),
            presence.rendering.is_some()
        ));

        let Some(fallback_url) = self.config.fallback_url.as_deref() else {
            return Err(self.fail("no fallback source configured"));
        };

        self.log.info(format!("Loading libraries from fallback source {}", fallback_url));
        if let Err(e) = self.host.load_from(fallback_url).await {
            return Err(self.fail(&format!("fallback load from {} failed: {}", fallback_url, e)));
        }

        let (presence, extra) = self.poll(self.config.fallback_poll_attempts.max(1), interval).await;
        match Self::negotiate(&presence, CapabilitySource::Fallback, attempts + extra) {
            Some(caps) => {
                self.log.info(format!(
                    "Libraries registered from fallback: tracking {}, rendering {}",
                    caps.tracking_version, caps.rendering_version
                ));
                Ok(caps)
            }
            None => Err(self.fail("fallback source loaded but libraries did not register")),
        }
    }

    /// 第一次探測不等待；之後每次間隔 interval
    async fn poll(&self, max_attempts: u32, interval: Duration) -> (LibraryPresence, u32) {
        let mut presence = LibraryPresence::default();
        for attempt in 1..=max_attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(interval).await;
            }
            presence = self.host.probe();
            if presence.is_complete() {
                return (presence, attempt);
            }
        }
        (presence, max_attempts.max(1))
    }

    fn negotiate(
        presence: &LibraryPresence,
        source: CapabilitySource,
        poll_attempts: u32,
    ) -> Option<Capabilities> {
        match (&presence.tracking, &presence.rendering) {
            (Some(tracking), Some(rendering)) => Some(Capabilities {
                tracking_version: tracking.clone(),
                rendering_version: rendering.clone(),
                source,
                poll_attempts,
            }),
            _ => None,
        }
    }

    fn fail(&self, reason: &str) -> ArError {
        self.log.error(format!("Library load failed: {}", reason));
        ArError::LibraryLoadError {
            message: reason.to_string(),
        }
    }
}
