use crate::core::binder::OverlayResources;
use crate::domain::ports::{EngineInstance, MountPoint, Renderer, TrackingEngine, VideoElement};
use crate::utils::debug_log::DebugLog;
use std::time::Duration;

const ENGINE_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Session 擁有的所有外部資源。只有 teardown 可以釋放它們。
#[derive(Default)]
pub struct SessionResources {
    pub engine: Option<Box<dyn TrackingEngine>>,
    pub renderer: Option<Box<dyn Renderer>>,
    pub video: Option<Box<dyn VideoElement>>,
    pub overlay: Option<OverlayResources>,
    /// 引擎注入到掛載點的 canvas/video 節點
    pub injected: bool,
}

impl SessionResources {
    pub fn from_instance(instance: EngineInstance) -> Self {
        Self {
            engine: Some(instance.tracker),
            renderer: Some(instance.renderer),
            injected: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.engine.is_none()
            && self.renderer.is_none()
            && self.video.is_none()
            && self.overlay.as_ref().map(|o| o.is_empty()).unwrap_or(true)
            && !self.injected
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub released: Vec<&'static str>,
    pub failures: Vec<(&'static str, String)>,
}

impl TeardownReport {
    pub fn is_noop(&self) -> bool {
        self.released.is_empty() && self.failures.is_empty()
    }

    fn record(&mut self, log: &DebugLog, step: &'static str, result: Result<(), String>) {
        match result {
            Ok(()) => self.released.push(step),
            Err(e) => {
                // 記錄後繼續下一步
                log.warn(format!("Teardown step '{}' failed: {}", step, e));
                self.failures.push((step, e));
            }
        }
    }
}

/// 依固定順序釋放所有資源。可重複呼叫：每個資源釋放前都先從
/// `resources` 取出。
pub async fn teardown(
    resources: &mut SessionResources,
    mount: &mut dyn MountPoint,
    log: &DebugLog,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    if let Some(mut engine) = resources.engine.take() {
        let result = match tokio::time::timeout(ENGINE_STOP_TIMEOUT, engine.stop()).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("engine stop timed out after {:?}", ENGINE_STOP_TIMEOUT)),
        };
        report.record(log, "engine", result);
    }

    if let Some(mut video) = resources.video.take() {
        video.pause();
        video.clear_source();
        report.record(log, "video", Ok(()));
    }

    if let Some(overlay) = resources.overlay.take() {
        match resources.renderer.as_deref_mut() {
            Some(renderer) => dispose_overlay(renderer, overlay, log, &mut report),
            None => report.record(
                log,
                "overlay",
                Err("renderer already released; GPU handles dropped".to_string()),
            ),
        }
    }

    if let Some(mut renderer) = resources.renderer.take() {
        let disposed = renderer.dispose().map_err(|e| e.to_string());
        report.record(log, "renderer", disposed);
        let detached = renderer.detach_canvas().map_err(|e| e.to_string());
        report.record(log, "canvas", detached);
    }

    if std::mem::take(&mut resources.injected) {
        let detached = mount.detach_injected().map_err(|e| e.to_string());
        report.record(log, "mount", detached);
    }

    if report.is_noop() {
        log.debug("Teardown: nothing left to release");
    } else {
        log.info(format!(
            "Teardown released [{}], {} failure(s)",
            report.released.join(", "),
            report.failures.len()
        ));
    }

    report
}

/// 順序：texture → material → mesh (從場景移除) → geometry
fn dispose_overlay(
    renderer: &mut dyn Renderer,
    overlay: OverlayResources,
    log: &DebugLog,
    report: &mut TeardownReport,
) {
    if let Some(texture) = overlay.texture {
        report.record(log, "texture", renderer.dispose_texture(texture).map_err(|e| e.to_string()));
    }
    if let Some(material) = overlay.material {
        report.record(log, "material", renderer.dispose_material(material).map_err(|e| e.to_string()));
    }
    if let Some(mesh) = overlay.mesh {
        report.record(log, "mesh", renderer.remove_mesh(mesh).map_err(|e| e.to_string()));
    }
    if let Some(geometry) = overlay.geometry {
        report.record(log, "geometry", renderer.dispose_geometry(geometry).map_err(|e| e.to_string()));
    }
}

/// 拆除從未進到 Ready 的引擎實例
pub async fn discard_instance(
    instance: EngineInstance,
    mount: &mut dyn MountPoint,
    log: &DebugLog,
) -> TeardownReport {
    let mut resources = SessionResources::from_instance(instance);
    teardown(&mut resources, mount, log).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulated::{AutoplayPolicy, Journal, SimEngine, SimMount, SimRenderer, SimVideo};
    use crate::core::binder::OverlayBinder;
    use crate::config::toml_config::OverlayConfig;
    use crate::domain::model::Dimensions;
    use crate::domain::ports::MediaHandle;

    fn full_resources(journal: &Journal) -> SessionResources {
        let mut renderer = SimRenderer::new(journal.clone());
        let binder = OverlayBinder::create(
            &mut renderer,
            MediaHandle(7),
            Dimensions::new(100, 100),
            &OverlayConfig::default(),
        )
        .unwrap();
        SessionResources {
            engine: Some(Box::new(SimEngine::running(journal.clone()))),
            renderer: Some(Box::new(renderer)),
            video: Some(Box::new(SimVideo::new(7, AutoplayPolicy::Allow, journal.clone()))),
            overlay: Some(binder.into_resources()),
            injected: true,
        }
    }

    #[tokio::test]
    async fn test_teardown_order() {
        let journal = Journal::default();
        let mut resources = full_resources(&journal);
        let mut mount = SimMount::new("ar-container", journal.clone());
        let log = DebugLog::new(50);

        let report = teardown(&mut resources, &mut mount, &log).await;
        assert!(report.failures.is_empty());
        assert_eq!(
            report.released,
            vec!["engine", "video", "texture", "material", "mesh", "geometry", "renderer", "canvas", "mount"]
        );

        let order = journal.positions(&[
            "engine.stop",
            "video.pause",
            "video.clear_source",
            "renderer.dispose_texture",
            "renderer.dispose_material",
            "renderer.remove_mesh",
            "renderer.dispose_geometry",
            "renderer.dispose",
            "renderer.detach_canvas",
            "mount.detach_injected",
        ]);
        assert!(order.windows(2).all(|w| w[0] < w[1]), "order was {:?}", order);
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_twice_is_noop() {
        let journal = Journal::default();
        let mut resources = full_resources(&journal);
        let mut mount = SimMount::new("ar-container", journal.clone());
        let log = DebugLog::new(50);

        teardown(&mut resources, &mut mount, &log).await;
        let before = journal.entries();
        let second = teardown(&mut resources, &mut mount, &log).await;

        assert!(second.is_noop());
        assert_eq!(journal.entries(), before);
        assert!(!journal.contains("double free"));
    }

    #[tokio::test]
    async fn test_failing_step_does_not_block_the_rest() {
        let journal = Journal::default();
        let mut resources = full_resources(&journal);
        resources.engine = Some(Box::new(SimEngine::failing_stop(journal.clone())));
        let mut mount = SimMount::new("ar-container", journal.clone());
        let log = DebugLog::new(50);

        let report = teardown(&mut resources, &mut mount, &log).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "engine");
        assert!(report.released.contains(&"renderer"));
        assert!(journal.contains("mount.detach_injected"));
        assert!(log.contains("Teardown step 'engine' failed"));
    }
}
