use crate::config::toml_config::OverlayConfig;
use crate::domain::model::{AnchorEvent, Dimensions, Pose};
use crate::domain::ports::{
    GeometryId, MaterialId, MediaHandle, MeshId, PlatformError, Renderer, TextureId,
};

/// 由 binder 建立、由 teardown 釋放的 GPU 資源
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OverlayResources {
    pub texture: Option<TextureId>,
    pub material: Option<MaterialId>,
    pub mesh: Option<MeshId>,
    pub geometry: Option<GeometryId>,
}

impl OverlayResources {
    pub fn is_empty(&self) -> bool {
        self.texture.is_none() && self.material.is_none() && self.mesh.is_none() && self.geometry.is_none()
    }
}

#[derive(Debug)]
pub struct OverlayBuildError {
    pub error: PlatformError,
    /// 失敗前已建立的部分，仍需交給 teardown
    pub partial: OverlayResources,
}

/// 綁定在 anchor 上的影片平面。只有這裡會改 mesh 的可見性。
pub struct OverlayBinder {
    resources: OverlayResources,
    mesh: MeshId,
    authored: Dimensions,
    min_scale: f32,
    max_scale: f32,
    visible: bool,
    scale: f32,
}

impl OverlayBinder {
    /// 每個 session 只建一次 mesh，初始為隱藏
    pub fn create(
        renderer: &mut dyn Renderer,
        video: MediaHandle,
        authored: Dimensions,
        config: &OverlayConfig,
    ) -> Result<Self, OverlayBuildError> {
        let mut resources = OverlayResources::default();
        let mesh = match Self::build(renderer, video, authored, &mut resources) {
            Ok(mesh) => mesh,
            Err(error) => {
                return Err(OverlayBuildError {
                    error,
                    partial: resources,
                })
            }
        };

        Ok(Self {
            resources,
            mesh,
            authored,
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            visible: false,
            scale: 1.0,
        })
    }

    fn build(
        renderer: &mut dyn Renderer,
        video: MediaHandle,
        authored: Dimensions,
        resources: &mut OverlayResources,
    ) -> Result<MeshId, PlatformError> {
        let texture = renderer.create_video_texture(video)?;
        resources.texture = Some(texture);
        let material = renderer.create_material(texture)?;
        resources.material = Some(material);
        let geometry = renderer.create_plane_geometry(1.0, authored.aspect())?;
        resources.geometry = Some(geometry);
        let mesh = renderer.create_mesh(geometry, material)?;
        resources.mesh = Some(mesh);
        renderer.set_visible(mesh, false);
        renderer.attach_to_anchor(mesh, 0)?;
        Ok(mesh)
    }

    /// 邊緣觸發：可見性相同的重複事件會被忽略。
    /// 可見性有改變時回傳新值。
    pub fn on_anchor(&mut self, event: &AnchorEvent, renderer: &mut dyn Renderer) -> Option<bool> {
        if event.visible == self.visible {
            return None;
        }

        if event.visible {
            if let Some(scale) = self.scale_for(&event.pose) {
                self.scale = scale;
                renderer.set_scale(self.mesh, scale);
            }
        }

        self.visible = event.visible;
        renderer.set_visible(self.mesh, event.visible);
        tracing::debug!(
            "Overlay {} (scale {:.3})",
            if event.visible { "shown" } else { "hidden" },
            self.scale
        );
        Some(event.visible)
    }

    /// 偵測尺寸 / 設計尺寸，夾在 [min_scale, max_scale]。姿態無效時回傳 None。
    pub fn scale_for(&self, pose: &Pose) -> Option<f32> {
        if self.authored.width == 0 || !pose.width.is_finite() || pose.width <= 0.0 {
            return None;
        }
        let ratio = pose.width / self.authored.width as f32;
        Some(ratio.clamp(self.min_scale, self.max_scale))
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn resources(&self) -> &OverlayResources {
        &self.resources
    }

    pub fn into_resources(self) -> OverlayResources {
        self.resources
    }
}
