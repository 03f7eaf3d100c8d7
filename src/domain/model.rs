use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.width == 0 {
            1.0
        } else {
            self.height as f32 / self.width as f32
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetKind {
    RawImage,
    PrecompiledTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationStatus {
    Unvalidated,
    Valid,
    Corrupt,
}

/// 追蹤目標資產。由 Preparator 產生一次，之後不可變更。
#[derive(Debug, Clone)]
pub struct TargetAsset {
    source_url: String,
    kind: TargetKind,
    dimensions: Option<Dimensions>,
    original_dimensions: Option<Dimensions>,
    processed_payload: Arc<[u8]>,
    validation_status: ValidationStatus,
    placeholder: bool,
}

impl TargetAsset {
    pub fn new(
        source_url: impl Into<String>,
        kind: TargetKind,
        dimensions: Option<Dimensions>,
        original_dimensions: Option<Dimensions>,
        payload: Vec<u8>,
        validation_status: ValidationStatus,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            kind,
            dimensions,
            original_dimensions,
            processed_payload: Arc::from(payload),
            validation_status,
            placeholder: false,
        }
    }

    pub fn corrupt(source_url: impl Into<String>, kind: TargetKind) -> Self {
        Self::new(source_url, kind, None, None, Vec::new(), ValidationStatus::Corrupt)
    }

    pub(crate) fn into_placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    pub fn original_dimensions(&self) -> Option<Dimensions> {
        self.original_dimensions
    }

    pub fn payload(&self) -> &[u8] {
        &self.processed_payload
    }

    pub fn validation_status(&self) -> ValidationStatus {
        self.validation_status
    }

    pub fn is_valid(&self) -> bool {
        self.validation_status == ValidationStatus::Valid
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn was_resized(&self) -> bool {
        match (self.dimensions, self.original_dimensions) {
            (Some(now), Some(before)) => now != before,
            _ => false,
        }
    }

    /// 複製一份全新的 payload buffer (引擎可能會 detach 傳入的 buffer)
    pub fn fresh_copy(&self) -> Self {
        Self {
            processed_payload: Arc::from(self.processed_payload.to_vec()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose {
    pub position: [f32; 3],
    /// 偵測到的目標尺寸，以設計稿像素為單位
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnchorEvent {
    pub anchor_index: usize,
    pub visible: bool,
    pub pose: Pose,
}

impl AnchorEvent {
    pub fn found(width: f32, height: f32) -> Self {
        Self {
            anchor_index: 0,
            visible: true,
            pose: Pose {
                position: [0.0, 0.0, 0.0],
                width,
                height,
            },
        }
    }

    pub fn lost() -> Self {
        Self {
            anchor_index: 0,
            visible: false,
            pose: Pose::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub website: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// 活動資料，由外部 provider 在 session 開始前取得一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetadata {
    pub target_image_url: String,
    #[serde(default)]
    pub precompiled_target_url: Option<String>,
    pub video_url: String,
    pub design_width: u32,
    pub design_height: u32,
    #[serde(default)]
    pub social: SocialLinks,
}

impl CampaignMetadata {
    pub fn design_dimensions(&self) -> Dimensions {
        Dimensions::new(self.design_width, self.design_height)
    }
}

impl Validate for CampaignMetadata {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("target_image_url", &self.target_image_url)?;
        validate_non_empty_string("video_url", &self.video_url)?;
        if let Some(url) = &self.precompiled_target_url {
            validate_non_empty_string("precompiled_target_url", url)?;
        }
        if let Some(website) = &self.social.website {
            validate_url("social.website", website)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CapabilitySource {
    Preloaded,
    Fallback,
}

/// Capability Loader 的明確協商結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub tracking_version: String,
    pub rendering_version: String,
    pub source: CapabilitySource,
    pub poll_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_copy_does_not_share_buffer() {
        let asset = TargetAsset::new(
            "https://cdn.example.com/t.mind",
            TargetKind::PrecompiledTarget,
            None,
            None,
            vec![0x82, 1, 2, 3],
            ValidationStatus::Valid,
        );
        let copy = asset.fresh_copy();
        assert_eq!(copy.payload(), asset.payload());
        assert_ne!(copy.payload().as_ptr(), asset.payload().as_ptr());
        assert_eq!(copy.kind(), TargetKind::PrecompiledTarget);
    }

    #[test]
    fn test_was_resized() {
        let asset = TargetAsset::new(
            "t.png",
            TargetKind::RawImage,
            Some(Dimensions::new(2048, 1024)),
            Some(Dimensions::new(4096, 2048)),
            vec![1],
            ValidationStatus::Valid,
        );
        assert!(asset.was_resized());
        assert!(!TargetAsset::corrupt("x", TargetKind::RawImage).was_resized());
    }

    #[test]
    fn test_campaign_metadata_from_json() {
        let json = serde_json::json!({
            "target_image_url": "https://cdn.example.com/poster.jpg",
            "video_url": "https://cdn.example.com/clip.mp4",
            "design_width": 1000,
            "design_height": 1500
        });
        let campaign: CampaignMetadata = serde_json::from_value(json).unwrap();
        assert!(campaign.precompiled_target_url.is_none());
        assert_eq!(campaign.design_dimensions(), Dimensions::new(1000, 1500));
        assert_eq!(campaign.social, SocialLinks::default());
        assert!(campaign.validate().is_ok());
    }

    #[test]
    fn test_campaign_validation() {
        let mut campaign = CampaignMetadata {
            target_image_url: "poster.jpg".to_string(),
            precompiled_target_url: None,
            video_url: " ".to_string(),
            design_width: 0,
            design_height: 0,
            social: SocialLinks::default(),
        };
        assert!(campaign.validate().is_err());

        campaign.video_url = "clip.mp4".to_string();
        campaign.social.website = Some("not a url".to_string());
        assert!(campaign.validate().is_err());
    }
}
