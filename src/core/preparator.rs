use crate::config::toml_config::AssetConfig;
use crate::domain::model::{Dimensions, TargetAsset, TargetKind, ValidationStatus};
use crate::domain::ports::AssetFetcher;
use crate::utils::debug_log::DebugLog;
use crate::utils::error::Result;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;

/// 預編譯目標 (.mind) 是 msgpack 編碼的 map
const PRECOMPILED_MIN_LEN: usize = 16;
const PLACEHOLDER_SIZE: u32 = 512;
const PLACEHOLDER_CELL: u32 = 64;
pub const PLACEHOLDER_URL: &str = "placeholder://checker-512";

pub struct TargetPreparator {
    fetcher: Arc<dyn AssetFetcher>,
    config: AssetConfig,
    log: DebugLog,
}

impl TargetPreparator {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: AssetConfig, log: DebugLog) -> Self {
        Self {
            fetcher,
            config,
            log,
        }
    }

    /// 讀取並驗證目標。`kind` 由呼叫端依來源欄位決定，不看網址副檔名。
    /// 解碼失敗只會標記為 Corrupt，不會回傳錯誤；要不要降級由 Session 決定。
    pub async fn prepare(&self, source_url: &str, kind: TargetKind) -> TargetAsset {
        let bytes = match self.fetcher.fetch(source_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.log
                    .warn(format!("Target fetch failed for {}: {}", source_url, e));
                return TargetAsset::corrupt(source_url, kind);
            }
        };

        let config = self.config.clone();
        let log = self.log.clone();
        let url = source_url.to_string();
        let worker = tokio::task::spawn_blocking(move || process(&config, &log, &url, kind, bytes));

        match worker.await {
            Ok(asset) => asset,
            Err(e) => {
                self.log
                    .error(format!("Target processing task failed for {}: {}", source_url, e));
                TargetAsset::corrupt(source_url, kind)
            }
        }
    }

    /// 與 `prepare` 相同，但處理已在記憶體中的 bytes
    pub fn prepare_bytes(&self, source_url: &str, kind: TargetKind, bytes: Vec<u8>) -> TargetAsset {
        process(&self.config, &self.log, source_url, kind, bytes)
    }
}

/// 只有 CLI 在沒有 campaign 欄位可依據時才用副檔名猜
pub fn infer_kind(source_url: &str) -> TargetKind {
    let path = url::Url::parse(source_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| source_url.to_string());
    if path.to_ascii_lowercase().ends_with(".mind") {
        TargetKind::PrecompiledTarget
    } else {
        TargetKind::RawImage
    }
}

fn process(
    config: &AssetConfig,
    log: &DebugLog,
    source_url: &str,
    kind: TargetKind,
    bytes: Vec<u8>,
) -> TargetAsset {
    match kind {
        TargetKind::RawImage => prepare_image(config, log, source_url, bytes),
        TargetKind::PrecompiledTarget => prepare_precompiled(log, source_url, bytes),
    }
}

fn prepare_image(config: &AssetConfig, log: &DebugLog, source_url: &str, bytes: Vec<u8>) -> TargetAsset {
    let format = image::guess_format(&bytes).ok();
    let img = match image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(e) => {
            log.warn(format!("Target image {} could not be decoded: {}", source_url, e));
            return TargetAsset::corrupt(source_url, TargetKind::RawImage);
        }
    };

    let original = Dimensions::new(img.width(), img.height());
    if original.is_zero() {
        log.warn(format!("Target image {} has empty dimensions", source_url));
        return TargetAsset::corrupt(source_url, TargetKind::RawImage);
    }

    let longest = original.width.max(original.height);
    let shortest = original.width.min(original.height);

    if longest > config.max_dimension {
        let resized = img.resize(config.max_dimension, config.max_dimension, FilterType::Triangle);
        let dims = Dimensions::new(resized.width(), resized.height());
        return match encode(&resized, format) {
            Ok(payload) => {
                log.info(format!(
                    "Downsampled target {} from {} to {} ({} bytes)",
                    source_url,
                    original,
                    dims,
                    payload.len()
                ));
                TargetAsset::new(
                    source_url,
                    TargetKind::RawImage,
                    Some(dims),
                    Some(original),
                    payload,
                    ValidationStatus::Valid,
                )
            }
            Err(e) => {
                log.warn(format!("Re-encoding target {} failed: {}", source_url, e));
                TargetAsset::corrupt(source_url, TargetKind::RawImage)
            }
        };
    }

    if shortest < config.min_dimension {
        // 不放大，只記錄；追蹤品質可能較差
        log.warn(format!(
            "Target {} is {}, below optimal band ({}-{}px); tracking may be less reliable",
            source_url, original, config.min_dimension, config.max_dimension
        ));
    } else {
        log.debug(format!("Target {} is {}, within optimal band", source_url, original));
    }

    TargetAsset::new(
        source_url,
        TargetKind::RawImage,
        Some(original),
        Some(original),
        bytes,
        ValidationStatus::Valid,
    )
}

fn encode(img: &DynamicImage, format: Option<ImageFormat>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        Some(ImageFormat::Jpeg) => {
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
        }
        _ => img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?,
    }
    Ok(buf)
}

fn prepare_precompiled(log: &DebugLog, source_url: &str, bytes: Vec<u8>) -> TargetAsset {
    if let Err(reason) = check_precompiled_signature(&bytes) {
        log.warn(format!("Precompiled target {} rejected: {}", source_url, reason));
        return TargetAsset::corrupt(source_url, TargetKind::PrecompiledTarget);
    }

    log.debug(format!("Precompiled target {} accepted ({} bytes)", source_url, bytes.len()));
    TargetAsset::new(
        source_url,
        TargetKind::PrecompiledTarget,
        None,
        None,
        bytes,
        ValidationStatus::Valid,
    )
}

pub fn check_precompiled_signature(bytes: &[u8]) -> std::result::Result<(), String> {
    if bytes.is_empty() {
        return Err("buffer is empty".to_string());
    }
    if bytes.len() < PRECOMPILED_MIN_LEN {
        return Err(format!("buffer too short ({} bytes)", bytes.len()));
    }
    match bytes[0] {
        // msgpack 的 fixmap、map16、map32 開頭
        0x80..=0x8f | 0xde | 0xdf => Ok(()),
        // 常見錯誤：伺服器回傳 HTML 錯誤頁
        b'<' => Err("buffer looks like an HTML document".to_string()),
        other => Err(format!("unexpected signature byte 0x{:02x}", other)),
    }
}

/// 降級模式用的高對比棋盤格目標
pub fn placeholder_target() -> Result<TargetAsset> {
    let img = image::RgbImage::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
        if (x / PLACEHOLDER_CELL + y / PLACEHOLDER_CELL) % 2 == 0 {
            image::Rgb([0, 0, 0])
        } else {
            image::Rgb([255, 255, 255])
        }
    });

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    let dims = Dimensions::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE);

    Ok(TargetAsset::new(
        PLACEHOLDER_URL,
        TargetKind::RawImage,
        Some(dims),
        Some(dims),
        buf,
        ValidationStatus::Valid,
    )
    .into_placeholder())
}
