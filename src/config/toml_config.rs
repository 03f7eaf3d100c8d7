use crate::domain::ports::{EngineOptions, FacingMode};
use crate::utils::error::{ArError, Result};
use crate::utils::validation::{validate_positive_number, validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub retry: RetryConfig,
    pub libraries: LibraryConfig,
    pub asset: AssetConfig,
    pub engine: EngineConfig,
    pub overlay: OverlayConfig,
    pub playback: PlaybackConfig,
    pub camera: CameraConfig,
    pub diagnostics: DiagnosticsConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// 延遲 = min(base * 2^attempt, max)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub fallback_url: Option<String>,
    pub fallback_poll_attempts: u32,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_poll_attempts: 50,
            fallback_url: Some(
                "https://cdn.jsdelivr.net/npm/mind-ar@1.2.5/dist/mindar-image-three.prod.js"
                    .to_string(),
            ),
            fallback_poll_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            min_dimension: 512,
            max_dimension: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub warn_timeout_ms: u64,
    pub give_up_timeout_ms: u64,
    pub prefer_precompiled: bool,
    pub max_track: u32,
    pub filter_min_cf: Option<f32>,
    pub filter_beta: Option<f32>,
    pub warmup_tolerance: Option<u32>,
    pub miss_tolerance: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            warn_timeout_ms: 15_000,
            give_up_timeout_ms: 30_000,
            prefer_precompiled: false,
            max_track: options.max_track,
            filter_min_cf: options.filter_min_cf,
            filter_beta: options.filter_beta,
            warmup_tolerance: options.warmup_tolerance,
            miss_tolerance: options.miss_tolerance,
        }
    }
}

impl EngineConfig {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            max_track: self.max_track,
            filter_min_cf: self.filter_min_cf,
            filter_beta: self.filter_beta,
            warmup_tolerance: self.warmup_tolerance,
            miss_tolerance: self.miss_tolerance,
            simplified: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub debounce_ms: u64,
    pub loop_video: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            loop_video: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub facing: FacingMode,
    pub fallback_to_any: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            fallback_to_any: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub debug_log_capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            debug_log_capacity: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub endpoint: Option<String>,
}

impl SessionConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ArError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ArError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ANALYTICS_URL})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ArError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_range("retry.max_retries", self.retry.max_retries, 0, 10)?;
        validate_positive_number("retry.base_delay_ms", self.retry.base_delay_ms, 1)?;
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ArError::InvalidConfigValueError {
                field: "retry.max_delay_ms".to_string(),
                value: self.retry.max_delay_ms.to_string(),
                reason: "Must not be smaller than retry.base_delay_ms".to_string(),
            });
        }

        validate_positive_number("libraries.poll_interval_ms", self.libraries.poll_interval_ms, 1)?;
        validate_positive_number(
            "libraries.max_poll_attempts",
            self.libraries.max_poll_attempts as u64,
            1,
        )?;
        if let Some(url) = &self.libraries.fallback_url {
            validate_url("libraries.fallback_url", url)?;
        }

        validate_positive_number("asset.min_dimension", self.asset.min_dimension as u64, 1)?;
        if self.asset.max_dimension < self.asset.min_dimension {
            return Err(ArError::InvalidConfigValueError {
                field: "asset.max_dimension".to_string(),
                value: self.asset.max_dimension.to_string(),
                reason: "Must not be smaller than asset.min_dimension".to_string(),
            });
        }

        validate_positive_number("engine.warn_timeout_ms", self.engine.warn_timeout_ms, 1)?;
        if self.engine.give_up_timeout_ms <= self.engine.warn_timeout_ms {
            return Err(ArError::InvalidConfigValueError {
                field: "engine.give_up_timeout_ms".to_string(),
                value: self.engine.give_up_timeout_ms.to_string(),
                reason: "Must be longer than engine.warn_timeout_ms".to_string(),
            });
        }
        validate_range("engine.max_track", self.engine.max_track, 1, 4)?;

        validate_range("overlay.min_scale", self.overlay.min_scale, 0.001, 1.0)?;
        validate_range("overlay.max_scale", self.overlay.max_scale, 1.0, 1000.0)?;

        validate_range("playback.debounce_ms", self.playback.debounce_ms, 0, 5_000)?;
        validate_positive_number(
            "diagnostics.debug_log_capacity",
            self.diagnostics.debug_log_capacity as u64,
            1,
        )?;

        if let Some(endpoint) = &self.analytics.endpoint {
            validate_url("analytics.endpoint", endpoint)?;
        }

        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.playback.debounce_ms)
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.engine.give_up_timeout_ms, 30_000);
        assert_eq!(config.playback.debounce_ms, 100);
    }

    #[test]
    fn test_backoff_delays() {
        let retry = RetryConfig::default();
        let delays: Vec<u64> = (0..5).map(|i| retry.delay_for(i).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
        assert_eq!(retry.delay_for(200).as_millis(), 5000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
[retry]
max_retries = 5

[engine]
prefer_precompiled = true
"#;
        let config = SessionConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(config.engine.prefer_precompiled);
        assert_eq!(config.asset.max_dimension, 2048);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("AR_TEST_ANALYTICS", "https://stats.example.com/ping");

        let toml_content = r#"
[analytics]
endpoint = "${AR_TEST_ANALYTICS}"
"#;
        let config = SessionConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.analytics.endpoint.as_deref(),
            Some("https://stats.example.com/ping")
        );

        std::env::remove_var("AR_TEST_ANALYTICS");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[engine]
warn_timeout_ms = 30000
give_up_timeout_ms = 15000
"#;
        let config = SessionConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let bad_url = SessionConfig::from_toml_str("[analytics]\nendpoint = \"not a url\"").unwrap();
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[camera]\nfacing = \"user\"\nfallback_to_any = false\n")
            .unwrap();

        let config = SessionConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.camera.facing, FacingMode::User);
        assert!(!config.camera.fallback_to_any);
    }

    #[test]
    fn test_invalid_toml() {
        let result = SessionConfig::from_toml_str("[retry\nmax_retries = ");
        assert!(matches!(result, Err(ArError::ConfigValidationError { .. })));
    }
}
