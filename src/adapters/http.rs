use crate::config::toml_config::AnalyticsConfig;
use crate::domain::events::AnalyticsEvent;
use crate::domain::model::CampaignMetadata;
use crate::domain::ports::{AnalyticsSink, AssetFetcher, CampaignProvider};
use crate::utils::error::Result;
use crate::utils::validation::{validate_required_field, validate_url, Validate};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use url::Url;

/// 透過 http(s)、`file://` 或相對於 base 目錄的路徑讀取目標資產
pub struct HttpAssetFetcher {
    client: Client,
    base_dir: Option<PathBuf>,
}

impl HttpAssetFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn local_path(&self, location: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(location),
            None => PathBuf::from(location),
        }
    }
}

impl Default for HttpAssetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                tracing::debug!("Fetching asset: {}", url);
                let response = self.client.get(url).send().await?.error_for_status()?;
                tracing::debug!("Asset response status: {}", response.status());
                return Ok(response.bytes().await?.to_vec());
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .unwrap_or_else(|_| PathBuf::from(url.path())),
            _ => self.local_path(location),
        };

        tracing::debug!("Reading asset from {}", path.display());
        Ok(tokio::fs::read(&path).await?)
    }
}

/// 從後端 API 取得活動資料
pub struct HttpCampaignProvider {
    client: Client,
    endpoint: String,
}

impl HttpCampaignProvider {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        validate_url("campaign_endpoint", &endpoint)?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl CampaignProvider for HttpCampaignProvider {
    async fn fetch_campaign(&self) -> Result<CampaignMetadata> {
        let campaign: CampaignMetadata = match Url::parse(&self.endpoint) {
            // 本機除錯用的 file:// 活動檔
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .unwrap_or_else(|_| PathBuf::from(url.path()));
                let bytes = tokio::fs::read(&path).await?;
                serde_json::from_slice(&bytes)?
            }
            _ => {
                tracing::debug!("Making campaign request to: {}", self.endpoint);
                let response = self
                    .client
                    .get(&self.endpoint)
                    .send()
                    .await?
                    .error_for_status()?;
                response.json().await?
            }
        };
        campaign.validate()?;
        Ok(campaign)
    }
}

/// 每個事件以 JSON POST 送出後不等待。失敗只記錄，不重試。
pub struct HttpAnalytics {
    client: Client,
    endpoint: String,
}

impl HttpAnalytics {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        validate_url("analytics.endpoint", &endpoint)?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        let endpoint = validate_required_field("analytics.endpoint", &config.endpoint)?;
        Self::new(endpoint.clone())
    }
}

impl AnalyticsSink for HttpAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available; analytics event {:?} dropped", event.kind);
            return;
        };

        let request = self.client.post(&self.endpoint).json(&event);
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!("Analytics ping rejected: {}", response.status());
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Analytics ping failed: {}", e),
            }
        });
    }
}

/// 未設定 analytics 端點時使用
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        tracing::trace!("Analytics disabled; skipped {:?}", event.kind);
    }
}
