use ar_session::adapters::http::{HttpAnalytics, HttpAssetFetcher, HttpCampaignProvider};
use ar_session::adapters::simulated::{sample_png, SimulatedPlatform};
use ar_session::config::toml_config::AssetConfig;
use ar_session::core::preparator::TargetPreparator;
use ar_session::domain::events::{AnalyticsEvent, AnalyticsKind};
use ar_session::domain::model::{Dimensions, TargetKind, ValidationStatus};
use ar_session::domain::ports::{AnalyticsSink, AssetFetcher, CampaignProvider};
use ar_session::utils::debug_log::DebugLog;
use anyhow::Result;
use ar_session::{ArError, Session, SessionConfig, SessionState};
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_fetch_asset_over_http() {
    let server = MockServer::start();
    let asset_mock = server.mock(|when, then| {
        when.method(GET).path("/targets/poster.png");
        then.status(200)
            .header("Content-Type", "image/png")
            .body(b"not-really-a-png");
    });

    let fetcher = HttpAssetFetcher::new();
    let bytes = tokio_test::assert_ok!(fetcher.fetch(&server.url("/targets/poster.png")).await);

    asset_mock.assert();
    assert_eq!(bytes, b"not-really-a-png");
}

#[tokio::test]
async fn test_missing_asset_is_an_error_and_marks_target_corrupt() {
    let server = MockServer::start();
    let missing = server.mock(|when, then| {
        when.method(GET).path("/targets/gone.png");
        then.status(404);
    });

    let fetcher = Arc::new(HttpAssetFetcher::new());
    let err = fetcher.fetch(&server.url("/targets/gone.png")).await.unwrap_err();
    assert!(matches!(err, ArError::FetchError(_)));

    let log = DebugLog::new(50);
    let preparator = TargetPreparator::new(fetcher, AssetConfig::default(), log.clone());
    let asset = preparator
        .prepare(&server.url("/targets/gone.png"), TargetKind::RawImage)
        .await;

    assert_eq!(asset.validation_status(), ValidationStatus::Corrupt);
    assert!(!asset.is_valid());
    assert_eq!(missing.hits_async().await, 2);
    assert!(log.contains("gone.png"));
}

#[tokio::test]
async fn test_large_target_is_downsampled() {
    let server = MockServer::start();
    let png = sample_png(2400, 1200).unwrap();
    server.mock(|when, then| {
        when.method(GET).path("/targets/wide.png");
        then.status(200).body(png);
    });

    let preparator = TargetPreparator::new(
        Arc::new(HttpAssetFetcher::new()),
        AssetConfig::default(),
        DebugLog::new(50),
    );
    let asset = preparator
        .prepare(&server.url("/targets/wide.png"), TargetKind::RawImage)
        .await;

    assert!(asset.is_valid());
    assert!(asset.was_resized());
    assert_eq!(asset.original_dimensions(), Some(Dimensions::new(2400, 1200)));
    assert_eq!(asset.dimensions(), Some(Dimensions::new(2048, 1024)));
}

#[tokio::test]
async fn test_fetch_campaign() -> Result<()> {
    let server = MockServer::start();
    let campaign_mock = server.mock(|when, then| {
        when.method(GET).path("/campaigns/42");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "target_image_url": "https://cdn.example.com/poster.png",
                "video_url": "https://cdn.example.com/clip.mp4",
                "design_width": 1000,
                "design_height": 1500,
                "social": { "website": "https://brand.example.com" }
            }));
    });

    let provider = HttpCampaignProvider::new(server.url("/campaigns/42"))?;
    let campaign = provider.fetch_campaign().await?;

    campaign_mock.assert();
    assert_eq!(campaign.design_dimensions(), Dimensions::new(1000, 1500));
    assert!(campaign.precompiled_target_url.is_none());
    assert_eq!(campaign.social.website.as_deref(), Some("https://brand.example.com"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_campaign_is_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/campaigns/broken");
        then.status(200).json_body(serde_json::json!({
            "target_image_url": "https://cdn.example.com/poster.png",
            "video_url": "",
            "design_width": 1000,
            "design_height": 1500
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/campaigns/down");
        then.status(503);
    });

    let broken = HttpCampaignProvider::new(server.url("/campaigns/broken")).unwrap();
    assert!(matches!(
        broken.fetch_campaign().await,
        Err(ArError::InvalidConfigValueError { .. })
    ));

    let down = HttpCampaignProvider::new(server.url("/campaigns/down")).unwrap();
    tokio_test::assert_err!(down.fetch_campaign().await);
}

#[tokio::test]
async fn test_analytics_posts_json() {
    let server = MockServer::start();
    let ping = server.mock(|when, then| {
        when.method(POST)
            .path("/ping")
            .header("content-type", "application/json")
            .body_contains("\"kind\":\"degraded_mode\"");
        then.status(204);
    });

    let analytics = HttpAnalytics::new(server.url("/ping")).unwrap();
    analytics.track(AnalyticsEvent::new("ar-1", AnalyticsKind::DegradedMode).with_detail("placeholder"));

    // 背景送出，輪詢直到收到
    for _ in 0..100 {
        if ping.hits_async().await > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(ping.hits_async().await, 1);
}

#[tokio::test]
async fn test_session_with_http_assets_reaches_ready() -> Result<()> {
    let server = MockServer::start();
    let png = sample_png(700, 1000)?;
    let target_mock = server.mock(|when, then| {
        when.method(GET).path("/targets/poster.png");
        then.status(200).body(png);
    });

    let sim = SimulatedPlatform::new(Arc::new(HttpAssetFetcher::new()));
    let mut session = Session::new(Box::new(sim.mount("ar-container")), sim.platform(), SessionConfig::default());
    let campaign = ar_session::CampaignMetadata {
        target_image_url: server.url("/targets/poster.png"),
        precompiled_target_url: None,
        video_url: server.url("/videos/clip.mp4"),
        design_width: 700,
        design_height: 1000,
        social: Default::default(),
    };

    session.start(campaign).await?;

    target_mock.assert();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(
        session.active_target().and_then(|t| t.dimensions()),
        Some(Dimensions::new(700, 1000))
    );
    session.stop().await;
    Ok(())
}
