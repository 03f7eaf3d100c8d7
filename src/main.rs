use ar_session::adapters::http::{HttpAnalytics, HttpAssetFetcher, HttpCampaignProvider};
use ar_session::adapters::simulated::{sample_png, MemoryFetcher, SimCamera, SimulatedPlatform};
use ar_session::config::cli::{CliCommand, PrepareArgs, SimulateArgs};
use ar_session::core::preparator::{infer_kind, TargetPreparator};
use ar_session::domain::model::{AnchorEvent, SocialLinks, TargetKind};
use ar_session::domain::ports::{AssetFetcher, CampaignProvider};
use ar_session::utils::debug_log::DebugLog;
use ar_session::utils::error::{ArError, ErrorSeverity};
use ar_session::utils::logger::{self, LogFormat};
use ar_session::utils::validation::Validate;
use ar_session::{CampaignMetadata, CliConfig, LifecycleEvent, Session, SessionConfig, SessionHandle};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const DEMO_TARGET: &str = "demo://poster.png";
const DEMO_VIDEO: &str = "demo://clip.mp4";
const DETECTION_STEP: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_logger(LogFormat::from_env(), cli.verbose);

    tracing::info!("Starting ar-session CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = cli.validate() {
        fail(&e);
    }
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    let result = match &cli.command {
        CliCommand::Prepare(args) => prepare(args, &config).await,
        CliCommand::Simulate(args) => simulate(args, config).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => fail(&e),
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> ar_session::Result<SessionConfig> {
    let config = match path {
        Some(path) => {
            tracing::info!("📄 Loading session config: {}", path);
            SessionConfig::from_file(path)?
        }
        None => SessionConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn fail(e: &ArError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

async fn prepare(args: &PrepareArgs, config: &SessionConfig) -> ar_session::Result<bool> {
    let log = DebugLog::new(config.diagnostics.debug_log_capacity);
    let preparator = TargetPreparator::new(Arc::new(HttpAssetFetcher::new()), config.asset.clone(), log);

    tracing::info!("🎯 Preparing target: {}", args.source);
    let kind = if args.precompiled {
        TargetKind::PrecompiledTarget
    } else {
        infer_kind(&args.source)
    };
    let asset = preparator.prepare(&args.source, kind).await;
    if !asset.is_valid() {
        return Err(ArError::AssetCorruptionError {
            message: format!("{} failed validation", args.source),
        });
    }

    match (asset.original_dimensions(), asset.dimensions()) {
        (Some(before), Some(after)) if asset.was_resized() => {
            tracing::info!("📐 Downsampled {} -> {}", before, after)
        }
        (_, Some(dims)) => tracing::info!("📐 Dimensions: {}", dims),
        _ => tracing::info!("📦 Precompiled target, {} bytes", asset.payload().len()),
    }

    if let Some(out) = &args.out {
        tokio::fs::write(out, asset.payload()).await?;
        tracing::info!("📁 Payload saved to: {}", out);
    }

    println!("✅ Target ready: {:?}, {} bytes", asset.kind(), asset.payload().len());
    Ok(true)
}

async fn simulate(args: &SimulateArgs, config: SessionConfig) -> ar_session::Result<bool> {
    let (campaign, fetcher): (CampaignMetadata, Arc<dyn AssetFetcher>) = match &args.campaign {
        Some(url) => {
            tracing::info!("📥 Fetching campaign: {}", url);
            let campaign = HttpCampaignProvider::new(url.clone())?.fetch_campaign().await?;
            (campaign, Arc::new(HttpAssetFetcher::new()))
        }
        None => {
            let target = sample_png(1200, 1800)?;
            (demo_campaign(), Arc::new(MemoryFetcher::new().with_asset(DEMO_TARGET, target)))
        }
    };

    let mut sim = SimulatedPlatform::new(fetcher).with_autoplay(args.autoplay.into());
    if args.deny_camera {
        sim = sim.with_camera(SimCamera::denied);
    }
    if args.corrupt_engine {
        sim = sim.with_engines(|engines| engines.with_corrupt_targets());
    }

    let mut platform = sim.platform();
    if config.analytics.endpoint.is_some() {
        platform.analytics = Arc::new(HttpAnalytics::from_config(&config.analytics)?);
    }

    let design = campaign.design_dimensions();
    let mount = sim.mount("ar-container").with_zero_checks(args.zero_size);
    let session = Session::new(Box::new(mount), platform, config);
    let mut events = session.subscribe();
    tracing::info!("🚀 Session {} starting", session.id());
    let handle = SessionHandle::spawn(session, campaign);

    let ready = wait_until_settled(&mut events).await;
    if ready {
        if let Some(bus) = sim.engines.last_bus() {
            for visible in args.detection_script() {
                let event = if visible {
                    AnchorEvent::found(design.width as f32 * 0.5, design.height as f32 * 0.5)
                } else {
                    AnchorEvent::lost()
                };
                bus.publish(event);
                tokio::time::sleep(DETECTION_STEP).await;
                drain(&mut events);
            }
        }
    }

    let session = handle.shutdown().await?;
    drain(&mut events);

    println!("📊 Session summary");
    println!("   state:          {}", session.state());
    println!("   degraded:       {}", session.is_degraded());
    println!(
        "   container:      {} retr(ies), {}ms backoff",
        session.retry_count(),
        session.total_backoff_ms()
    );
    let entries = session.debug_log().entries();
    println!("   debug entries:  {}", entries.len());
    println!("   analytics:      {:?}", sim.analytics.kinds());
    if let Some(error) = session.last_error() {
        println!("   last error:     [{}] {}", error.kind, error.message);
    }

    println!("🪵 Debug log");
    for entry in entries {
        println!(
            "   {} {:<5} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            format!("{:?}", entry.severity).to_uppercase(),
            entry.message
        );
    }

    Ok(ready)
}

/// session 進到 Ready 回傳 `true`；先失敗或停止則回傳 `false`
async fn wait_until_settled(events: &mut broadcast::Receiver<LifecycleEvent>) -> bool {
    loop {
        match events.recv().await {
            Ok(event) => {
                print_event(&event);
                match event {
                    LifecycleEvent::ArReady { .. } => return true,
                    // 降級警告之後仍會收到 ArReady
                    LifecycleEvent::Error { kind, .. } if kind != "asset_corruption" => return false,
                    LifecycleEvent::Stopped => return false,
                    _ => {}
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

fn drain(events: &mut broadcast::Receiver<LifecycleEvent>) {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

fn print_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::CameraActive => println!("📷 Camera active"),
        LifecycleEvent::ArReady { degraded: false } => println!("✅ AR ready"),
        LifecycleEvent::ArReady { degraded: true } => println!("✅ AR ready (degraded)"),
        LifecycleEvent::TargetDetected { detected: true } => println!("🎯 Target detected"),
        LifecycleEvent::TargetDetected { detected: false } => println!("👀 Target lost"),
        LifecycleEvent::VideoPlaying { playing: true } => println!("▶️  Video playing"),
        LifecycleEvent::VideoPlaying { playing: false } => println!("⏸️  Video paused"),
        LifecycleEvent::VideoMuted { muted: true } => println!("🔇 Video muted"),
        LifecycleEvent::VideoMuted { muted: false } => println!("🔊 Video unmuted"),
        LifecycleEvent::TapToPlay => println!("👆 Tap to play"),
        LifecycleEvent::Error {
            kind,
            message,
            blocking,
        } => {
            let icon = if *blocking { "❌" } else { "⚠️ " };
            println!("{} [{}] {}", icon, kind, message);
        }
        LifecycleEvent::Stopped => println!("⏹️  Session stopped"),
    }
}

fn demo_campaign() -> CampaignMetadata {
    CampaignMetadata {
        target_image_url: DEMO_TARGET.to_string(),
        precompiled_target_url: None,
        video_url: DEMO_VIDEO.to_string(),
        design_width: 1200,
        design_height: 1800,
        social: SocialLinks::default(),
    }
}
