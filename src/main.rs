mod application;
mod domain;
mod infrastructure;
mod logging;

use crate::application::pipeline::Pipeline;
use crate::application::recovery::{RecoveryState, RecoveryStrategy};
use crate::application::stats::StatsCollector;
use crate::domain::config::AppConfig;
use crate::domain::DetectionResult;
use crate::infrastructure::capture::FrameSource;
use crate::infrastructure::{ColorTracker, MotionDetector};
use crate::logging::init_logging;
use anyhow::Context;
use crossbeam_channel::bounded;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    // 設定ファイルの読み込み（存在しない場合はデフォルト設定を使用）
    let (config, config_note) = match AppConfig::from_file("config.toml") {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // ログシステムの初期化（設定のログセクションに従う）
    // 注意: _guardはmain終了まで保持する必要がある（Dropでログスレッドが終了）
    let _guard = init_logging(
        &config.logging.level,
        config.logging.json,
        config.logging.dir.as_ref().map(PathBuf::from),
    );

    tracing::info!("rainbow_vision starting...");
    match config_note {
        None => tracing::info!("Loaded configuration from config.toml"),
        Some(e) => tracing::warn!("Failed to load config.toml: {}, using defaults", e),
    }

    match run(config) {
        Ok(_) => {
            tracing::info!("rainbow_vision terminated gracefully.");
        }
        Err(e) => {
            tracing::error!("Fatal error: {:?}", e);
            std::process::exit(1);
        }
    }
}

/// アプリケーションのメイン処理
fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    tracing::info!("Configuration validated successfully");
    tracing::info!(
        "Capture: {}x{} @ {}fps, timeout={}ms, mirror={}",
        config.capture.width,
        config.capture.height,
        config.capture.frame_rate,
        config.capture.timeout_ms,
        config.capture.mirror
    );
    tracing::info!(
        "Tracking: {} color bands, motion min_area={}",
        config.color.bands.len(),
        config.motion.min_area
    );

    // キャプチャの初期化（設定の優先順でバックエンドを試行）
    let source = FrameSource::open(&config.capture).context("no capture backend available")?;
    let info = source.device_info();
    tracing::info!(
        "Capture opened: backend={}, {}x{} @ {}fps - {}",
        source.active_backend().as_str(),
        info.width,
        info.height,
        info.frame_rate,
        info.name
    );

    let color = ColorTracker::new(config.color.clone());
    let motion = MotionDetector::new(config.motion.clone());
    let recovery = RecoveryState::new(RecoveryStrategy::from_config(&config.capture));
    let stats = StatsCollector::new(config.pipeline.stats_interval());

    let mut pipeline = Pipeline::new(source, color, motion, recovery, stats);

    // 結果チャンネル: 最新値のみ保持
    let (tx, rx) = bounded::<DetectionResult>(1);
    let running = Arc::new(AtomicBool::new(true));

    // Ctrl-C / SIGTERMで停止フラグを下ろし、実行中のサイクル完了後に
    // キャプチャデバイスを解放して抜ける
    let stop_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        stop_flag.store(false, Ordering::Relaxed);
    })
    .context("failed to install shutdown handler")?;

    // 消費スレッド: 検出結果をログに流す
    // （表示・音声等の消費者はこのチャンネルに差し替えられる）
    let consumer = std::thread::spawn(move || {
        while let Ok(result) = rx.recv() {
            tracing::debug!(
                cycle = result.cycle,
                color_blobs = result.color_blobs.len(),
                motion_blobs = result.motion_blobs.len(),
                "Detection result"
            );
        }
    });

    // パイプラインの起動（ブロッキング）
    let result = pipeline.run(tx, running);

    let _ = consumer.join();
    result.context("pipeline terminated")?;

    Ok(())
}
