//! ログ・トレーシング基盤
//!
//! tracingを使用した統一的なログ出力。
//! ヘッドレス運用ではログが唯一の観測手段になるため、
//! ビルドモードに関わらず常に有効化する。
//! ファイル出力は非同期（tracing-appender）でメインループへの影響を抑える。

use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログシステムを初期化
///
/// # Arguments
/// - `log_level`: ログレベル（"info", "debug", "trace"等）。
///   環境変数 `RUST_LOG` が設定されていればそちらが優先される
/// - `json_format`: JSON形式で出力するか
/// - `log_dir`: ログファイル出力先（None = 標準出力）
///
/// # Returns
/// ファイル出力時は `Some(WorkerGuard)`。プログラム終了まで保持必須
/// （Drop時にログスレッドがフラッシュ・終了する）。
/// 標準出力時、または既にsubscriberが設定済みの場合は None
pub fn init_logging(
    log_level: &str,
    json_format: bool,
    log_dir: Option<PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                return None;
            }

            let file_appender = tracing_appender::rolling::daily(dir, "rainbow_vision.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = tracing_subscriber::registry().with(env_filter);

            let result = if json_format {
                subscriber
                    .with(fmt::layer().json().with_writer(non_blocking))
                    .try_init()
            } else {
                subscriber
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_ansi(false) // ファイル出力時はANSIエスケープ無効
                            .with_writer(non_blocking),
                    )
                    .try_init()
            };

            if result.is_err() {
                return None;
            }

            info!(
                "Logging initialized (async file): level={}, format={}",
                log_level,
                if json_format { "json" } else { "text" }
            );
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::registry().with(env_filter);

            let result = if json_format {
                subscriber.with(fmt::layer().json()).try_init()
            } else {
                subscriber
                    .with(fmt::layer().with_target(true))
                    .try_init()
            };

            if result.is_ok() {
                info!(
                    "Logging initialized (stdout): level={}, format={}",
                    log_level,
                    if json_format { "json" } else { "text" }
                );
            }
            None
        }
    }
}
