//! キャプチャ層
//!
//! 設定された優先順でバックエンドを試行し、最初に成功したものを使う
//! `FrameSource` を提供する。個々のバックエンド失敗は警告ログのみで
//! 外部には現れず、全滅した場合のみ `CaptureUnavailable` となる。
//! ミラーリングはこの層で適用され、下流は常に鏡像座標系を見る。

pub mod common;
pub mod synthetic;

#[cfg(feature = "accel-capture")]
pub mod accel;
#[cfg(feature = "v4l2-capture")]
pub mod v4l2;

pub use synthetic::SyntheticCaptureAdapter;

use crate::domain::{
    BackendChoice, BackendKind, CaptureConfig, CapturePort, DeviceInfo, Frame, VisionError,
    VisionResult,
};
use tracing::{info, warn};

/// バックエンドを開く関数の型
type OpenFn = Box<dyn Fn(&CaptureConfig) -> VisionResult<Box<dyn CapturePort>> + Send>;

/// 1つのバックエンド候補（種別と開く手段）
pub struct BackendAttempt {
    pub kind: BackendKind,
    pub open: OpenFn,
}

impl BackendAttempt {
    pub fn new(
        kind: BackendKind,
        open: impl Fn(&CaptureConfig) -> VisionResult<Box<dyn CapturePort>> + Send + 'static,
    ) -> Self {
        Self {
            kind,
            open: Box::new(open),
        }
    }
}

/// フォールバック付きフレーム供給源
///
/// 試行リストは再接続時にも同じ順序で再評価される。
pub struct FrameSource {
    adapter: Box<dyn CapturePort>,
    attempts: Vec<BackendAttempt>,
    config: CaptureConfig,
}

impl FrameSource {
    /// 設定の優先順でバックエンドを開く
    pub fn open(config: &CaptureConfig) -> VisionResult<Self> {
        Self::open_with(configured_attempts(config), config.clone())
    }

    /// 明示的な試行リストで開く（テスト用の継ぎ目でもある）
    pub fn open_with(attempts: Vec<BackendAttempt>, config: CaptureConfig) -> VisionResult<Self> {
        let adapter = try_open(&attempts, &config)?;
        Ok(Self {
            adapter,
            attempts,
            config,
        })
    }

    /// 次のフレームを取得
    ///
    /// ミラーリング設定が有効なら水平反転を適用して返す。
    /// タイムアウトは `Ok(None)`、デバイス喪失は `Err(CaptureLost)`。
    pub fn next_frame(&mut self) -> VisionResult<Option<Frame>> {
        match self.adapter.next_frame(self.config.timeout())? {
            Some(mut frame) => {
                if self.config.mirror {
                    common::mirror_horizontal(&mut frame.data, frame.width, frame.height);
                }
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// バックエンドを閉じて試行リストを先頭から再評価する
    ///
    /// 現在と同じバックエンドに戻るとは限らない（上位のバックエンドが
    /// 復帰していればそちらが選ばれる）。
    pub fn reopen(&mut self) -> VisionResult<()> {
        self.adapter = try_open(&self.attempts, &self.config)?;
        Ok(())
    }

    /// 現在アクティブなバックエンド種別
    pub fn active_backend(&self) -> BackendKind {
        self.adapter.backend()
    }

    /// 現在のデバイス情報
    pub fn device_info(&self) -> DeviceInfo {
        self.adapter.device_info()
    }
}

/// 設定の `order` から試行リストを構築
///
/// ビルドに含まれていないバックエンドも試行リストには現れ、開く段階で
/// 失敗する（どの候補がなぜ使えなかったかをログに残すため）。
pub fn configured_attempts(config: &CaptureConfig) -> Vec<BackendAttempt> {
    config
        .order
        .iter()
        .map(|choice| match choice {
            BackendChoice::Accelerated => BackendAttempt::new(BackendKind::Accelerated, |config| {
                open_accelerated(config)
            }),
            BackendChoice::V4l2 => BackendAttempt::new(BackendKind::Generic, |config| {
                open_v4l2(config)
            }),
            BackendChoice::Synthetic => BackendAttempt::new(BackendKind::Synthetic, |config| {
                Ok(Box::new(SyntheticCaptureAdapter::endless(
                    config.width,
                    config.height,
                )) as Box<dyn CapturePort>)
            }),
        })
        .collect()
}

#[cfg(feature = "accel-capture")]
fn open_accelerated(config: &CaptureConfig) -> VisionResult<Box<dyn CapturePort>> {
    accel::AccelCaptureAdapter::open(config).map(|a| Box::new(a) as Box<dyn CapturePort>)
}

#[cfg(not(feature = "accel-capture"))]
fn open_accelerated(_config: &CaptureConfig) -> VisionResult<Box<dyn CapturePort>> {
    Err(VisionError::Initialization(
        "accelerated backend not compiled in (feature accel-capture)".to_string(),
    ))
}

#[cfg(feature = "v4l2-capture")]
fn open_v4l2(config: &CaptureConfig) -> VisionResult<Box<dyn CapturePort>> {
    v4l2::V4l2CaptureAdapter::open(config).map(|a| Box::new(a) as Box<dyn CapturePort>)
}

#[cfg(not(feature = "v4l2-capture"))]
fn open_v4l2(_config: &CaptureConfig) -> VisionResult<Box<dyn CapturePort>> {
    Err(VisionError::Initialization(
        "v4l2 backend not compiled in (feature v4l2-capture)".to_string(),
    ))
}

/// 試行リストを順に評価し、最初に開けたアダプタを返す
fn try_open(
    attempts: &[BackendAttempt],
    config: &CaptureConfig,
) -> VisionResult<Box<dyn CapturePort>> {
    if attempts.is_empty() {
        return Err(VisionError::CaptureUnavailable(
            "no capture backends configured".to_string(),
        ));
    }

    for attempt in attempts {
        match (attempt.open)(config) {
            Ok(adapter) => {
                let info = adapter.device_info();
                info!(
                    backend = attempt.kind.as_str(),
                    device = %info.name,
                    width = info.width,
                    height = info.height,
                    "Capture backend opened"
                );
                return Ok(adapter);
            }
            Err(e) => {
                // フォールバックは正常系。警告のみで次の候補へ
                warn!(
                    backend = attempt.kind.as_str(),
                    error = %e,
                    "Capture backend failed, trying next"
                );
            }
        }
    }

    Err(VisionError::CaptureUnavailable(format!(
        "all {} capture backends failed",
        attempts.len()
    )))
}
