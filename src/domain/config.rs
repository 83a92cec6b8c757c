//! 設定管理
//!
//! TOML設定ファイルの読み込みとDomain型への変換。
//! 色バンドテーブル・しきい値・カーネルサイズはすべてここで一元管理し、
//! コード中に定数を散在させない。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::{ColorBand, HsvRange, VisionError, VisionResult};

/// キャプチャバックエンドの選択肢
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// ハードウェア支援キャプチャ（feature: accel-capture）
    Accelerated,
    /// 汎用V4L2キャプチャ（feature: v4l2-capture）
    V4l2,
    /// 合成フレーム生成（カメラなし開発用）
    Synthetic,
}

/// アプリケーション設定のルート構造
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// キャプチャ設定
    pub capture: CaptureConfig,
    /// 色追跡設定
    pub color: ColorConfig,
    /// 動き検出設定
    pub motion: MotionConfig,
    /// パイプライン設定
    pub pipeline: PipelineSettings,
    /// ログ設定
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// キャプチャ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureConfig {
    /// バックエンド試行順（open時に先頭から順に初期化を試みる）
    ///
    /// デフォルト: ["accelerated", "v4l2"]
    #[serde(default = "default_backend_order")]
    pub order: Vec<BackendChoice>,

    /// カメラデバイスのインデックス
    ///
    /// 通常は0
    pub device_index: u32,

    /// 要求するフレーム幅（ピクセル）
    pub width: u32,

    /// 要求するフレーム高さ（ピクセル）
    pub height: u32,

    /// 要求するフレームレート（fps）
    pub frame_rate: u32,

    /// 水平ミラーリングを適用するか
    ///
    /// 鏡面効果（表示と追跡座標系を一致させる）のためキャプチャ層で反転する。
    /// デフォルト: true
    #[serde(default = "default_mirror")]
    pub mirror: bool,

    /// フレーム待ちタイムアウト（ミリ秒）
    ///
    /// デフォルト: 500ms
    pub timeout_ms: u64,

    /// 連続タイムアウト許容回数
    ///
    /// この回数を超えたら再オープンを実行
    /// デフォルト: 10回
    pub max_consecutive_timeouts: u32,

    /// 再オープンの最大試行回数（超えたら致命的エラー）
    ///
    /// デフォルト: 5回
    pub max_reopen_attempts: u32,

    /// 再オープン時の初期待機時間（ミリ秒）
    ///
    /// デフォルト: 100ms
    pub reopen_initial_delay_ms: u64,

    /// 再オープン時の最大待機時間（ミリ秒、指数バックオフの上限）
    ///
    /// デフォルト: 5000ms
    pub reopen_max_delay_ms: u64,
}

fn default_backend_order() -> Vec<BackendChoice> {
    vec![BackendChoice::Accelerated, BackendChoice::V4l2]
}

fn default_mirror() -> bool {
    true
}

impl CaptureConfig {
    /// デフォルトのフレーム幅
    pub const DEFAULT_WIDTH: u32 = 1280;
    /// デフォルトのフレーム高さ
    pub const DEFAULT_HEIGHT: u32 = 720;
    /// デフォルトのフレームレート
    pub const DEFAULT_FRAME_RATE: u32 = 30;
    /// デフォルトのキャプチャタイムアウト（ミリ秒）
    pub const DEFAULT_TIMEOUT_MS: u64 = 500;
    /// デフォルトの連続タイムアウト閾値
    pub const DEFAULT_MAX_CONSECUTIVE_TIMEOUTS: u32 = 10;
    /// デフォルトの再オープン試行上限
    pub const DEFAULT_MAX_REOPEN_ATTEMPTS: u32 = 5;
    /// デフォルトの再オープン初期遅延（ミリ秒）
    pub const DEFAULT_REOPEN_INITIAL_DELAY_MS: u64 = 100;
    /// デフォルトの再オープン最大遅延（ミリ秒）
    pub const DEFAULT_REOPEN_MAX_DELAY_MS: u64 = 5000;

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reopen_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_initial_delay_ms)
    }

    pub fn reopen_max_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_max_delay_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            order: default_backend_order(),
            device_index: 0,
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            frame_rate: Self::DEFAULT_FRAME_RATE,
            mirror: true,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            max_consecutive_timeouts: Self::DEFAULT_MAX_CONSECUTIVE_TIMEOUTS,
            max_reopen_attempts: Self::DEFAULT_MAX_REOPEN_ATTEMPTS,
            reopen_initial_delay_ms: Self::DEFAULT_REOPEN_INITIAL_DELAY_MS,
            reopen_max_delay_ms: Self::DEFAULT_REOPEN_MAX_DELAY_MS,
        }
    }
}

/// HSVレンジ設定
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct HsvRangeConfig {
    /// H（色相）の最小値（OpenCV準拠: H [0-180]）
    pub h_min: u8,
    /// H（色相）の最大値
    pub h_max: u8,
    /// S（彩度）の最小値（[0-255]）
    pub s_min: u8,
    /// S（彩度）の最大値
    pub s_max: u8,
    /// V（明度）の最小値（[0-255]）
    pub v_min: u8,
    /// V（明度）の最大値
    pub v_max: u8,
}

impl From<HsvRangeConfig> for HsvRange {
    fn from(c: HsvRangeConfig) -> Self {
        HsvRange::new(c.h_min, c.h_max, c.s_min, c.s_max, c.v_min, c.v_max)
    }
}

/// 1つの色バンドの設定
///
/// 赤のように色相が循環境界（0/180）をまたぐ色は、
/// レンジを2つ並べてunionとして表現する。
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BandConfig {
    /// バンド識別子
    pub band: ColorBand,
    /// HSVレンジ（1つまたは2つ）
    pub ranges: Vec<HsvRangeConfig>,
    /// 最小検出面積（ピクセル数、これ未満の領域は破棄）
    pub min_area: u32,
}

impl BandConfig {
    pub fn hsv_ranges(&self) -> Vec<HsvRange> {
        self.ranges.iter().map(|r| HsvRange::from(*r)).collect()
    }
}

/// 色追跡設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColorConfig {
    /// 追跡する色バンドのテーブル
    ///
    /// デフォルト: 6色（red/blue/green/yellow/orange/purple）
    pub bands: Vec<BandConfig>,

    /// モルフォロジーカーネルの半径（ピクセル）
    ///
    /// 0で ノイズ除去を無効化。デフォルト: 2（5x5近傍相当）
    pub kernel_radius: u32,

    /// 収縮（erode）の繰り返し回数
    ///
    /// デフォルト: 1
    pub erode_iterations: u32,

    /// 膨張（dilate）の繰り返し回数
    ///
    /// デフォルト: 2（収縮分の復元＋分断領域の再結合）
    pub dilate_iterations: u32,
}

impl ColorConfig {
    /// デフォルトの最小検出面積（ピクセル）
    pub const DEFAULT_MIN_AREA: u32 = 800;
    /// デフォルトのカーネル半径
    pub const DEFAULT_KERNEL_RADIUS: u32 = 2;
    /// デフォルトの収縮回数
    pub const DEFAULT_ERODE_ITERATIONS: u32 = 1;
    /// デフォルトの膨張回数
    pub const DEFAULT_DILATE_ITERATIONS: u32 = 2;

    /// 6色のデフォルトバンドテーブル
    fn default_bands() -> Vec<BandConfig> {
        let range = |h_min, h_max, s_min, v_min| HsvRangeConfig {
            h_min,
            h_max,
            s_min,
            s_max: 255,
            v_min,
            v_max: 255,
        };

        vec![
            // 赤は色相0/180をまたぐため2レンジのunion
            BandConfig {
                band: ColorBand::Red,
                ranges: vec![range(0, 10, 120, 70), range(170, 180, 120, 70)],
                min_area: Self::DEFAULT_MIN_AREA,
            },
            BandConfig {
                band: ColorBand::Blue,
                ranges: vec![range(100, 130, 120, 70)],
                min_area: Self::DEFAULT_MIN_AREA,
            },
            BandConfig {
                band: ColorBand::Green,
                ranges: vec![range(35, 85, 80, 70)],
                min_area: Self::DEFAULT_MIN_AREA,
            },
            BandConfig {
                band: ColorBand::Yellow,
                ranges: vec![range(20, 35, 100, 100)],
                min_area: Self::DEFAULT_MIN_AREA,
            },
            BandConfig {
                band: ColorBand::Orange,
                ranges: vec![range(10, 20, 120, 100)],
                min_area: Self::DEFAULT_MIN_AREA,
            },
            BandConfig {
                band: ColorBand::Purple,
                ranges: vec![range(130, 170, 80, 70)],
                min_area: Self::DEFAULT_MIN_AREA,
            },
        ]
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            bands: Self::default_bands(),
            kernel_radius: Self::DEFAULT_KERNEL_RADIUS,
            erode_iterations: Self::DEFAULT_ERODE_ITERATIONS,
            dilate_iterations: Self::DEFAULT_DILATE_ITERATIONS,
        }
    }
}

/// 動き検出設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MotionConfig {
    /// 差分前のGaussianブラーのシグマ
    ///
    /// センサノイズの抑制用。デフォルト: 3.5（21x21カーネル相当）
    pub blur_sigma: f32,

    /// フレーム差分の二値化しきい値 [1-255]
    ///
    /// デフォルト: 30
    pub diff_threshold: u8,

    /// 膨張カーネルの半径（ピクセル）
    ///
    /// 近接する変化ピクセルを1つの領域にまとめる。
    /// デフォルト: 4（9x9近傍相当）
    pub kernel_radius: u32,

    /// 膨張の繰り返し回数
    ///
    /// デフォルト: 2
    pub dilate_iterations: u32,

    /// 最小検出面積（ピクセル数）
    ///
    /// センサノイズと照明のちらつきを除外する。デフォルト: 1500
    pub min_area: u32,
}

impl MotionConfig {
    pub const DEFAULT_BLUR_SIGMA: f32 = 3.5;
    pub const DEFAULT_DIFF_THRESHOLD: u8 = 30;
    pub const DEFAULT_KERNEL_RADIUS: u32 = 4;
    pub const DEFAULT_DILATE_ITERATIONS: u32 = 2;
    pub const DEFAULT_MIN_AREA: u32 = 1500;
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            diff_threshold: Self::DEFAULT_DIFF_THRESHOLD,
            kernel_radius: Self::DEFAULT_KERNEL_RADIUS,
            dilate_iterations: Self::DEFAULT_DILATE_ITERATIONS,
            min_area: Self::DEFAULT_MIN_AREA,
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineSettings {
    /// 統計情報の出力間隔（秒）
    pub stats_interval_sec: u64,
}

impl PipelineSettings {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_sec)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stats_interval_sec: 10,
        }
    }
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    /// ログレベル（"info", "debug", "trace"等）
    pub level: String,

    /// JSON形式で出力するか
    pub json: bool,

    /// ログファイル出力先ディレクトリ（省略時は標準出力）
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// TOMLファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> VisionResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VisionError::Configuration(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| VisionError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// デフォルト設定をTOMLファイルに書き出す
    pub fn write_default<P: AsRef<Path>>(path: P) -> VisionResult<()> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| VisionError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VisionError::Configuration(format!("Failed to write config file: {}", e)))
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> VisionResult<()> {
        // キャプチャの検証
        if self.capture.order.is_empty() {
            return Err(VisionError::Configuration(
                "Capture backend order must not be empty".to_string(),
            ));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(VisionError::Configuration(
                "Capture width and height must be greater than 0".to_string(),
            ));
        }
        if self.capture.timeout_ms == 0 {
            return Err(VisionError::Configuration(
                "Capture timeout must be greater than 0".to_string(),
            ));
        }

        // 色バンドの検証
        if self.color.bands.is_empty() {
            return Err(VisionError::Configuration(
                "At least one color band must be configured".to_string(),
            ));
        }
        for band in &self.color.bands {
            if band.ranges.is_empty() || band.ranges.len() > 2 {
                return Err(VisionError::Configuration(format!(
                    "Band '{}' must have 1 or 2 HSV ranges, got {}",
                    band.band.as_str(),
                    band.ranges.len()
                )));
            }
            for r in &band.ranges {
                if r.h_min > 180 || r.h_max > 180 || r.h_min > r.h_max {
                    return Err(VisionError::Configuration(format!(
                        "Band '{}': invalid H range (must be 0-180, min <= max)",
                        band.band.as_str()
                    )));
                }
                if r.s_min > r.s_max || r.v_min > r.v_max {
                    return Err(VisionError::Configuration(format!(
                        "Band '{}': invalid S/V range (min must be <= max)",
                        band.band.as_str()
                    )));
                }
            }
        }

        // 動き検出の検証
        if self.motion.diff_threshold == 0 {
            return Err(VisionError::Configuration(
                "Motion diff threshold must be greater than 0".to_string(),
            ));
        }
        if self.motion.blur_sigma <= 0.0 {
            return Err(VisionError::Configuration(
                "Motion blur sigma must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
