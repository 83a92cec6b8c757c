//! Port定義（キャプチャ抽象のインターフェース）
//!
//! Domain層が外部実装に依存するための抽象trait。
//! Infrastructure層の各バックエンドがこれを実装し、
//! FrameSourceがopen時に選択して保持する。

use crate::domain::{Frame, VisionResult};
use std::time::Duration;

/// キャプチャバックエンドの種類
///
/// open時にどのバックエンドが有効になったかを示すタグ。
/// 診断ログ用であり、実行中に切り替わることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// ハードウェア支援キャプチャ（低レイテンシ、優先）
    Accelerated,
    /// 汎用低レベルビデオインターフェース（fallback）
    Generic,
    /// 合成フレーム生成（テスト・カメラなし開発用）
    Synthetic,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Accelerated => "accelerated",
            BackendKind::Generic => "generic",
            BackendKind::Synthetic => "synthetic",
        }
    }
}

/// キャプチャデバイスの情報
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub name: String,
}

/// キャプチャポート: フレーム取得の抽象化
///
/// 実装は1つのデバイスハンドルを排他的に所有し、Dropで確実に解放する。
pub trait CapturePort: Send {
    /// 次のフレームを取得する
    ///
    /// タイムアウトまでブロックする。デバイスのネイティブ表現のまま
    /// 返してよいが、BGR・3チャンネルに変換済みであること。
    /// ミラーリングは呼び出し側（FrameSource）が適用する。
    ///
    /// # Returns
    /// - `Ok(Some(Frame))`: フレームの取得成功
    /// - `Ok(None)`: タイムアウト（このサイクルをスキップ）
    /// - `Err(VisionError::CaptureLost)`: デバイス切断（再オープンが必要）
    fn next_frame(&mut self, timeout: Duration) -> VisionResult<Option<Frame>>;

    /// このバックエンドの種類を取得
    fn backend(&self) -> BackendKind;

    /// デバイス情報を取得
    fn device_info(&self) -> DeviceInfo;
}
