//! エラー型定義
//!
//! Domain層の統一エラー型。thiserrorを使用して型安全なエラー処理を提供する。
//!
//! # 設計方針
//! - 非テストコードでのunwrap()を禁止し、Resultでエラー伝播を明示する
//! - キャプチャのタイムアウトはエラーではなく `Ok(None)` で表現する
//!   （1サイクルのスキップであり、回復可能な通常動作のため）
//! - 不正なフレーム形状など契約違反はResultではなくassertで落とす

use thiserror::Error;

/// Domain層の統一エラー型
#[derive(Error, Debug)]
pub enum VisionError {
    /// どのキャプチャバックエンドも初期化できなかった（起動時致命的）
    ///
    /// 映像なし＝インタラクション不能のため、システム全体を停止する。
    #[error("no capture backend available: {0}")]
    CaptureUnavailable(String),

    /// キャプチャデバイスが実行中に切断・故障した
    ///
    /// 限られた回数だけバックオフ付きで再オープンを試み、
    /// 尽きた時点で致命的エラーに昇格する。
    #[error("capture device lost: {0}")]
    CaptureLost(String),

    /// 個別バックエンドの初期化失敗（fallback判断に使用）
    #[error("backend initialization failed: {0}")]
    Initialization(String),

    /// 設定関連のエラー
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Domain層の統一Result型
pub type VisionResult<T> = Result<T, VisionError>;
