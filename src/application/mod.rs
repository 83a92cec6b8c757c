//! Application層
//!
//! パイプライン制御、再接続ロジック、統計管理のユースケースを実装する。
//!
//! ## モジュール構成
//! - `pipeline`: サイクル実行制御（取得→色追跡→動き検出→発行）
//! - `recovery`: キャプチャ再接続ロジック（指数バックオフ）
//! - `stats`: 統計情報管理（FPS、レイテンシ、再オープン回数）

pub mod pipeline;
pub mod recovery;
pub mod stats;

pub use pipeline::Pipeline;
pub use recovery::{RecoveryState, RecoveryStrategy};
pub use stats::{StatKind, StatsCollector};
