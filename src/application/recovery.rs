//! キャプチャ再接続ロジック
//!
//! 連続タイムアウトとデバイス喪失からの再オープンを指数バックオフで
//! 制御する。再試行回数が上限を超えたら致命的エラーとして上位に伝える。

use crate::domain::CaptureConfig;
use std::time::Duration;

/// 再接続戦略
#[derive(Debug, Clone)]
pub struct RecoveryStrategy {
    /// 連続タイムアウト閾値（この回数に達したら再オープン）
    pub consecutive_timeout_threshold: u32,
    /// 初期バックオフ時間
    pub initial_backoff: Duration,
    /// 最大バックオフ時間
    pub max_backoff: Duration,
    /// 連続再オープン試行の上限（超えたら致命的エラー）
    pub max_reopen_attempts: u32,
}

impl RecoveryStrategy {
    /// キャプチャ設定から戦略を構築
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            consecutive_timeout_threshold: config.max_consecutive_timeouts,
            initial_backoff: config.reopen_initial_delay(),
            max_backoff: config.reopen_max_delay(),
            max_reopen_attempts: config.max_reopen_attempts,
        }
    }
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

/// 再接続状態管理
#[derive(Debug)]
pub struct RecoveryState {
    strategy: RecoveryStrategy,
    consecutive_timeouts: u32,
    current_backoff: Duration,
    /// 成功を挟まない連続再オープン試行回数
    consecutive_reopen_attempts: u32,
    total_reopens: u64,
}

impl RecoveryState {
    /// 新しいRecoveryStateを作成
    pub fn new(strategy: RecoveryStrategy) -> Self {
        Self {
            current_backoff: strategy.initial_backoff,
            strategy,
            consecutive_timeouts: 0,
            consecutive_reopen_attempts: 0,
            total_reopens: 0,
        }
    }

    /// タイムアウトを記録
    ///
    /// # Returns
    /// 再オープンが必要な場合は true
    pub fn record_timeout(&mut self) -> bool {
        self.consecutive_timeouts += 1;

        if self.consecutive_timeouts >= self.strategy.consecutive_timeout_threshold {
            self.consecutive_timeouts = 0;
            true
        } else {
            false
        }
    }

    /// 成功を記録（カウンターとバックオフをリセット）
    pub fn record_success(&mut self) {
        self.consecutive_timeouts = 0;
        self.consecutive_reopen_attempts = 0;
        self.current_backoff = self.strategy.initial_backoff;
    }

    /// 再オープン試行を記録
    ///
    /// 指数バックオフ: 次回の待機時間を2倍にする（上限あり）
    pub fn record_reopen_attempt(&mut self) {
        self.total_reopens += 1;
        self.consecutive_reopen_attempts += 1;
        self.current_backoff = (self.current_backoff * 2).min(self.strategy.max_backoff);
    }

    /// 連続再オープン試行が上限を超えたか判定
    pub fn attempts_exhausted(&self) -> bool {
        self.consecutive_reopen_attempts >= self.strategy.max_reopen_attempts
    }

    /// 現在のバックオフ時間を取得
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// 総再オープン回数を取得
    pub fn total_reopens(&self) -> u64 {
        self.total_reopens
    }

    /// 連続タイムアウト回数を取得
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }
}
