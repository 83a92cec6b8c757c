//! 統計情報管理
//!
//! FPS、各処理段階のレイテンシ、再オープン回数の統計を収集・出力する。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 統計情報の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// フレーム取得時間
    Capture,
    /// 色追跡時間
    ColorTrack,
    /// 動き検出時間
    MotionDetect,
    /// 1サイクル全体の時間
    Cycle,
}

/// パーセンタイル統計値
#[derive(Debug, Clone)]
pub struct PercentileStats {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub count: usize,
}

/// 統計情報コレクター
#[derive(Debug)]
pub struct StatsCollector {
    /// FPS計測用のフレームタイムスタンプ（最大1秒分保持）
    frame_times: VecDeque<Instant>,
    /// 各処理段階の所要時間（最大1000サンプル保持）
    durations: std::collections::HashMap<StatKind, VecDeque<Duration>>,
    /// 再オープン回数
    reopen_count: u64,
    /// 最後の統計出力時刻
    last_report: Instant,
    /// 統計出力間隔
    report_interval: Duration,
}

impl StatsCollector {
    /// FPS計算の時間範囲（1秒間のフレーム数を計測）
    const FPS_WINDOW_SECS: u64 = 1;

    /// 最大サンプル保持数（パーセンタイル計算用）
    const MAX_DURATION_SAMPLES: usize = 1000;

    /// 新しいStatsCollectorを作成
    ///
    /// # Arguments
    /// * `report_interval` - 統計出力間隔（例: 10秒）
    pub fn new(report_interval: Duration) -> Self {
        Self {
            frame_times: VecDeque::new(),
            durations: std::collections::HashMap::new(),
            reopen_count: 0,
            last_report: Instant::now(),
            report_interval,
        }
    }

    /// フレーム受信を記録（FPS計測用）
    pub fn record_frame(&mut self) {
        let now = Instant::now();
        self.frame_times.push_back(now);

        // ウィンドウより古いタイムスタンプを削除
        let window = Duration::from_secs(Self::FPS_WINDOW_SECS);
        while let Some(&front) = self.frame_times.front() {
            if now.duration_since(front) > window {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// 処理時間を記録
    pub fn record_duration(&mut self, kind: StatKind, duration: Duration) {
        let queue = self.durations.entry(kind).or_default();
        queue.push_back(duration);

        if queue.len() > Self::MAX_DURATION_SAMPLES {
            queue.pop_front();
        }
    }

    /// 再オープンをカウント
    pub fn record_reopen(&mut self) {
        self.reopen_count += 1;
    }

    /// 現在のFPSを計算
    pub fn current_fps(&self) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }

        let count = self.frame_times.len() as f64;
        if let (Some(&first), Some(&last)) = (self.frame_times.front(), self.frame_times.back()) {
            let elapsed = last.duration_since(first).as_secs_f64();
            if elapsed > 0.0 {
                return count / elapsed;
            }
        }
        0.0
    }

    /// パーセンタイル統計を計算
    ///
    /// # Returns
    /// パーセンタイル統計値。データがない場合は None
    pub fn percentile_stats(&self, kind: StatKind) -> Option<PercentileStats> {
        let queue = self.durations.get(&kind)?;
        if queue.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = queue.iter().copied().collect();
        sorted.sort();

        let count = sorted.len();
        let p50 = sorted[count * 50 / 100];
        let p95 = sorted[count * 95 / 100];
        let p99 = sorted[count * 99 / 100];

        Some(PercentileStats {
            p50,
            p95,
            p99,
            count,
        })
    }

    /// 統計レポートを出力すべきか判定
    pub fn should_report(&self) -> bool {
        self.last_report.elapsed() >= self.report_interval
    }

    /// 統計レポートを出力してタイマーをリセット
    pub fn report_and_reset(&mut self) {
        use tracing::info;

        info!("=== Pipeline Statistics ===");
        info!("FPS: {:.1}", self.current_fps());

        for kind in [
            StatKind::Capture,
            StatKind::ColorTrack,
            StatKind::MotionDetect,
            StatKind::Cycle,
        ] {
            if let Some(stats) = self.percentile_stats(kind) {
                info!(
                    "{:?}: p50={:.2}ms, p95={:.2}ms, p99={:.2}ms (n={})",
                    kind,
                    stats.p50.as_secs_f64() * 1000.0,
                    stats.p95.as_secs_f64() * 1000.0,
                    stats.p99.as_secs_f64() * 1000.0,
                    stats.count
                );
            }
        }

        info!("Reopen count: {}", self.reopen_count);
        info!("===========================");

        self.last_report = Instant::now();
    }
}
