//! パイプライン制御
//!
//! 1サイクル = フレーム取得 → 色追跡 → 動き検出 → 結果発行。
//! 両検出器には必ず同一フレームを渡し、時間的に一貫した結果を作る。
//! タイムアウトとデバイス喪失は再接続ロジック（指数バックオフ）で
//! 吸収し、再試行上限を超えた場合のみ致命的エラーとして戻る。

use crate::application::recovery::RecoveryState;
use crate::application::stats::{StatKind, StatsCollector};
use crate::domain::{DetectionResult, VisionError, VisionResult};
use crate::infrastructure::capture::FrameSource;
use crate::infrastructure::{ColorTracker, MotionDetector};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 検出パイプライン
///
/// 単一スレッドで順次実行する。検出レートがキャプチャレートを
/// 下回る場合はフレームが自然に間引かれる（キューイングしない）。
pub struct Pipeline {
    source: FrameSource,
    color: ColorTracker,
    motion: MotionDetector,
    recovery: RecoveryState,
    stats: StatsCollector,
    /// 次に発行するサイクル番号（発行成功時のみ進む）
    cycle: u64,
}

impl Pipeline {
    /// 新しいパイプラインを作成
    pub fn new(
        source: FrameSource,
        color: ColorTracker,
        motion: MotionDetector,
        recovery: RecoveryState,
        stats: StatsCollector,
    ) -> Self {
        Self {
            source,
            color,
            motion,
            recovery,
            stats,
            cycle: 0,
        }
    }

    /// 1サイクルを実行
    ///
    /// # Returns
    /// - `Ok(Some(result))` - フレームを処理して結果を発行
    /// - `Ok(None)` - タイムアウト等でこのサイクルをスキップ
    ///   （サイクル番号は消費しない）
    /// - `Err(_)` - 回復不能なエラー（再接続上限超過など）
    pub fn run_cycle(&mut self) -> VisionResult<Option<DetectionResult>> {
        let cycle_start = Instant::now();

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => {
                self.recovery.record_success();
                frame
            }
            Ok(None) => {
                if self.recovery.record_timeout() {
                    warn!(
                        backend = self.source.active_backend().as_str(),
                        "Consecutive capture timeouts, reopening backend"
                    );
                    self.reopen()?;
                }
                return Ok(None);
            }
            Err(VisionError::CaptureLost(message)) => {
                warn!(error = %message, "Capture device lost, reopening backend");
                self.reopen()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.stats.record_frame();
        self.stats
            .record_duration(StatKind::Capture, cycle_start.elapsed());

        let color_start = Instant::now();
        let color_blobs = self.color.track(&frame);
        self.stats
            .record_duration(StatKind::ColorTrack, color_start.elapsed());

        let motion_start = Instant::now();
        let motion_blobs = self.motion.detect(&frame);
        self.stats
            .record_duration(StatKind::MotionDetect, motion_start.elapsed());

        let result = DetectionResult {
            timestamp: frame.timestamp,
            cycle: self.cycle,
            frame_width: frame.width,
            frame_height: frame.height,
            color_blobs,
            motion_blobs,
        };
        self.cycle += 1;

        self.stats
            .record_duration(StatKind::Cycle, cycle_start.elapsed());
        if self.stats.should_report() {
            self.stats.report_and_reset();
        }

        Ok(Some(result))
    }

    /// パイプラインを起動（ブロッキング）
    ///
    /// 結果は「最新のみ上書き」ポリシーで送信する。消費側が遅くても
    /// パイプラインは止まらず、古い結果が捨てられる。
    ///
    /// # Returns
    /// 停止フラグが立つか消費側が切断されたら Ok、
    /// 回復不能なエラーが発生したら Err
    pub fn run(
        &mut self,
        tx: Sender<DetectionResult>,
        running: Arc<AtomicBool>,
    ) -> VisionResult<()> {
        info!(
            backend = self.source.active_backend().as_str(),
            "Pipeline started"
        );

        while running.load(Ordering::Relaxed) {
            if let Some(result) = self.run_cycle()? {
                if !send_latest_only(&tx, result) {
                    info!("Result consumer disconnected, stopping pipeline");
                    break;
                }
            }
        }

        info!(cycles = self.cycle, "Pipeline stopped");
        Ok(())
    }

    /// 現在のサイクル番号（次に発行する番号）
    pub fn current_cycle(&self) -> u64 {
        self.cycle
    }

    /// バックオフ付きでバックエンドを再オープン
    ///
    /// 成功するか試行上限に達するまでブロックする。
    /// 再オープン後は動き検出のベースラインが無効になるため破棄する。
    fn reopen(&mut self) -> VisionResult<()> {
        loop {
            self.recovery.record_reopen_attempt();
            self.stats.record_reopen();

            // 予算は「成功フレームを挟まない連続再オープン回数」で判定する。
            // 開くことはできるが読むと必ず切断されるデバイス
            // （列挙はされるがストリームできない等）も上限で致命化する
            if self.recovery.attempts_exhausted() {
                return Err(VisionError::CaptureUnavailable(format!(
                    "reopen budget exhausted after {} attempts without a frame",
                    self.recovery.total_reopens()
                )));
            }

            match self.source.reopen() {
                Ok(()) => {
                    info!(
                        backend = self.source.active_backend().as_str(),
                        total_reopens = self.recovery.total_reopens(),
                        "Capture backend reopened"
                    );
                    self.motion.reset();
                    return Ok(());
                }
                Err(e) => {
                    let backoff = self.recovery.current_backoff();
                    warn!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Reopen failed, backing off"
                    );
                    std::thread::sleep(backoff);
                }
            }
        }
    }
}

/// 最新のみ上書きポリシーで送信
///
/// # Returns
/// チャンネルが切断されていたら false
fn send_latest_only(tx: &Sender<DetectionResult>, result: DetectionResult) -> bool {
    match tx.try_send(result) {
        Ok(()) => true,
        // キューが満杯: 消費側が遅い。この結果は捨てる
        Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Disconnected(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::recovery::RecoveryStrategy;
    use crate::domain::{BackendKind, CaptureConfig, CapturePort, ColorConfig, MotionConfig};
    use crate::infrastructure::capture::{BackendAttempt, SyntheticCaptureAdapter};
    use crossbeam_channel::bounded;
    use std::time::Duration;

    fn test_capture_config() -> CaptureConfig {
        CaptureConfig {
            mirror: false,
            width: 96,
            height: 96,
            max_consecutive_timeouts: 2,
            max_reopen_attempts: 2,
            reopen_initial_delay_ms: 1,
            reopen_max_delay_ms: 2,
            ..CaptureConfig::default()
        }
    }

    fn build_pipeline(source: FrameSource, config: &CaptureConfig) -> Pipeline {
        Pipeline::new(
            source,
            ColorTracker::new(ColorConfig::default()),
            MotionDetector::new(MotionConfig::default()),
            RecoveryState::new(RecoveryStrategy::from_config(config)),
            StatsCollector::new(Duration::from_secs(3600)),
        )
    }

    /// 中央に青い矩形を描いた96x96フレーム
    fn blue_square_frame() -> Vec<u8> {
        let mut data = vec![0u8; 96 * 96 * 3];
        for y in 32..64 {
            for x in 32..64 {
                let i = (y * 96 + x) * 3;
                data[i] = 255;
            }
        }
        data
    }

    fn scripted_source(
        config: &CaptureConfig,
        build: impl Fn() -> SyntheticCaptureAdapter + Send + 'static,
    ) -> FrameSource {
        let attempt = BackendAttempt::new(BackendKind::Synthetic, move |_| {
            Ok(Box::new(build()) as Box<dyn CapturePort>)
        });
        FrameSource::open_with(vec![attempt], config.clone()).unwrap()
    }

    #[test]
    fn test_cycle_detects_color() {
        let config = test_capture_config();
        let source = scripted_source(&config, || {
            let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
            adapter.push_frame(blue_square_frame());
            adapter
        });
        let mut pipeline = build_pipeline(source, &config);

        let result = pipeline.run_cycle().unwrap().unwrap();
        assert_eq!(result.cycle, 0);
        assert_eq!(result.frame_width, 96);
        assert_eq!(
            result
                .blobs_for_band(crate::domain::ColorBand::Blue)
                .count(),
            1
        );
        // 初回サイクルは動きのベースライン確立のみ
        assert!(result.motion_blobs.is_empty());
    }

    #[test]
    fn test_timeout_skips_cycle_without_consuming_number() {
        let config = test_capture_config();
        let source = scripted_source(&config, || {
            let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
            adapter
                .push_frame(blue_square_frame())
                .push_timeout()
                .push_frame(blue_square_frame());
            adapter
        });
        let mut pipeline = build_pipeline(source, &config);

        let first = pipeline.run_cycle().unwrap().unwrap();
        assert_eq!(first.cycle, 0);

        // タイムアウト: スキップされ番号は進まない
        assert!(pipeline.run_cycle().unwrap().is_none());

        let second = pipeline.run_cycle().unwrap().unwrap();
        assert_eq!(second.cycle, 1);
    }

    #[test]
    fn test_capture_lost_triggers_reopen() {
        let mut config = test_capture_config();
        config.max_reopen_attempts = 5;
        let source = scripted_source(&config, || {
            // 再オープンごとに新しいアダプタが作られる
            let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
            adapter.push_lost("device unplugged");
            adapter.push_frame(blue_square_frame());
            adapter
        });
        let mut pipeline = build_pipeline(source, &config);

        // 切断 → 再オープン成功、サイクルはスキップ
        assert!(pipeline.run_cycle().unwrap().is_none());
        // 新しいアダプタも最初に切断を返すが、予算内なら再オープンが続く
        assert!(pipeline.run_cycle().unwrap().is_none());
    }

    #[test]
    fn test_persistent_capture_loss_escalates() {
        // 開くことはできるが、読むと必ず切断されるデバイス
        let config = test_capture_config();
        let source = scripted_source(&config, || {
            let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
            adapter.push_lost("flaky driver");
            adapter
        });
        let mut pipeline = build_pipeline(source, &config);

        // 最初の切断は再オープンで吸収される
        assert!(pipeline.run_cycle().unwrap().is_none());
        // 成功フレームを挟まずに予算（max_reopen_attempts = 2）が尽きると致命化
        let result = pipeline.run_cycle();
        assert!(matches!(result, Err(VisionError::CaptureUnavailable(_))));
    }

    #[test]
    fn test_reopen_budget_resets_after_successful_frame() {
        // 断続的な切断: 各オープン後に1フレーム読めてから切断される。
        // 成功フレームが挟まるため予算は毎回リセットされ、致命化しない
        let config = test_capture_config();
        let source = scripted_source(&config, || {
            let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
            adapter
                .push_frame(blue_square_frame())
                .push_lost("intermittent");
            adapter
        });
        let mut pipeline = build_pipeline(source, &config);

        for _ in 0..4 {
            assert!(pipeline.run_cycle().unwrap().is_some());
            assert!(pipeline.run_cycle().unwrap().is_none());
        }
    }

    #[test]
    fn test_consecutive_timeouts_trigger_reopen() {
        let config = test_capture_config();
        let source = scripted_source(&config, || SyntheticCaptureAdapter::scripted(96, 96));
        let mut pipeline = build_pipeline(source, &config);

        // max_consecutive_timeouts = 2: 2回目で再オープンが走る
        assert!(pipeline.run_cycle().unwrap().is_none());
        assert!(pipeline.run_cycle().unwrap().is_none());
        assert_eq!(pipeline.recovery.total_reopens(), 1);
    }

    #[test]
    fn test_reopen_exhaustion_is_fatal() {
        let config = test_capture_config();
        // 初回は開けるが、以降の再オープンはすべて失敗する
        let opened = std::sync::atomic::AtomicBool::new(false);
        let attempt = BackendAttempt::new(BackendKind::Synthetic, move |_| {
            if opened.swap(true, Ordering::SeqCst) {
                Err(VisionError::Initialization("gone".to_string()))
            } else {
                let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
                adapter.push_lost("device unplugged");
                Ok(Box::new(adapter) as Box<dyn CapturePort>)
            }
        });
        let source = FrameSource::open_with(vec![attempt], test_capture_config()).unwrap();
        let mut pipeline = build_pipeline(source, &config);

        let result = pipeline.run_cycle();
        assert!(matches!(result, Err(VisionError::CaptureUnavailable(_))));
    }

    #[test]
    fn test_motion_baseline_reset_after_reopen() {
        let config = test_capture_config();
        // 初回オープンは暗いフレーム+切断、再オープン後は白いフレーム。
        // ベースラインが破棄されなければ白フレームで大きな動きが出る
        let opens = std::sync::atomic::AtomicUsize::new(0);
        let attempt = BackendAttempt::new(BackendKind::Synthetic, move |_| {
            let mut adapter = SyntheticCaptureAdapter::scripted(96, 96);
            if opens.fetch_add(1, Ordering::SeqCst) == 0 {
                adapter.push_frame(vec![0u8; 96 * 96 * 3]);
                adapter.push_lost("device unplugged");
            } else {
                adapter.push_frame(vec![255u8; 96 * 96 * 3]);
            }
            Ok(Box::new(adapter) as Box<dyn CapturePort>)
        });
        let source = FrameSource::open_with(vec![attempt], config.clone()).unwrap();
        let mut pipeline = build_pipeline(source, &config);

        assert!(pipeline.run_cycle().unwrap().is_some());
        assert!(pipeline.run_cycle().unwrap().is_none());

        // 再オープン直後はベースライン再確立のため動きは報告されない
        let result = pipeline.run_cycle().unwrap().unwrap();
        assert!(result.motion_blobs.is_empty());
    }

    #[test]
    fn test_run_stops_on_flag() {
        let config = test_capture_config();
        let source = scripted_source(&config, || SyntheticCaptureAdapter::endless(96, 96));
        let mut pipeline = build_pipeline(source, &config);

        let (tx, rx) = bounded(1);
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(false, Ordering::Relaxed);
        });

        pipeline.run(tx, running).unwrap();
        handle.join().unwrap();

        // 少なくとも1件は発行されている
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_run_stops_when_consumer_drops() {
        let config = test_capture_config();
        let source = scripted_source(&config, || SyntheticCaptureAdapter::endless(96, 96));
        let mut pipeline = build_pipeline(source, &config);

        let (tx, rx) = bounded(1);
        drop(rx);

        let running = Arc::new(AtomicBool::new(true));
        pipeline.run(tx, running).unwrap();
    }

    #[test]
    fn test_send_latest_only_drops_when_full() {
        let (tx, rx) = bounded::<DetectionResult>(1);

        let result = DetectionResult {
            timestamp: Instant::now(),
            cycle: 0,
            frame_width: 10,
            frame_height: 10,
            color_blobs: vec![],
            motion_blobs: vec![],
        };

        assert!(send_latest_only(&tx, result.clone()));
        // 満杯でも true（結果は捨てられる）
        let mut second = result.clone();
        second.cycle = 1;
        assert!(send_latest_only(&tx, second));

        // キューには古い値が残っている
        assert_eq!(rx.try_recv().unwrap().cycle, 0);

        drop(rx);
        assert!(!send_latest_only(&tx, result));
    }
}
