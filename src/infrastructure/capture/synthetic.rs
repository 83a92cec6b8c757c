//! 合成フレーム生成バックエンド
//!
//! テストとカメラなし開発用のキャプチャ実装。
//! - スクリプトモード: 事前に積んだフレーム/タイムアウト/切断を順に再生
//!   （テストでタイムアウトや切断のシナリオを決定的に再現する）
//! - エンドレスモード: スクリプトが空のとき、色付きの矩形が移動する
//!   テストパターンを生成し続ける（実カメラなしで全パイプラインが動く）

use crate::domain::{BackendKind, CapturePort, DeviceInfo, Frame, VisionError, VisionResult};
use std::collections::VecDeque;
use std::time::Duration;

/// スクリプトに積める1イベント
pub enum SyntheticEvent {
    /// フレームを返す（BGRデータ）
    Frame(Vec<u8>),
    /// タイムアウト（Ok(None)）を返す
    Timeout,
    /// デバイス切断エラーを返す
    Lost(String),
}

/// 合成キャプチャアダプタ
pub struct SyntheticCaptureAdapter {
    width: u32,
    height: u32,
    script: VecDeque<SyntheticEvent>,
    /// スクリプトが尽きたらテストパターンを生成し続けるか
    endless: bool,
    tick: u64,
}

impl SyntheticCaptureAdapter {
    /// スクリプトモードで作成（スクリプトが尽きたらタイムアウトを返す）
    pub fn scripted(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            script: VecDeque::new(),
            endless: false,
            tick: 0,
        }
    }

    /// エンドレスのテストパターン生成モードで作成
    pub fn endless(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            script: VecDeque::new(),
            endless: true,
            tick: 0,
        }
    }

    pub fn push_frame(&mut self, data: Vec<u8>) -> &mut Self {
        self.script.push_back(SyntheticEvent::Frame(data));
        self
    }

    pub fn push_timeout(&mut self) -> &mut Self {
        self.script.push_back(SyntheticEvent::Timeout);
        self
    }

    pub fn push_lost(&mut self, message: &str) -> &mut Self {
        self.script
            .push_back(SyntheticEvent::Lost(message.to_string()));
        self
    }

    /// テストパターン: 暗い背景の上を青い矩形が水平に往復する
    fn generate_pattern(&self, tick: u64) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut data = vec![32u8; w * h * 3];

        let side = (self.width / 6).max(8) as usize;
        let span = w.saturating_sub(side).max(1);
        let phase = (tick as usize * 4) % (span * 2);
        let x0 = if phase < span { phase } else { 2 * span - phase };
        let y0 = (h - side.min(h)) / 2;

        for y in y0..(y0 + side).min(h) {
            for x in x0..(x0 + side).min(w) {
                let i = (y * w + x) * 3;
                // 青（BGR = 255, 0, 0）
                data[i] = 255;
                data[i + 1] = 0;
                data[i + 2] = 0;
            }
        }
        data
    }
}

impl CapturePort for SyntheticCaptureAdapter {
    fn next_frame(&mut self, _timeout: Duration) -> VisionResult<Option<Frame>> {
        if let Some(event) = self.script.pop_front() {
            return match event {
                SyntheticEvent::Frame(data) => {
                    Ok(Some(Frame::new(data, self.width, self.height)))
                }
                SyntheticEvent::Timeout => Ok(None),
                SyntheticEvent::Lost(message) => Err(VisionError::CaptureLost(message)),
            };
        }

        if self.endless {
            let data = self.generate_pattern(self.tick);
            self.tick += 1;
            Ok(Some(Frame::new(data, self.width, self.height)))
        } else {
            // スクリプト消化済み: タイムアウト扱い
            Ok(None)
        }
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            width: self.width,
            height: self.height,
            frame_rate: 30,
            name: "Synthetic pattern generator".to_string(),
        }
    }
}
