//! 動き検出
//!
//! 直前フレームとの差分で動き領域を検出する。ベースラインは常に
//! 「直前の1フレーム」であり、固定参照フレームではない（スライディング
//! ウィンドウ）。保持する状態は自身が所有するブラー済みグレー画像
//! 1枚のみで、グローバル状態は持たない。

use crate::domain::{Blob, BlobKind, Frame, MotionConfig};
use crate::infrastructure::imgproc;
use image::GrayImage;

/// フレーム差分による動き検出器
pub struct MotionDetector {
    config: MotionConfig,
    /// 直前フレームのブラー済みグレー画像（初回呼び出し前はNone）
    prev: Option<GrayImage>,
}

impl MotionDetector {
    /// 新しい動き検出器を作成
    pub fn new(config: MotionConfig) -> Self {
        Self { config, prev: None }
    }

    /// フレーム内の動き領域を検出
    ///
    /// 初回呼び出しはベースラインを確立するだけで空集合を返す
    /// （エラーではなく初期状態）。以降は直前フレームとの絶対差分を
    /// 二値化・膨張して連結領域を抽出する。
    ///
    /// 保持フレームは検出結果に関わらず毎回必ず現在フレームで置き換える。
    pub fn detect(&mut self, frame: &Frame) -> Vec<Blob> {
        let gray = imgproc::to_gray(frame);
        let blurred = imgproc::gaussian_blur(&gray, self.config.blur_sigma);

        let Some(prev) = self.prev.replace(blurred.clone()) else {
            // 初回: ベースラインのみ確立
            return Vec::new();
        };

        let diff = imgproc::abs_diff(&prev, &blurred);
        let mask = imgproc::threshold(&diff, self.config.diff_threshold);
        let mask = imgproc::dilate(
            &mask,
            self.config.kernel_radius,
            self.config.dilate_iterations,
        );

        imgproc::find_regions(&mask, self.config.min_area)
            .into_iter()
            .map(|region| Blob {
                kind: BlobKind::Motion,
                center_x: region.center_x,
                center_y: region.center_y,
                area: region.area,
            })
            .collect()
    }

    /// ベースラインを破棄（シーン切り替え時に呼ぶ）
    pub fn reset(&mut self) {
        self.prev = None;
    }
}
