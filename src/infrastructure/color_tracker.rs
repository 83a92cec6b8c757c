//! 色追跡
//!
//! 1フレームをHSV空間でセグメンテーションし、設定された色バンドごとに
//! 連結領域（Blob）を検出する。内部状態を持たない純粋な計算であり、
//! 同一入力に対して常に同一の結果を返す。

use crate::domain::{BandConfig, Blob, BlobKind, ColorBand, ColorConfig, Frame, Roi};
use crate::infrastructure::imgproc;

/// 色追跡器
///
/// バンドテーブルとモルフォロジーパラメータは起動時に固定され、
/// 実行中に変更されない。
pub struct ColorTracker {
    config: ColorConfig,
}

impl ColorTracker {
    /// 新しい色追跡器を作成
    ///
    /// configは事前に `AppConfig::validate()` を通過していること。
    pub fn new(config: ColorConfig) -> Self {
        Self { config }
    }

    /// フレーム内の全バンドのBlobを検出
    ///
    /// バンドテーブル順・スキャンライン順の決定的な並びで返す。
    /// 1バンドにつき複数のBlobがあり得る（消費側が使う個数を選ぶ）。
    /// どのバンドも検出されなければ空集合（エラーではない）。
    pub fn track(&self, frame: &Frame) -> Vec<Blob> {
        let mut blobs = Vec::new();
        for band in &self.config.bands {
            self.track_band(frame, band, &mut blobs);
        }
        blobs
    }

    fn track_band(&self, frame: &Frame, band: &BandConfig, out: &mut Vec<Blob>) {
        let ranges = band.hsv_ranges();
        let mask = imgproc::band_mask(frame, &ranges);

        // opening（erode→dilate）でスペックルノイズを除去し、
        // 追加のdilateで分断された領域を再結合する
        let mask = imgproc::erode(&mask, self.config.kernel_radius, self.config.erode_iterations);
        let mask = imgproc::dilate(
            &mask,
            self.config.kernel_radius,
            self.config.dilate_iterations,
        );

        for region in imgproc::find_regions(&mask, band.min_area) {
            out.push(Blob {
                kind: BlobKind::Color(band.band),
                center_x: region.center_x,
                center_y: region.center_y,
                area: region.area,
            });
        }
    }

    /// ROI内で指定バンドの色が占めるピクセル比率を計算
    ///
    /// 色合わせ系の消費者向け。モルフォロジーは適用しない生の比率。
    ///
    /// # Returns
    /// 0.0〜1.0。ROIがフレーム外、またはバンド未設定なら0.0
    pub fn coverage_ratio(&self, frame: &Frame, roi: &Roi, band: ColorBand) -> f32 {
        let Some(config) = self.config.bands.iter().find(|b| b.band == band) else {
            return 0.0;
        };
        let Some(roi) = roi.clamp_to(frame.width, frame.height) else {
            return 0.0;
        };

        let ranges = config.hsv_ranges();
        let mut hits: u32 = 0;
        for y in roi.y..roi.y + roi.height {
            for x in roi.x..roi.x + roi.width {
                let (b, g, r) = frame.bgr_at(x, y);
                let (h, s, v) = imgproc::bgr_to_hsv(b, g, r);
                if ranges.iter().any(|range| range.contains(h, s, v)) {
                    hits += 1;
                }
            }
        }

        hits as f32 / roi.area() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ColorConfig;

    /// 黒背景のフレームに1つのBGR矩形を描く
    fn frame_with_rect(
        width: u32,
        height: u32,
        rect: (u32, u32, u32, u32),
        bgr: (u8, u8, u8),
    ) -> Frame {
        let mut data = vec![0u8; (width * height * 3) as usize];
        let (rx, ry, rw, rh) = rect;
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                let i = ((y * width + x) * 3) as usize;
                data[i] = bgr.0;
                data[i + 1] = bgr.1;
                data[i + 2] = bgr.2;
            }
        }
        Frame::new(data, width, height)
    }

    /// 各バンドの代表的なBGR値
    fn representative_bgr(band: ColorBand) -> (u8, u8, u8) {
        match band {
            ColorBand::Red => (0, 0, 255),      // H=0
            ColorBand::Blue => (255, 0, 0),     // H=120
            ColorBand::Green => (0, 255, 0),    // H=60
            ColorBand::Yellow => (0, 255, 255), // H=30
            ColorBand::Orange => (0, 165, 255), // H=19
            ColorBand::Purple => (255, 0, 255), // H=150
        }
    }

    #[test]
    fn test_each_band_detected_exactly_once() {
        let tracker = ColorTracker::new(ColorConfig::default());

        for band in ColorBand::ALL {
            // 32x32矩形（モルフォロジー後も十分な面積）を中央に配置
            let frame = frame_with_rect(96, 96, (32, 32, 32, 32), representative_bgr(band));
            let blobs = tracker.track(&frame);

            let matching: Vec<_> = blobs
                .iter()
                .filter(|b| b.kind == BlobKind::Color(band))
                .collect();
            assert_eq!(matching.len(), 1, "band {} should yield one blob", band.as_str());

            // 幾何中心 (47.5, 47.5) に一致（モルフォロジーは対称なので重心不変）
            let blob = matching[0];
            assert!((blob.center_x - 47.5).abs() < 1.0, "band {}", band.as_str());
            assert!((blob.center_y - 47.5).abs() < 1.0, "band {}", band.as_str());

            // 他のバンドには何も出ない
            let others = blobs
                .iter()
                .filter(|b| b.kind != BlobKind::Color(band))
                .count();
            assert_eq!(others, 0, "band {} leaked into others", band.as_str());
        }
    }

    #[test]
    fn test_blob_centroid_inside_frame() {
        let tracker = ColorTracker::new(ColorConfig::default());
        // フレーム縁に接する矩形
        let frame = frame_with_rect(96, 96, (0, 0, 40, 40), representative_bgr(ColorBand::Blue));
        for blob in tracker.track(&frame) {
            assert!(blob.center_x >= 0.0 && blob.center_x < 96.0);
            assert!(blob.center_y >= 0.0 && blob.center_y < 96.0);
        }
    }

    #[test]
    fn test_small_region_discarded() {
        let tracker = ColorTracker::new(ColorConfig::default());
        // 10x10=100px はモルフォロジー後もmin_area(800)未満
        let frame = frame_with_rect(96, 96, (40, 40, 10, 10), representative_bgr(ColorBand::Green));
        assert!(tracker.track(&frame).is_empty());
    }

    #[test]
    fn test_min_area_boundary_without_morphology() {
        // モルフォロジーを無効化してしきい値ちょうどの境界を確認
        let mut config = ColorConfig::default();
        config.kernel_radius = 0;
        let frame = frame_with_rect(64, 64, (10, 10, 10, 10), representative_bgr(ColorBand::Blue));

        for (min_area, expected) in [(99, 1), (100, 1), (101, 0)] {
            let mut c = config.clone();
            for band in &mut c.bands {
                band.min_area = min_area;
            }
            let tracker = ColorTracker::new(c);
            let count = tracker
                .track(&frame)
                .iter()
                .filter(|b| b.kind == BlobKind::Color(ColorBand::Blue))
                .count();
            assert_eq!(count, expected, "min_area={}", min_area);
        }
    }

    #[test]
    fn test_multiple_blobs_per_band() {
        let tracker = ColorTracker::new(ColorConfig::default());
        let mut frame = frame_with_rect(128, 96, (8, 30, 32, 32), representative_bgr(ColorBand::Red));
        // 2つ目の赤い矩形（十分離す）
        let second = frame_with_rect(128, 96, (80, 30, 32, 32), representative_bgr(ColorBand::Red));
        for (a, b) in frame.data.iter_mut().zip(second.data.iter()) {
            *a |= *b;
        }

        let blobs = tracker.track(&frame);
        assert_eq!(blobs.iter().filter(|b| b.kind == BlobKind::Color(ColorBand::Red)).count(), 2);
    }

    #[test]
    fn test_empty_frame_yields_empty_set() {
        let tracker = ColorTracker::new(ColorConfig::default());
        let frame = Frame::new(vec![0u8; 64 * 64 * 3], 64, 64);
        assert!(tracker.track(&frame).is_empty());
    }

    #[test]
    fn test_track_is_idempotent() {
        let tracker = ColorTracker::new(ColorConfig::default());
        let frame = frame_with_rect(96, 96, (20, 20, 32, 32), representative_bgr(ColorBand::Yellow));

        let first = tracker.track(&frame);
        let second = tracker.track(&frame);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_coverage_ratio() {
        let tracker = ColorTracker::new(ColorConfig::default());
        // 左半分が青
        let frame = frame_with_rect(64, 64, (0, 0, 32, 64), representative_bgr(ColorBand::Blue));

        let full = Roi::new(0, 0, 64, 64);
        let ratio = tracker.coverage_ratio(&frame, &full, ColorBand::Blue);
        assert!((ratio - 0.5).abs() < 1e-3);

        let left = Roi::new(0, 0, 32, 64);
        assert!((tracker.coverage_ratio(&frame, &left, ColorBand::Blue) - 1.0).abs() < 1e-3);

        // 別バンドの比率は0
        assert_eq!(tracker.coverage_ratio(&frame, &full, ColorBand::Green), 0.0);
    }

    #[test]
    fn test_coverage_ratio_out_of_bounds_roi() {
        let tracker = ColorTracker::new(ColorConfig::default());
        let frame = Frame::new(vec![0u8; 64 * 64 * 3], 64, 64);
        let roi = Roi::new(100, 100, 10, 10);
        assert_eq!(tracker.coverage_ratio(&frame, &roi, ColorBand::Red), 0.0);
    }
}
