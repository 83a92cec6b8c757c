//! 画像処理プリミティブ
//!
//! 色追跡・動き検出が共有するラスタ演算。GPUなしの組込みボードで
//! 1フレーム予算内に収まるよう、すべて単純な1パス実装にしている。
//!
//! - BGR→HSV変換はOpenCV 8bit準拠（H [0-180]、S/V [0-255]）
//! - マスクは`GrayImage`（0 / 255の二値）
//! - モルフォロジーは円盤カーネル（半径指定）
//! - 連結領域抽出は8近傍のBFS

use crate::domain::{Frame, HsvRange};
use image::{imageops, GrayImage, Luma};

/// マスクの前景値
pub const MASK_ON: u8 = 255;

/// BGR値をHSVに変換（OpenCV 8bit準拠）
///
/// H: [0-180]（度数の1/2）、S: [0-255]、V: [0-255]
#[inline]
pub fn bgr_to_hsv(b: u8, g: u8, r: u8) -> (u8, u8, u8) {
    let bf = b as f32;
    let gf = g as f32;
    let rf = r as f32;

    let max = bf.max(gf).max(rf);
    let min = bf.min(gf).min(rf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let h_deg = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    let h_deg = if h_deg < 0.0 { h_deg + 360.0 } else { h_deg };

    (
        (h_deg / 2.0).round() as u8,
        s.round() as u8,
        v.round() as u8,
    )
}

/// フレームをグレースケールに変換（BT.601係数、OpenCVと同じ）
pub fn to_gray(frame: &Frame) -> GrayImage {
    let mut gray = GrayImage::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (b, g, r) = frame.bgr_at(x, y);
            let luma =
                (0.114 * b as f32 + 0.587 * g as f32 + 0.299 * r as f32).round() as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// 指定レンジ群（union）に入るピクセルを選択する二値マスクを生成
///
/// 複数レンジは論理和で結合する（色相wraparound用）。
pub fn band_mask(frame: &Frame, ranges: &[HsvRange]) -> GrayImage {
    let mut mask = GrayImage::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (b, g, r) = frame.bgr_at(x, y);
            let (h, s, v) = bgr_to_hsv(b, g, r);
            if ranges.iter().any(|range| range.contains(h, s, v)) {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }
    mask
}

/// 円盤カーネルのオフセットを列挙
fn disc_offsets(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    let r2 = r * r;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r2 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// 二値マスクの収縮（erode）
///
/// カーネル内に1つでも背景があれば背景にする。画像外は背景扱い。
/// radius == 0 または iterations == 0 なら入力をそのまま返す。
pub fn erode(mask: &GrayImage, radius: u32, iterations: u32) -> GrayImage {
    morphology(mask, radius, iterations, false)
}

/// 二値マスクの膨張（dilate）
///
/// カーネル内に1つでも前景があれば前景にする。
pub fn dilate(mask: &GrayImage, radius: u32, iterations: u32) -> GrayImage {
    morphology(mask, radius, iterations, true)
}

fn morphology(mask: &GrayImage, radius: u32, iterations: u32, grow: bool) -> GrayImage {
    if radius == 0 || iterations == 0 {
        return mask.clone();
    }

    let offsets = disc_offsets(radius);
    let (width, height) = mask.dimensions();
    let mut current = mask.clone();

    for _ in 0..iterations {
        let mut next = GrayImage::new(width, height);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                // 画像外は背景扱い
                let neighbor_on = |&(dx, dy): &(i32, i32)| {
                    let nx = x + dx;
                    let ny = y + dy;
                    nx >= 0
                        && ny >= 0
                        && nx < width as i32
                        && ny < height as i32
                        && current.get_pixel(nx as u32, ny as u32)[0] == MASK_ON
                };

                let on = if grow {
                    // dilate: カーネル内に前景が1つでもあれば前景
                    offsets.iter().any(neighbor_on)
                } else {
                    // erode: カーネル全体が前景のときのみ前景
                    offsets.iter().all(neighbor_on)
                };

                if on {
                    next.put_pixel(x as u32, y as u32, Luma([MASK_ON]));
                }
            }
        }
        current = next;
    }
    current
}

/// Gaussianブラー
pub fn gaussian_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    imageops::blur(img, sigma)
}

/// 2枚のグレー画像の絶対差分
///
/// # Panics
/// 寸法が一致しない場合（契約違反）。
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    assert_eq!(a.dimensions(), b.dimensions(), "frame dimensions changed");

    let (width, height) = a.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let pa = a.get_pixel(x, y)[0];
            let pb = b.get_pixel(x, y)[0];
            out.put_pixel(x, y, Luma([pa.abs_diff(pb)]));
        }
    }
    out
}

/// 固定しきい値で二値化（value > cutoff で前景）
pub fn threshold(img: &GrayImage, cutoff: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            if img.get_pixel(x, y)[0] > cutoff {
                out.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }
    out
}

/// 抽出された連結領域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// 領域面積（前景ピクセル数）
    pub area: u32,
    /// 重心X座標
    pub center_x: f32,
    /// 重心Y座標
    pub center_y: f32,
}

/// 二値マスクから連結領域を抽出
///
/// 8近傍のBFSで前景ピクセルをグルーピングし、面積が min_area 以上の
/// 領域のみ重心付きで返す。返り順はスキャンライン順（決定的）。
pub fn find_regions(mask: &GrayImage, min_area: u32) -> Vec<Region> {
    let (width, height) = mask.dimensions();
    let w = width as usize;
    let mut visited = vec![false; w * height as usize];
    let mut regions = Vec::new();
    let mut queue: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * w + x as usize;
            if visited[idx] || mask.get_pixel(x, y)[0] != MASK_ON {
                continue;
            }

            // 新しい領域の成長開始
            visited[idx] = true;
            queue.clear();
            queue.push((x, y));
            let mut area: u32 = 0;
            let mut sum_x: u64 = 0;
            let mut sum_y: u64 = 0;

            while let Some((cx, cy)) = queue.pop() {
                area += 1;
                sum_x += cx as u64;
                sum_y += cy as u64;

                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = cx as i32 + dx;
                        let ny = cy as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        let nidx = ny as usize * w + nx as usize;
                        if !visited[nidx] && mask.get_pixel(nx as u32, ny as u32)[0] == MASK_ON
                        {
                            visited[nidx] = true;
                            queue.push((nx as u32, ny as u32));
                        }
                    }
                }
            }

            if area >= min_area {
                regions.push(Region {
                    area,
                    center_x: sum_x as f32 / area as f32,
                    center_y: sum_y as f32 / area as f32,
                });
            }
        }
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_mask(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        let (rx, ry, rw, rh) = rect;
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
        mask
    }

    #[test]
    fn test_bgr_to_hsv_primaries() {
        // OpenCVのcvtColorと同じ値になること
        assert_eq!(bgr_to_hsv(0, 0, 255), (0, 255, 255)); // 赤
        assert_eq!(bgr_to_hsv(0, 255, 0), (60, 255, 255)); // 緑
        assert_eq!(bgr_to_hsv(255, 0, 0), (120, 255, 255)); // 青
        assert_eq!(bgr_to_hsv(0, 255, 255), (30, 255, 255)); // 黄
    }

    #[test]
    fn test_bgr_to_hsv_grays() {
        assert_eq!(bgr_to_hsv(0, 0, 0), (0, 0, 0));
        assert_eq!(bgr_to_hsv(255, 255, 255), (0, 0, 255));
        assert_eq!(bgr_to_hsv(128, 128, 128), (0, 0, 128));
    }

    #[test]
    fn test_band_mask_selects_range() {
        let mut data = vec![0u8; 4 * 1 * 3];
        // ピクセル1だけ青（H=120）
        data[3] = 255;
        let frame = Frame::new(data, 4, 1);
        let ranges = [HsvRange::new(100, 130, 120, 255, 70, 255)];

        let mask = band_mask(&frame, &ranges);
        assert_eq!(mask.get_pixel(1, 0)[0], MASK_ON);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_band_mask_union_wraparound() {
        let mut data = vec![0u8; 2 * 1 * 3];
        // 両ピクセルとも赤（H=0）。wraparound側レンジだけでは拾えない
        data[2] = 255;
        data[5] = 255;
        let frame = Frame::new(data, 2, 1);

        let low = HsvRange::new(0, 10, 120, 255, 70, 255);
        let high = HsvRange::new(170, 180, 120, 255, 70, 255);
        assert_eq!(band_mask(&frame, &[high]).get_pixel(0, 0)[0], 0);
        assert_eq!(band_mask(&frame, &[low, high]).get_pixel(0, 0)[0], MASK_ON);
    }

    #[test]
    fn test_erode_removes_speckle() {
        let mut mask = GrayImage::new(11, 11);
        mask.put_pixel(5, 5, Luma([MASK_ON]));
        let eroded = erode(&mask, 1, 1);
        assert_eq!(eroded.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn test_erode_keeps_solid_interior() {
        let mask = solid_mask(11, 11, (2, 2, 7, 7));
        let eroded = erode(&mask, 1, 1);
        assert_eq!(eroded.get_pixel(5, 5)[0], MASK_ON);
        // 縁は削られる
        assert_eq!(eroded.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn test_dilate_grows() {
        let mut mask = GrayImage::new(11, 11);
        mask.put_pixel(5, 5, Luma([MASK_ON]));
        let dilated = dilate(&mask, 2, 1);
        assert_eq!(dilated.get_pixel(5, 5)[0], MASK_ON);
        assert_eq!(dilated.get_pixel(7, 5)[0], MASK_ON);
        assert_eq!(dilated.get_pixel(8, 5)[0], 0);
    }

    #[test]
    fn test_dilate_bridges_gap() {
        let mut mask = GrayImage::new(12, 5);
        mask.put_pixel(2, 2, Luma([MASK_ON]));
        mask.put_pixel(6, 2, Luma([MASK_ON]));
        let dilated = dilate(&mask, 2, 1);
        // 半径2の膨張で間の1ピクセルが埋まり1領域になる
        assert_eq!(find_regions(&dilated, 1).len(), 1);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mask = solid_mask(8, 8, (2, 2, 3, 3));
        assert_eq!(erode(&mask, 0, 1), mask);
        assert_eq!(dilate(&mask, 2, 0), mask);
    }

    #[test]
    fn test_abs_diff_and_threshold() {
        let mut a = GrayImage::new(3, 1);
        let mut b = GrayImage::new(3, 1);
        a.put_pixel(0, 0, Luma([200]));
        b.put_pixel(0, 0, Luma([150])); // diff 50
        a.put_pixel(1, 0, Luma([100]));
        b.put_pixel(1, 0, Luma([110])); // diff 10

        let diff = abs_diff(&a, &b);
        assert_eq!(diff.get_pixel(0, 0)[0], 50);
        assert_eq!(diff.get_pixel(1, 0)[0], 10);
        assert_eq!(diff.get_pixel(2, 0)[0], 0);

        let mask = threshold(&diff, 30);
        assert_eq!(mask.get_pixel(0, 0)[0], MASK_ON);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
    }

    #[test]
    #[should_panic]
    fn test_abs_diff_dimension_mismatch_panics() {
        let a = GrayImage::new(3, 3);
        let b = GrayImage::new(4, 3);
        let _ = abs_diff(&a, &b);
    }

    #[test]
    fn test_find_regions_centroid() {
        // 10x10の矩形、左上(20, 30) → 重心は(24.5, 34.5)
        let mask = solid_mask(64, 64, (20, 30, 10, 10));
        let regions = find_regions(&mask, 1);

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 100);
        assert!((regions[0].center_x - 24.5).abs() < 1e-3);
        assert!((regions[0].center_y - 34.5).abs() < 1e-3);
    }

    #[test]
    fn test_find_regions_two_components() {
        let mut mask = solid_mask(32, 32, (2, 2, 5, 5));
        for y in 20..25 {
            for x in 20..25 {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
        let regions = find_regions(&mask, 1);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_find_regions_min_area_boundary() {
        // 面積100の領域: しきい値99/100/101での境界挙動
        let mask = solid_mask(32, 32, (4, 4, 10, 10));
        assert_eq!(find_regions(&mask, 99).len(), 1);
        assert_eq!(find_regions(&mask, 100).len(), 1);
        assert_eq!(find_regions(&mask, 101).len(), 0);
    }

    #[test]
    fn test_find_regions_diagonal_connectivity() {
        // 斜め接続は8近傍で1領域になる
        let mut mask = GrayImage::new(8, 8);
        mask.put_pixel(2, 2, Luma([MASK_ON]));
        mask.put_pixel(3, 3, Luma([MASK_ON]));
        assert_eq!(find_regions(&mask, 1).len(), 1);
    }

    #[test]
    fn test_empty_mask_yields_no_regions() {
        let mask = GrayImage::new(16, 16);
        assert!(find_regions(&mask, 1).is_empty());
    }
}
