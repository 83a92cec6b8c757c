//! キャプチャ実装の共通ユーティリティ
//!
//! 各バックエンドがネイティブフォーマットから統一表現（BGR・3ch）へ
//! 変換するための処理と、鏡面効果用の水平ミラーリングを提供する。
//! どのバックエンドで取得しても下流には同一の色表現・座標系で渡ること。

use crate::domain::FRAME_CHANNELS;

/// BGRバッファを水平方向に反転（in-place）
///
/// 鏡面効果のため、表示と追跡座標系を一致させる。
/// キャプチャ層の責務であり、レンダラでは反転しない。
pub fn mirror_horizontal(data: &mut [u8], width: u32, height: u32) {
    debug_assert_eq!(
        data.len(),
        (width as usize) * (height as usize) * FRAME_CHANNELS
    );

    let w = width as usize;
    let row_bytes = w * FRAME_CHANNELS;
    for y in 0..height as usize {
        let row = &mut data[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..w / 2 {
            let left = x * FRAME_CHANNELS;
            let right = (w - 1 - x) * FRAME_CHANNELS;
            for c in 0..FRAME_CHANNELS {
                row.swap(left + c, right + c);
            }
        }
    }
}

/// RGBバッファをBGRに変換（in-place）
///
/// nokhwaのデコード出力（RGB）用。
pub fn rgb_to_bgr_in_place(data: &mut [u8]) {
    for px in data.chunks_exact_mut(FRAME_CHANNELS) {
        px.swap(0, 2);
    }
}

/// YUYV（YUV 4:2:2 packed）バッファをBGRに変換
///
/// V4L2デバイスの標準的な出力フォーマット用。BT.601の整数近似。
pub fn yuyv_to_bgr(src: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = (width as usize) * (height as usize);
    debug_assert_eq!(src.len(), pixels * 2);

    let mut out = Vec::with_capacity(pixels * FRAME_CHANNELS);
    for chunk in src.chunks_exact(4) {
        let y0 = chunk[0] as i32;
        let u = chunk[1] as i32;
        let y1 = chunk[2] as i32;
        let v = chunk[3] as i32;

        push_bgr(&mut out, y0, u, v);
        push_bgr(&mut out, y1, u, v);
    }
    out
}

#[inline]
fn push_bgr(out: &mut Vec<u8>, y: i32, u: i32, v: i32) {
    let c = 298 * (y - 16);
    let d = u - 128;
    let e = v - 128;

    let b = (c + 516 * d + 128) >> 8;
    let g = (c - 100 * d - 208 * e + 128) >> 8;
    let r = (c + 409 * e + 128) >> 8;

    out.push(b.clamp(0, 255) as u8);
    out.push(g.clamp(0, 255) as u8);
    out.push(r.clamp(0, 255) as u8);
}
