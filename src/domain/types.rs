//! コア型定義
//!
//! Domain層の中心となるデータ構造。
//! フレーム・色域・検出結果など、すべての処理で共有される不変の型。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// フレームのチャンネル数（BGR固定）
pub const FRAME_CHANNELS: usize = 3;

/// キャプチャされた1フレーム
///
/// ピクセルはBGR形式・連続メモリ。キャプチャ層がミラーリングと
/// フォーマット統一を済ませた状態で下流に渡す。
/// 1サイクルの処理単位であり、サイクルをまたいで保持されない
/// （MotionDetectorが保持するのはブラー済みグレー画像のみ）。
#[derive(Debug, Clone)]
pub struct Frame {
    /// フレーム取得時刻
    pub timestamp: Instant,
    /// 画像データ（BGR、width * height * 3 バイト）
    pub data: Vec<u8>,
    /// 画像の幅
    pub width: u32,
    /// 画像の高さ
    pub height: u32,
}

impl Frame {
    /// 新しいフレームを作成
    ///
    /// # Panics
    /// データ長が width * height * 3 と一致しない場合。
    /// 不正な形状は契約違反（プログラミングエラー）として即座に落とす。
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * FRAME_CHANNELS,
            "frame data length does not match {}x{}x{}",
            width,
            height,
            FRAME_CHANNELS,
        );
        Self {
            timestamp: Instant::now(),
            data,
            width,
            height,
        }
    }

    /// 指定座標のBGR値を取得
    #[inline]
    pub fn bgr_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * FRAME_CHANNELS;
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }
}

/// ピクセル座標で指定される矩形領域（Region of Interest）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// 新しいROIを作成
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// ROIの中心座標を取得
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// ROIの面積を取得
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// 境界内に収まるようにクランプ
    ///
    /// 完全に境界外、またはサイズ0になる場合は None。
    pub fn clamp_to(&self, bounds_width: u32, bounds_height: u32) -> Option<Roi> {
        if bounds_width == 0 || bounds_height == 0 || self.width == 0 || self.height == 0 {
            return None;
        }
        if self.x >= bounds_width || self.y >= bounds_height {
            return None;
        }

        let max_w = bounds_width - self.x;
        let max_h = bounds_height - self.y;
        let width = self.width.min(max_w);
        let height = self.height.min(max_h);

        Some(Roi::new(self.x, self.y, width, height))
    }
}

/// HSV色空間のレンジ（OpenCV準拠: H[0-180], S[0-255], V[0-255]）
///
/// 色相の循環境界（赤の0/180またぎ）は、このレンジを2つ並べた
/// unionとしてバンド設定側で表現する。レンジ単体はwrapしない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
}

impl HsvRange {
    /// 新しいHSVレンジを作成
    pub fn new(h_min: u8, h_max: u8, s_min: u8, s_max: u8, v_min: u8, v_max: u8) -> Self {
        Self {
            h_min,
            h_max,
            s_min,
            s_max,
            v_min,
            v_max,
        }
    }

    /// 指定のHSV値がレンジ内か判定
    #[inline]
    pub fn contains(&self, h: u8, s: u8, v: u8) -> bool {
        self.h_min <= h
            && h <= self.h_max
            && self.s_min <= s
            && s <= self.s_max
            && self.v_min <= v
            && v <= self.v_max
    }
}

/// 追跡対象の色バンド識別子（6色固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ColorBand {
    Red,
    Blue,
    Green,
    Yellow,
    Orange,
    Purple,
}

impl ColorBand {
    /// 全バンドの一覧（バンドテーブル順）
    pub const ALL: [ColorBand; 6] = [
        ColorBand::Red,
        ColorBand::Blue,
        ColorBand::Green,
        ColorBand::Yellow,
        ColorBand::Orange,
        ColorBand::Purple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorBand::Red => "red",
            ColorBand::Blue => "blue",
            ColorBand::Green => "green",
            ColorBand::Yellow => "yellow",
            ColorBand::Orange => "orange",
            ColorBand::Purple => "purple",
        }
    }
}

/// 検出領域の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// 色追跡で検出された領域（どのバンドか）
    Color(ColorBand),
    /// フレーム差分で検出された動き領域
    Motion,
}

/// 検出された連結領域
///
/// 毎サイクル新規に計算され、サイクルをまたぐ同一性は持たない。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub kind: BlobKind,
    /// 重心X座標（フレーム座標系、常にフレーム境界内）
    pub center_x: f32,
    /// 重心Y座標（フレーム座標系、常にフレーム境界内）
    pub center_y: f32,
    /// 領域面積（ピクセル数、バンドの最小面積以上であることが保証される）
    pub area: u32,
}

/// 1サイクル分の検出結果
///
/// 発行後に変更されることはない。消費側は座標マッピングのために
/// フレーム寸法を必要とする。
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// フレーム取得時刻
    pub timestamp: Instant,
    /// 単調増加するサイクル番号（スキップされたサイクルは番号を消費しない）
    pub cycle: u64,
    /// フレームの幅
    pub frame_width: u32,
    /// フレームの高さ
    pub frame_height: u32,
    /// 色追跡の検出領域（バンドごとに0個以上）
    pub color_blobs: Vec<Blob>,
    /// 動き検出の検出領域（0個以上）
    pub motion_blobs: Vec<Blob>,
}

impl DetectionResult {
    /// 指定バンドの色Blobのみを列挙
    pub fn blobs_for_band(&self, band: ColorBand) -> impl Iterator<Item = &Blob> {
        self.color_blobs
            .iter()
            .filter(move |b| b.kind == BlobKind::Color(band))
    }
}
