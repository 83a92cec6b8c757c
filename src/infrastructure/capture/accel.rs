//! ハードウェア支援キャプチャバックエンド
//!
//! nokhwaを介してプラットフォームネイティブのカメラパイプラインを使う。
//! デコード出力（RGB）は統一表現のBGRに変換して返す。
//! 対象デバイスが存在しない・初期化に失敗した場合は
//! `VisionError::Initialization` を返し、呼び出し側が次の
//! バックエンドへフォールバックする。

use crate::domain::{BackendKind, CaptureConfig, CapturePort, DeviceInfo, Frame, VisionError, VisionResult};
use crate::infrastructure::capture::common::rgb_to_bgr_in_place;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::time::Duration;

/// nokhwaベースのキャプチャアダプタ
pub struct AccelCaptureAdapter {
    camera: Camera,
}

impl AccelCaptureAdapter {
    /// デバイスを開きストリーミングを開始する
    pub fn open(config: &CaptureConfig) -> VisionResult<Self> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.width, config.height),
                FrameFormat::MJPEG,
                config.frame_rate,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(config.device_index), format)
            .map_err(|e| VisionError::Initialization(format!("accelerated backend: {}", e)))?;
        camera
            .open_stream()
            .map_err(|e| VisionError::Initialization(format!("accelerated backend: {}", e)))?;

        Ok(Self { camera })
    }
}

impl CapturePort for AccelCaptureAdapter {
    /// 次のフレームを取得
    ///
    /// nokhwaはドライバ側のペーシングでブロックするため、timeoutは
    /// ドライバのタイムアウトに委ねる。ストリーム異常は
    /// `VisionError::CaptureLost` として返す。
    fn next_frame(&mut self, _timeout: Duration) -> VisionResult<Option<Frame>> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| VisionError::CaptureLost(format!("accelerated backend: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| VisionError::CaptureLost(format!("frame decode: {}", e)))?;

        let width = decoded.width();
        let height = decoded.height();
        let mut data = decoded.into_raw();
        rgb_to_bgr_in_place(&mut data);

        Ok(Some(Frame::new(data, width, height)))
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn device_info(&self) -> DeviceInfo {
        let resolution = self.camera.resolution();
        DeviceInfo {
            width: resolution.width(),
            height: resolution.height(),
            frame_rate: self.camera.frame_rate(),
            name: self.camera.info().human_name(),
        }
    }
}
