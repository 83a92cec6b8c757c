//! V4L2汎用キャプチャバックエンド
//!
//! ハードウェア支援パイプラインが使えない環境向けの低レベル実装。
//! YUYVフォーマットでmmapストリーミングし、統一表現のBGRに変換する。
//! タイムアウトは `Ok(None)` として返し、デバイス喪失と区別する。

use crate::domain::{BackendKind, CaptureConfig, CapturePort, DeviceInfo, Frame, VisionError, VisionResult};
use crate::infrastructure::capture::common::yuyv_to_bgr;
use std::io;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// mmapストリーミングのバッファ数
const BUFFER_COUNT: u32 = 4;

/// V4L2キャプチャアダプタ
pub struct V4l2CaptureAdapter {
    stream: MmapStream<'static>,
    width: u32,
    height: u32,
    frame_rate: u32,
    name: String,
}

impl V4l2CaptureAdapter {
    /// デバイスを開きYUYVフォーマットをネゴシエートする
    pub fn open(config: &CaptureConfig) -> VisionResult<Self> {
        let device = Device::new(config.device_index as usize)
            .map_err(|e| VisionError::Initialization(format!("v4l2 backend: {}", e)))?;

        let mut format = device
            .format()
            .map_err(|e| VisionError::Initialization(format!("v4l2 backend: {}", e)))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = FourCC::new(b"YUYV");
        let format = device
            .set_format(&format)
            .map_err(|e| VisionError::Initialization(format!("v4l2 backend: {}", e)))?;

        // ドライバが別フォーマットしか受けない場合はこの実装では扱えない
        if format.fourcc != FourCC::new(b"YUYV") {
            return Err(VisionError::Initialization(format!(
                "v4l2 backend: device negotiated {} instead of YUYV",
                format.fourcc
            )));
        }

        let name = device
            .query_caps()
            .map(|caps| caps.card)
            .unwrap_or_else(|_| "V4L2 device".to_string());

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| VisionError::Initialization(format!("v4l2 backend: {}", e)))?;

        Ok(Self {
            stream,
            width: format.width,
            height: format.height,
            frame_rate: config.frame_rate,
            name,
        })
    }
}

impl CapturePort for V4l2CaptureAdapter {
    fn next_frame(&mut self, timeout: Duration) -> VisionResult<Option<Frame>> {
        self.stream.set_timeout(timeout);

        let (buffer, meta) = match self.stream.next() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(VisionError::CaptureLost(format!("v4l2 backend: {}", e))),
        };

        let expected = (self.width * self.height * 2) as usize;
        let used = meta.bytesused as usize;
        if used < expected {
            // 短いバッファはドライバ異常の兆候
            return Err(VisionError::CaptureLost(format!(
                "v4l2 backend: short frame ({} of {} bytes)",
                used, expected
            )));
        }

        let data = yuyv_to_bgr(&buffer[..expected], self.width, self.height);
        Ok(Some(Frame::new(data, self.width, self.height)))
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Generic
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            name: self.name.clone(),
        }
    }
}
