//! Infrastructure層
//!
//! ハードウェアと画像処理の具体的な実装。
//! Domain層のポートを実装し、Application層から利用される。

pub mod capture;
pub mod color_tracker;
pub mod imgproc;
pub mod motion_detector;

pub use capture::{FrameSource, SyntheticCaptureAdapter};
pub use color_tracker::ColorTracker;
pub use motion_detector::MotionDetector;
