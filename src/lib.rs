//! rainbow_vision - Library
//!
//! カメラインタラクション用の検出コア。
//! バイナリターゲット（schema生成など）と統合テストから
//! プロジェクトのモジュールにアクセスするために提供されている。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;
