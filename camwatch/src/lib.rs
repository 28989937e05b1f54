//! 多相机管理：设备发现、实时帧分发、按运动过滤的录像
//!
//! - [`manager::DeviceManager`] 持有所有相机状态，所有操作串行执行
//! - [`camera::CameraHandle`] 一台相机的采集任务和实时帧邮箱
//! - `core` / `imgproc` / `imgcodecs` / `videoio` 是 OpenCV 风格的图像工具

pub mod camera;
pub mod core;
pub mod error;
pub mod imgcodecs;
pub mod imgproc;
pub mod manager;
pub mod sync;
pub mod videoio;

// Re-export 核心类型，方便 prelude 使用
pub use crate::core::mat::Mat;
pub use crate::error::{Error, Result};
pub use camwatch_core as driver;

/// 预置模块，用户可以通过 `use camwatch::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::camera::{CameraHandle, CameraSnapshot, CaptureSettings, Status};
    pub use crate::core::mat::Mat;
    pub use crate::error::{Error, Result};
    pub use crate::manager::{DeviceManager, JsonFileStore, ManagerConfig, MemoryStore, StreamSource};
    pub use crate::sync::Teardown;
    pub use crate::videoio::backend::{create_driver, BackendType};
    pub use crate::videoio::VideoWriter;
    pub use camwatch_core::source::{CameraIdentity, CameraSource};
}
