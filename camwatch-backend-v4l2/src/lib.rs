#![cfg(target_os = "linux")]

pub mod device;
pub mod pixel_map;
pub mod stream;

use async_trait::async_trait;
use camwatch_core::builder::CameraConfig;
use camwatch_core::error::Result;
use camwatch_core::source::CameraSource;
use camwatch_core::traits::{DeviceInfo, Driver, Stream};
use std::sync::Arc;

/// V4L2 驱动
#[derive(Debug, Clone, Default)]
pub struct V4l2Driver;

impl V4l2Driver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for V4l2Driver {
    fn name(&self) -> &'static str {
        "V4L2"
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        device::list_devices()
    }

    async fn open(&self, source: &CameraSource, config: &CameraConfig) -> Result<Box<dyn Stream>> {
        device::open(source, config)
    }
}

// 为了方便直接使用，提供一个默认实例
pub fn default_driver() -> Arc<dyn Driver> {
    Arc::new(V4l2Driver::new())
}
