use crate::core::mat::Mat;
use crate::error::Result;
use crate::imgcodecs::{self, DEFAULT_JPEG_QUALITY};
use crate::imgproc::drawing::TextRenderer;
use crate::imgproc::motion::DEFAULT_MIN_AREA;
use bytes::Bytes;
use camwatch_core::builder::{CameraConfig, Priority};
use camwatch_core::pixel_format::FourCC;
use camwatch_core::source::{CameraIdentity, CameraSource};
use camwatch_core::traits::StreamInfo;
use chrono::{DateTime, Local};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 相机生命周期状态
///
/// `Disconnected -> Connected -> Running -> Removed`，读帧失败时 `Running -> Disconnected`。
/// `Removed` 是终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Disconnected,
    Connected,
    Running,
    Removed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Removed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Running => "running",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 打开设备后读回的实际采集参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
}

impl From<StreamInfo> for CaptureInfo {
    fn from(info: StreamInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            fps: info.fps,
            codec: info.format.to_string(),
        }
    }
}

/// 相机描述信息，对外总是返回拷贝
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraDetails {
    pub identity: CameraIdentity,
    pub name: String,
    pub source: CameraSource,
    /// 只有成功打开过设备才有
    pub info: Option<CaptureInfo>,
}

/// 某一时刻的相机状态，用于通知和列表
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSnapshot {
    #[serde(flatten)]
    pub details: CameraDetails,
    pub status: Status,
}

impl CameraSnapshot {
    pub fn identity(&self) -> &CameraIdentity {
        &self.details.identity
    }
}

/// 所有相机共享的采集参数
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// 录像编码
    pub codec: FourCC,
    pub jpeg_quality: u8,
    /// 运动检测的最小面积 (像素)
    pub min_area: usize,
    /// 时间戳水印，None 表示不绘制
    pub overlay: Option<TextRenderer>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            codec: FourCC::MJPEG,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            min_area: DEFAULT_MIN_AREA,
            overlay: Some(TextRenderer::bitmap()),
        }
    }
}

impl CaptureSettings {
    /// 转换为驱动层的格式协商请求
    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig::new()
            .resolution(self.width, self.height, Priority::High)
            .fps(self.fps, Priority::Medium)
            .format(FourCC::MJPEG, Priority::Medium)
            .format(FourCC::YUYV, Priority::Low)
    }
}

/// 一帧实时画面 (BGR)，在所有消费者之间通过 Arc 共享
pub struct LiveFrame {
    pub image: Mat,
    pub captured_at: DateTime<Local>,
    pub sequence: u64,
    jpeg: OnceCell<Bytes>,
}

impl LiveFrame {
    pub fn new(image: Mat, captured_at: DateTime<Local>, sequence: u64) -> Self {
        Self {
            image,
            captured_at,
            sequence,
            jpeg: OnceCell::new(),
        }
    }

    /// JPEG 编码结果，同一帧只编码一次 (多个观看者共享)
    pub fn jpeg(&self, quality: u8) -> Result<Bytes> {
        self.jpeg
            .get_or_try_init(|| imgcodecs::imencode_jpeg(&self.image, quality).map(Bytes::from))
            .cloned()
    }
}

impl fmt::Debug for LiveFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFrame")
            .field("image", &self.image)
            .field("captured_at", &self.captured_at)
            .field("sequence", &self.sequence)
            .field("encoded", &self.jpeg.get().is_some())
            .finish()
    }
}
