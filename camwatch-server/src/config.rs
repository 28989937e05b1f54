//! TOML 配置文件
//!
//! 所有字段都有默认值；文件不存在时按默认值生成一份。

use camwatch::camera::CaptureSettings;
use camwatch::imgproc::TextRenderer;
use camwatch::manager::{ManagerConfig, StreamSource};
use camwatch::videoio::backend::BackendType;
use camwatch_core::pixel_format::FourCC;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to render default config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub streaming: StreamingConfig,
    pub camera: CameraConfig,
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
    pub discovery: DiscoveryConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
        }
    }
}

impl ApiConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 未配置 token 时不做鉴权
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// 每个观看者每秒最多推送的帧数
    pub fps_limit: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { fps_limit: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// 录像编码 FourCC，目前只支持 MJPG
    pub codec: String,
    pub jpeg_quality: u8,
    /// 运动检测的最小轮廓面积 (像素)
    pub min_area: usize,
    /// 是否绘制时间戳水印
    pub overlay: bool,
    /// TrueType 字体，不配置时使用内置点阵字体
    pub font_path: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let defaults = CaptureSettings::default();
        Self {
            width: defaults.width,
            height: defaults.height,
            fps: defaults.fps,
            codec: defaults.codec.to_string().trim().to_string(),
            jpeg_quality: defaults.jpeg_quality,
            min_area: defaults.min_area,
            overlay: true,
            font_path: None,
        }
    }
}

impl CameraConfig {
    pub fn capture_settings(&self) -> Result<CaptureSettings, ConfigError> {
        let codec: FourCC = self
            .codec
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("camera.codec: {e}")))?;
        // 录像写入器只会写 Motion-JPEG
        if codec != FourCC::MJPEG {
            return Err(ConfigError::Invalid(format!(
                "camera.codec: only MJPG recording is supported, got {}",
                self.codec
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "camera.jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }

        let overlay = match (&self.font_path, self.overlay) {
            (_, false) => None,
            (Some(path), true) => Some(
                TextRenderer::from_file(path)
                    .map_err(|e| ConfigError::Invalid(format!("camera.font_path: {e}")))?,
            ),
            (None, true) => Some(TextRenderer::bitmap()),
        };

        Ok(CaptureSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
            codec,
            jpeg_quality: self.jpeg_quality,
            min_area: self.min_area,
            overlay,
        })
    }
}

/// `[[streams]]`：固定的网络 MJPEG 流
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn camera_store(&self) -> PathBuf {
        self.data_dir.join("cameras.json")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub motion_only: bool,
    pub dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            motion_only: true,
            dir: PathBuf::from("recordings"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub backend: BackendType,
    pub interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            interval_secs: 20,
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    /// 读取配置；文件不存在时写出一份默认配置
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        match fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(dir).map_err(io_err)?;
                }
                fs::write(path, toml::to_string_pretty(&config)?).map_err(io_err)?;
                info!(path = %path.display(), "default config written");
                Ok(config)
            }
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        Ok(ManagerConfig {
            capture: self.camera.capture_settings()?,
            streams: self
                .streams
                .iter()
                .map(|s| StreamSource {
                    url: s.url.trim().to_string(),
                    name: s.name.clone(),
                })
                .collect(),
        })
    }
}
