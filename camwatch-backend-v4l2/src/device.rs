use std::sync::Arc;
use v4l::capability::Flags;
use v4l::video::capture::Parameters;
use v4l::video::Capture;

use camwatch_core::builder::CameraConfig;
use camwatch_core::error::{CameraError, Result};
use camwatch_core::pixel_format::PixelFormat;
use camwatch_core::source::CameraSource;
use camwatch_core::traits::{DeviceInfo, Stream, StreamInfo};

use crate::pixel_map;
use crate::stream::V4l2Stream;

/// 枚举系统中的摄像头设备
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();

    // 遍历 /dev/video* 节点
    for node in v4l::context::enum_devices() {
        let path = node.path().to_string_lossy().to_string();
        let dev = match v4l::Device::with_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                tracing::debug!(path = %path, "skipping unreadable video node: {}", e);
                continue;
            }
        };

        if let Ok(caps) = dev.query_caps() {
            // 过滤：必须支持 Video Capture
            // 忽略 Metadata 设备或 Output 设备
            if caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                devices.push(DeviceInfo {
                    name: node.name().unwrap_or_else(|| "Unknown Camera".into()),
                    source: CameraSource::Device(node.index() as u32),
                    backend: "V4L2".to_string(),
                    bus_info: Some(caps.bus),
                });
            }
        }
    }

    Ok(devices)
}

/// 打开设备并初始化流
pub fn open(source: &CameraSource, config: &CameraConfig) -> Result<Box<dyn Stream>> {
    let CameraSource::Device(index) = source else {
        return Err(CameraError::Unsupported(format!(
            "V4L2 cannot open network source {source}"
        )));
    };

    // 1. 打开设备句柄
    let dev = v4l::Device::new(*index as usize).map_err(|e| CameraError::OpenFailed {
        target: source.to_string(),
        reason: e.to_string(),
    })?;

    // 2. 获取格式并进行协商 (Format Negotiation)
    let negotiated = negotiate_format(&dev, config)?;

    // 3. 应用格式设置 (ioctl: VIDIOC_S_FMT)
    let mut fmt = dev.format().map_err(CameraError::Io)?;
    fmt.width = negotiated.width;
    fmt.height = negotiated.height;
    fmt.fourcc = pixel_map::to_v4l_fourcc(negotiated.format).ok_or(CameraError::FormatNotSupported)?;
    let applied_fmt = dev.set_format(&fmt).map_err(CameraError::Io)?;

    // 4. 帧率 (ioctl: VIDIOC_S_PARM)，部分设备不支持，失败时沿用驱动默认值
    let fps = match config.fps_req {
        Some((fps, _)) => match dev.set_params(&Parameters::with_fps(fps)) {
            Ok(params) => interval_to_fps(params.interval.numerator, params.interval.denominator),
            Err(e) => {
                tracing::warn!(device = %source, "failed to set frame rate: {}", e);
                current_fps(&dev)
            }
        },
        None => current_fps(&dev),
    };

    tracing::info!(
        device = %source,
        "Camera opened: {}x{} @ {} ({} fps)",
        applied_fmt.width,
        applied_fmt.height,
        applied_fmt.fourcc,
        fps
    );

    let info = StreamInfo {
        width: applied_fmt.width,
        height: applied_fmt.height,
        fps,
        format: pixel_map::from_v4l_fourcc(applied_fmt.fourcc),
    };

    // 5. 初始化流 (申请 Buffer, mmap)
    let stream = V4l2Stream::new(Arc::new(dev), info, config.buffer_count)?;
    Ok(Box::new(stream))
}

fn current_fps(dev: &v4l::Device) -> f64 {
    dev.params()
        .map(|p| interval_to_fps(p.interval.numerator, p.interval.denominator))
        .unwrap_or(0.0)
}

fn interval_to_fps(numerator: u32, denominator: u32) -> f64 {
    if numerator == 0 {
        0.0
    } else {
        denominator as f64 / numerator as f64
    }
}

/// 核心：格式协商算法
/// 遍历硬件支持的所有格式，计算得分，返回最佳配置
#[derive(Debug)]
struct NegotiatedFormat {
    width: u32,
    height: u32,
    format: PixelFormat,
}

fn negotiate_format(dev: &v4l::Device, config: &CameraConfig) -> Result<NegotiatedFormat> {
    let mut best_score = -1;
    let mut best_fmt = None;

    // 获取设备支持的所有格式
    let supported_formats = dev.enum_formats().map_err(CameraError::Io)?;

    for v4l_fmt in supported_formats {
        let core_fmt = pixel_map::from_v4l_fourcc(v4l_fmt.fourcc);
        if matches!(core_fmt, PixelFormat::Unknown(_)) {
            continue;
        }

        // 获取该格式下的所有分辨率
        let resolutions = dev.enum_framesizes(v4l_fmt.fourcc).unwrap_or_default();

        for res in resolutions {
            // 这里简化处理 Discrete 分辨率，Stepwise 暂略
            for size in res.size.to_discrete() {
                let current_score = calculate_score(config, size.width, size.height, core_fmt);

                if current_score > best_score {
                    best_score = current_score;
                    best_fmt = Some(NegotiatedFormat {
                        width: size.width,
                        height: size.height,
                        format: core_fmt,
                    });
                }
            }
        }
    }

    best_fmt.ok_or(CameraError::FormatNotSupported)
}

fn calculate_score(config: &CameraConfig, w: u32, h: u32, fmt: PixelFormat) -> i32 {
    let mut score = 0;

    // 1. 匹配分辨率
    for (req_w, req_h, prio) in &config.resolution_req {
        if w == *req_w && h == *req_h {
            score += *prio as i32 * 10;
        }
    }

    // 2. 匹配格式
    for (req_fmt, prio) in &config.format_req {
        if fmt == *req_fmt {
            score += *prio as i32 * 10;
        }
    }

    // 3. 分辨率越大基础分越高 (作为 Tie-breaker)
    score += (w / 100) as i32;

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_core::builder::Priority;
    use camwatch_core::pixel_format::FourCC;

    #[test]
    fn requested_resolution_and_format_win() {
        let config = CameraConfig::new()
            .resolution(640, 480, Priority::High)
            .format(FourCC::MJPEG, Priority::Medium);

        let exact = calculate_score(&config, 640, 480, FourCC::MJPEG.into());
        let bigger = calculate_score(&config, 1920, 1080, FourCC::MJPEG.into());
        let raw = calculate_score(&config, 640, 480, FourCC::YUYV.into());
        assert!(exact > bigger);
        assert!(exact > raw);
    }

    #[test]
    fn frame_interval_conversion() {
        assert_eq!(interval_to_fps(1, 30), 30.0);
        assert_eq!(interval_to_fps(0, 30), 0.0);
    }
}
