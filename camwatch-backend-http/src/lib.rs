//! 网络摄像头后端：读取 HTTP 上的 MJPEG 流
//!
//! 绝大多数 IP 摄像头 / ESP32-CAM / mjpg-streamer 都以
//! `multipart/x-mixed-replace` 的形式推送连续的 JPEG。这里不解析 multipart 边界，
//! 直接在字节流里按 SOI (FF D8) / EOI (FF D9) 切帧，兼容各种不规范的实现。

use async_trait::async_trait;
use bytes::Bytes;
use camwatch_core::builder::CameraConfig;
use camwatch_core::error::{CameraError, Result};
use camwatch_core::frame::{Frame, Timestamp};
use camwatch_core::pixel_format::FourCC;
use camwatch_core::source::CameraSource;
use camwatch_core::traits::{DeviceInfo, Driver, Stream, StreamInfo};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::io::Cursor;
use std::time::Duration;

/// 等待下一块数据的最长时间
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// 缓冲区上限，超过后丢弃 (防止对端发送的不是 JPEG)
const MAX_BUFFER: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct HttpDriver {
    client: reqwest::Client,
}

impl HttpDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &'static str {
        "HTTP-MJPEG"
    }

    /// 网络流无法自动发现，只能来自配置
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(Vec::new())
    }

    async fn open(&self, source: &CameraSource, config: &CameraConfig) -> Result<Box<dyn Stream>> {
        let CameraSource::Url(url) = source else {
            return Err(CameraError::Unsupported(format!(
                "HTTP backend cannot open local device {source}"
            )));
        };

        let open_failed = |reason: String| CameraError::OpenFailed {
            target: url.clone(),
            reason,
        };

        // 1. 建立长连接
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| open_failed(e.to_string()))?;

        let mut stream = HttpStream {
            url: url.clone(),
            body: response.bytes_stream().boxed(),
            buf: Vec::new(),
            frame: Vec::new(),
            pending: false,
            started: false,
            sequence: 0,
            info: StreamInfo {
                width: 0,
                height: 0,
                fps: config.fps_req.map(|(fps, _)| fps as f64).unwrap_or(0.0),
                format: FourCC::MJPEG.into(),
            },
        };

        // 2. 读第一帧拿到分辨率，这一帧留给第一次 next_frame
        stream.read_jpeg().await.map_err(|e| open_failed(e.to_string()))?;
        let (width, height) = image::io::Reader::new(Cursor::new(&stream.frame))
            .with_guessed_format()
            .map_err(|e| open_failed(e.to_string()))?
            .into_dimensions()
            .map_err(|e| open_failed(e.to_string()))?;
        stream.info.width = width;
        stream.info.height = height;
        stream.pending = true;

        tracing::info!(url = %url, "network stream opened: {}x{}", width, height);
        Ok(Box::new(stream))
    }
}

struct HttpStream {
    url: String,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: Vec<u8>,
    frame: Vec<u8>,
    pending: bool,
    started: bool,
    sequence: u64,
    info: StreamInfo,
}

impl HttpStream {
    /// 从连接中读取下一张完整的 JPEG 到 `self.frame`
    async fn read_jpeg(&mut self) -> Result<()> {
        loop {
            if let Some((start, end)) = find_jpeg(&self.buf) {
                self.frame.clear();
                self.frame.extend_from_slice(&self.buf[start..end]);
                self.buf.drain(..end);
                return Ok(());
            }

            if self.buf.len() > MAX_BUFFER {
                self.buf.clear();
                return Err(CameraError::ReadFailed(format!(
                    "{}: no JPEG frame within {} bytes",
                    self.url, MAX_BUFFER
                )));
            }

            match tokio::time::timeout(READ_TIMEOUT, self.body.next()).await {
                Err(_) => {
                    return Err(CameraError::ReadFailed(format!("{}: read timed out", self.url)))
                }
                Ok(None) => {
                    return Err(CameraError::Disconnected(format!("{}: stream ended", self.url)))
                }
                Ok(Some(Err(e))) => return Err(CameraError::ReadFailed(e.to_string())),
                Ok(Some(Ok(chunk))) => self.buf.extend_from_slice(&chunk),
            }
        }
    }
}

/// 找到缓冲区里第一张完整 JPEG 的 [start, end)
fn find_jpeg(buf: &[u8]) -> Option<(usize, usize)> {
    let start = buf.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buf[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[async_trait]
impl Stream for HttpStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    async fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame<'_>> {
        if !self.started {
            return Err(CameraError::ReadFailed("stream not started".into()));
        }

        if self.pending {
            self.pending = false;
        } else {
            self.read_jpeg().await?;
        }
        self.sequence += 1;

        Ok(Frame {
            data: &self.frame,
            width: self.info.width,
            height: self.info.height,
            stride: 0,
            format: self.info.format,
            sequence: self.sequence,
            timestamp: Timestamp::now(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_complete_frames_only() {
        let buf = [0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0xFF, 0xD8, 0x03];
        assert_eq!(find_jpeg(&buf), Some((1, 7)));
        assert_eq!(find_jpeg(&buf[7..]), None);
        assert_eq!(find_jpeg(b"--frame\r\n"), None);
    }
}
