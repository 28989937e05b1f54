use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use v4l::buffer::Type;

// 同时引入 Stream (用于 start/stop) 和 CaptureStream (用于 next)
use v4l::io::traits::{CaptureStream, Stream as V4lStream};

use camwatch_core::error::{CameraError, Result};
use camwatch_core::frame::{Frame, Timestamp};
use camwatch_core::traits::{Stream, StreamInfo};

/// 等待一帧的最长时间，超时算作一次读帧失败
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

pub struct V4l2Stream {
    inner: v4l::io::mmap::Stream<'static>,
    info: StreamInfo,
    is_streaming: bool,
    _dev: Arc<v4l::Device>,
}

// mmap 映射的缓冲区只在持有 &mut self 时访问
unsafe impl Send for V4l2Stream {}

impl V4l2Stream {
    pub fn new(dev: Arc<v4l::Device>, info: StreamInfo, buf_count: usize) -> Result<Self> {
        let mut stream =
            v4l::io::mmap::Stream::with_buffers(&dev, Type::VideoCapture, buf_count as u32)
                .map_err(CameraError::Io)?;
        stream.set_timeout(FRAME_TIMEOUT);

        Ok(Self {
            inner: stream,
            info,
            is_streaming: false,
            _dev: dev,
        })
    }
}

#[async_trait]
impl Stream for V4l2Stream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    async fn start(&mut self) -> Result<()> {
        V4lStream::start(&mut self.inner).map_err(CameraError::Io)?;
        self.is_streaming = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.is_streaming {
            V4lStream::stop(&mut self.inner).map_err(CameraError::Io)?;
            self.is_streaming = false;
        }
        Ok(())
    }

    // DQBUF 会阻塞线程，交给调用方的专用读帧线程
    fn is_blocking(&self) -> bool {
        true
    }

    async fn next_frame(&mut self) -> Result<Frame<'_>> {
        if !self.is_streaming {
            return Err(CameraError::Io(io::Error::other("Stream not started")));
        }

        // 注意：V4L2 的 DQBUF 是阻塞调用 (最多 FRAME_TIMEOUT)
        let (buf, meta) = self
            .inner
            .next()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        let hw_ns =
            (meta.timestamp.sec as u64 * 1_000_000_000) + (meta.timestamp.usec as u64 * 1_000);

        let len = (meta.bytesused as usize).min(buf.len());
        let stride = if self.info.format.is_compressed() {
            0
        } else {
            len / self.info.height.max(1) as usize
        };

        Ok(Frame {
            data: &buf[..len],
            width: self.info.width,
            height: self.info.height,
            stride,
            format: self.info.format,
            sequence: meta.sequence as u64,
            timestamp: Timestamp::now(hw_ns),
        })
    }
}
