use super::handle::CameraHandle;
use super::types::LiveFrame;
use crate::error::{Error, Result};
use crate::imgproc::MotionDetector;
use crate::sync::Teardown;
use crate::videoio::VideoWriter;
use camwatch_core::source::CameraIdentity;
use std::path::Path;
use tracing::{info, warn};

/// 一次录像会话的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    /// 从邮箱收到的帧数
    pub frames_seen: u64,
    /// 写入文件的帧数
    pub frames_written: u64,
}

impl CameraHandle {
    /// 把实时帧录制到 `path`，直到相机被拆除或 `cancel` 触发
    ///
    /// `motion_only` 时只写入检测到运动的帧 (任意轮廓面积达到 `min_area`)。
    /// 文件在所有退出路径上都会被关闭。
    pub async fn record_video<P: AsRef<Path>>(
        &self,
        path: P,
        motion_only: bool,
        cancel: &Teardown,
    ) -> Result<RecordingSummary> {
        let info = match self.info() {
            Some(info) if !self.is_closed() => info.clone(),
            _ => return Err(Error::NotRunning(self.identity().clone())),
        };

        // 1. 打开输出文件
        let settings = self.settings();
        let fps = if info.fps > 0.0 {
            info.fps
        } else {
            settings.fps as f64
        };
        let writer = VideoWriter::create(path, settings.codec, fps, (info.width, info.height))?;
        let quality = settings.jpeg_quality;
        let mut sink = RecordSink {
            identity: self.identity().clone(),
            size: (info.width, info.height),
            detector: motion_only.then(|| MotionDetector::new(settings.min_area)),
            writer,
        };
        let mut frames = self.subscribe();
        let mut summary = RecordingSummary::default();

        info!(
            camera = %self.identity(),
            path = %sink.writer.path().display(),
            motion_only,
            "recording started"
        );

        // 2. 逐帧过滤并写入；检测和文件 I/O 都在阻塞线程池里做
        while let Some(frame) = frames.next(cancel).await {
            summary.frames_seen += 1;

            let (returned, written) = tokio::task::spawn_blocking(move || {
                let written = sink.offer(&frame, quality);
                (sink, written)
            })
            .await?;
            sink = returned;

            if written? {
                summary.frames_written += 1;
            }
        }

        // 3. 关闭文件
        sink.writer.release()?;
        info!(
            camera = %self.identity(),
            seen = summary.frames_seen,
            written = summary.frames_written,
            "recording finished"
        );
        Ok(summary)
    }
}

/// 录像会话在阻塞线程里使用的状态
struct RecordSink {
    identity: CameraIdentity,
    size: (u32, u32),
    detector: Option<MotionDetector>,
    writer: VideoWriter,
}

impl RecordSink {
    /// 过滤一帧，需要时写入；返回是否写入
    fn offer(&mut self, frame: &LiveFrame, quality: u8) -> Result<bool> {
        if let Some(detector) = self.detector.as_mut() {
            if !detector.has_motion(&frame.image) {
                return Ok(false);
            }
        }

        if frame.image.size() != self.size {
            warn!(
                camera = %self.identity,
                "skipping frame {} with unexpected size {:?}",
                frame.sequence,
                frame.image.size()
            );
            return Ok(false);
        }

        // 观看者已经编码过的帧直接复用
        self.writer.write_jpeg(&frame.jpeg(quality)?)?;
        Ok(true)
    }
}
