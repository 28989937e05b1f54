use super::types::LiveFrame;
use crate::error::Error;
use crate::imgproc::{draw_timestamp, frame_to_bgr, TextRenderer};
use crate::sync::{Mailbox, Teardown};
use camwatch_core::source::CameraIdentity;
use camwatch_core::traits::Stream;
use chrono::Local;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 连续读帧失败多少次后放弃设备
pub const MAX_READ_RETRIES: u32 = 5;

/// 两次重试之间的等待
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub(crate) struct CaptureLoop {
    pub(crate) identity: CameraIdentity,
    pub(crate) frames: Mailbox<LiveFrame>,
    pub(crate) teardown: Teardown,
    pub(crate) released: Teardown,
    pub(crate) overlay: Option<TextRenderer>,
}

/// 任务退出 (包括 panic 展开) 时通知等待释放的一方
struct ReleaseGuard(Teardown);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fire();
    }
}

/// 每个相机一个的采集循环
///
/// 独占 `stream` (硬件句柄)，退出时停止并释放它，然后触发 teardown。
pub(crate) async fn run(mut stream: Box<dyn Stream>, ctx: CaptureLoop) {
    let _released = ReleaseGuard(ctx.released.clone());
    let camera = &ctx.identity;
    let mut failures = 0u32;
    let mut sequence = 0u64;

    info!(camera = %camera, "capture started");

    loop {
        // 1. 读一帧，同时响应 teardown
        let next = tokio::select! {
            biased;
            _ = ctx.teardown.fired() => break,
            next = stream.next_frame() => next
                .map_err(Error::from)
                .and_then(|frame| frame_to_bgr(&frame)),
        };

        match next {
            Ok(mut image) => {
                failures = 0;
                sequence += 1;

                // 2. 时间戳水印
                let now = Local::now();
                if let Some(renderer) = &ctx.overlay {
                    draw_timestamp(&mut image, renderer, &now);
                }

                // 3. 覆盖式投递，永远不阻塞
                ctx.frames.publish(LiveFrame::new(image, now, sequence));
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_READ_RETRIES {
                    error!(camera = %camera, attempts = failures, "giving up on camera: {}", e);
                    break;
                }

                warn!(camera = %camera, attempt = failures, "frame read failed, retrying in {:?}: {}", RETRY_BACKOFF, e);
                tokio::select! {
                    biased;
                    _ = ctx.teardown.fired() => break,
                    _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                }
            }
        }
    }

    // 4. 释放硬件
    if let Err(e) = stream.stop().await {
        debug!(camera = %camera, "stream stop failed: {}", e);
    }
    drop(stream);

    ctx.teardown.fire();
    info!(camera = %camera, frames = sequence, "capture stopped");
}
