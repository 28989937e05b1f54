//! 录像调度：相机进入 Running 时自动开始录像

use crate::config::RecordingConfig;
use camwatch::camera::Status;
use camwatch::manager::DeviceManager;
use camwatch::sync::Teardown;
use camwatch_core::source::CameraIdentity;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// `<dir>/<identity>_<YYYYmmdd_HHMMSS>.mjpeg`
pub fn recording_path(dir: &Path, camera: &CameraIdentity, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}.mjpeg", camera, at.format("%Y%m%d_%H%M%S")))
}

/// 注册状态回调并启动调度任务
///
/// 回调运行在 manager 的 actor 上，只负责把事件转发到通道里。
pub async fn spawn_recorder(
    manager: &DeviceManager,
    config: RecordingConfig,
    shutdown: Teardown,
) -> camwatch::Result<JoinHandle<()>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<CameraIdentity>();
    manager
        .add_notification_callback(move |snapshot| {
            if snapshot.status == Status::Running {
                let _ = tx.send(snapshot.identity().clone());
            }
        })
        .await?;

    let manager = manager.clone();
    Ok(tokio::spawn(async move {
        info!(dir = %config.dir.display(), motion_only = config.motion_only, "recording scheduler started");

        loop {
            let camera = tokio::select! {
                biased;
                _ = shutdown.fired() => break,
                camera = rx.recv() => match camera {
                    Some(camera) => camera,
                    None => break,
                },
            };

            // 1. 相机可能在事件到达之前又掉线了
            let handle = match manager.camera(&camera).await {
                Ok(handle) => handle,
                Err(e) => {
                    debug!(camera = %camera, "not recording: {}", e);
                    continue;
                }
            };

            // 2. 每次运行一个录像任务，随相机拆除或服务器关闭结束
            let path = recording_path(&config.dir, &camera, Local::now());
            let motion_only = config.motion_only;
            let cancel = shutdown.child();
            tokio::spawn(async move {
                match handle.record_video(&path, motion_only, &cancel).await {
                    Ok(summary) => info!(
                        camera = %camera,
                        path = %path.display(),
                        written = summary.frames_written,
                        "recording saved"
                    ),
                    Err(e) => error!(camera = %camera, path = %path.display(), "recording failed: {}", e),
                }
            });
        }

        debug!("recording scheduler stopped");
    }))
}
