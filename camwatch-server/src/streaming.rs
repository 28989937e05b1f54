//! 实时画面推送：每个观看者一个 WebSocket 会话

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use camwatch::camera::CameraHandle;
use camwatch::sync::Teardown;
use camwatch_core::source::CameraIdentity;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 当前在线的观看会话数
#[derive(Debug, Clone, Default)]
pub struct ViewerGauge(Arc<AtomicUsize>);

impl ViewerGauge {
    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ViewerGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ViewerGuard(self.0.clone())
    }
}

struct ViewerGuard(Arc<AtomicUsize>);

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    CameraClosed,
    ViewerLeft,
    SendFailed,
}

/// `GET /video/:id`
///
/// 先查找相机，找不到直接返回 404，不升级连接。
pub async fn video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let id = CameraIdentity::from(id);
    let handle = state.manager.camera(&id).await?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let cancel = state.shutdown.child();
    let viewers = state.viewers.clone();
    let fps_limit = state.fps_limit;
    Ok(upgrade.on_upgrade(move |socket| serve_viewer(socket, handle, cancel, fps_limit, viewers)))
}

async fn serve_viewer(
    mut socket: WebSocket,
    handle: Arc<CameraHandle>,
    cancel: Teardown,
    fps_limit: u32,
    viewers: ViewerGauge,
) {
    let _viewer = viewers.enter();
    let camera = handle.identity().clone();
    info!(camera = %camera, viewers = viewers.current(), "viewer connected");

    // 推送循环中的 panic 只结束本连接
    let outcome = AssertUnwindSafe(forward_frames(&mut socket, &handle, &cancel, fps_limit))
        .catch_unwind()
        .await;
    match outcome {
        Ok(end) => debug!(camera = %camera, ?end, "viewer session ended"),
        Err(_) => error!(camera = %camera, "viewer session panicked"),
    }

    // close 消耗 socket，只会发生一次
    if let Err(e) = socket.close().await {
        debug!(camera = %camera, "websocket close failed: {}", e);
    }
    info!(camera = %camera, "viewer disconnected");
}

async fn forward_frames(
    socket: &mut WebSocket,
    handle: &CameraHandle,
    cancel: &Teardown,
    fps_limit: u32,
) -> SessionEnd {
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps_limit.max(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frames = handle.subscribe();

    loop {
        // 1. 等待节拍，同时观察取消和观看者断开
        tokio::select! {
            biased;
            _ = cancel.fired() => return SessionEnd::Cancelled,
            message = socket.recv() => match message {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return SessionEnd::ViewerLeft,
                Some(Ok(_)) => continue,
            },
            _ = ticker.tick() => {}
        }

        // 2. 取最新一帧
        let jpeg = match frames.capture(cancel).await {
            Ok(Some(jpeg)) => jpeg,
            Ok(None) if cancel.is_fired() => return SessionEnd::Cancelled,
            Ok(None) => return SessionEnd::CameraClosed,
            Err(e) => {
                warn!(camera = %handle.identity(), "frame capture failed: {}", e);
                continue;
            }
        };
        if jpeg.is_empty() {
            warn!(camera = %handle.identity(), "empty frame captured");
            continue;
        }

        // 3. 写出失败说明连接已断开
        if let Err(e) = socket.send(Message::Binary(jpeg.to_vec())).await {
            debug!(camera = %handle.identity(), "websocket send failed: {}", e);
            return SessionEnd::SendFailed;
        }
    }
}
