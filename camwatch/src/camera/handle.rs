use super::capture::{self, CaptureLoop};
use super::reader::ThreadedStream;
use super::types::{CaptureInfo, CaptureSettings, LiveFrame};
use crate::error::{Error, Result};
use crate::sync::{Mailbox, MailboxReceiver, Teardown};
use bytes::Bytes;
use camwatch_core::source::{CameraIdentity, CameraSource};
use camwatch_core::traits::{Driver, Stream};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 一台相机的运行时句柄
///
/// 状态和名字由 Device Manager 维护；句柄本身只负责采集任务、实时帧邮箱和拆除信号。
pub struct CameraHandle {
    identity: CameraIdentity,
    source: CameraSource,
    settings: Arc<CaptureSettings>,
    frames: Mailbox<LiveFrame>,
    /// 父信号是 Device Manager 的关闭信号
    teardown: Teardown,
    /// 采集任务退出后触发
    released: Teardown,
    info: OnceCell<CaptureInfo>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CameraHandle {
    pub fn new(source: CameraSource, settings: Arc<CaptureSettings>, parent: &Teardown) -> Self {
        Self {
            identity: CameraIdentity::of(&source),
            source,
            settings,
            frames: Mailbox::new(),
            teardown: parent.child(),
            released: Teardown::new(),
            info: OnceCell::new(),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &CameraIdentity {
        &self.identity
    }

    pub fn source(&self) -> &CameraSource {
        &self.source
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// 采集参数，成功启动之后才有
    pub fn info(&self) -> Option<&CaptureInfo> {
        self.info.get()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// 已关闭 (或采集已放弃)
    pub fn is_closed(&self) -> bool {
        self.teardown.is_fired()
    }

    /// 等待 teardown
    pub async fn closed(&self) {
        self.teardown.fired().await
    }

    /// 打开设备并启动采集任务
    pub async fn start(&self, driver: &dyn Driver) -> Result<CaptureInfo> {
        if self.is_closed() {
            return Err(Error::Conflict {
                id: self.identity.clone(),
                reason: "handle is already closed".into(),
            });
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::Conflict {
                id: self.identity.clone(),
                reason: "capture is already started".into(),
            });
        }

        // 1. 打开并启动流；失败时 stream 在这里被 Drop，硬件随即释放
        let stream = match self.open_stream(driver).await {
            Ok(stream) => stream,
            Err(e) => {
                // 和 close() 在同一把锁下交接：close 要么看到 started 已复位，
                // 要么等待的 released 由这里触发
                let _slot = self.task_slot();
                self.started.store(false, Ordering::Release);
                if self.is_closed() {
                    self.released.fire();
                }
                return Err(e);
            }
        };

        // 2. 记录实际参数
        let info = CaptureInfo::from(stream.info());
        let _ = self.info.set(info.clone());
        info!(
            camera = %self.identity,
            backend = driver.name(),
            "camera opened: {}x{} @ {:.1} fps ({})",
            info.width,
            info.height,
            info.fps,
            info.codec
        );

        // 3. 启动采集任务
        let task = tokio::spawn(capture::run(
            stream,
            CaptureLoop {
                identity: self.identity.clone(),
                frames: self.frames.clone(),
                teardown: self.teardown.clone(),
                released: self.released.clone(),
                overlay: self.settings.overlay.clone(),
            },
        ));
        *self.task_slot() = Some(task);

        Ok(info)
    }

    async fn open_stream(&self, driver: &dyn Driver) -> Result<Box<dyn Stream>> {
        let mut stream = driver
            .open(&self.source, &self.settings.camera_config())
            .await?;
        stream.start().await?;

        // 阻塞式的流放到专用线程上读帧
        if stream.is_blocking() {
            debug!(camera = %self.identity, "reading frames on a dedicated thread");
            return Ok(Box::new(ThreadedStream::spawn(&self.identity, stream)?));
        }
        Ok(stream)
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 订阅实时帧
    pub fn subscribe(&self) -> FrameReceiver {
        FrameReceiver {
            rx: self.frames.subscribe(),
            teardown: self.teardown.clone(),
            quality: self.settings.jpeg_quality,
        }
    }

    /// 取下一帧的 JPEG 编码
    ///
    /// 相机被拆除或 `cancel` 触发时返回 `Ok(None)`，表示流正常结束。
    pub async fn capture(&self, cancel: &Teardown) -> Result<Option<Bytes>> {
        self.subscribe().capture(cancel).await
    }

    /// 停止采集并等待硬件释放
    ///
    /// 可以重复、并发调用；只有第一次调用会真正触发 teardown。
    pub async fn close(&self) {
        if self.teardown.fire() {
            debug!(camera = %self.identity, "teardown signalled");
        }

        let (task, started) = {
            let mut slot = self.task_slot();
            (slot.take(), self.is_started())
        };

        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!(camera = %self.identity, "capture task failed: {}", e);
                }
            }
            // 另一个调用者正在等待任务结束，或者 start() 还没返回
            None if started => self.released.fired().await,
            None => {}
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        // 最后一个引用消失时让采集任务退出
        self.teardown.fire();
    }
}

impl fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraHandle")
            .field("identity", &self.identity)
            .field("source", &self.source)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 某个消费者 (观看者 / 录像) 的实时帧订阅
#[derive(Debug)]
pub struct FrameReceiver {
    rx: MailboxReceiver<LiveFrame>,
    teardown: Teardown,
    quality: u8,
}

impl FrameReceiver {
    /// 等待一帧本订阅还没见过的最新画面
    pub async fn next(&mut self, cancel: &Teardown) -> Option<Arc<LiveFrame>> {
        tokio::select! {
            biased;
            _ = self.teardown.fired() => None,
            _ = cancel.fired() => None,
            frame = self.rx.recv() => frame,
        }
    }

    /// 下一帧的 JPEG (在阻塞线程池中编码，同一帧只编码一次)
    pub async fn capture(&mut self, cancel: &Teardown) -> Result<Option<Bytes>> {
        let Some(frame) = self.next(cancel).await else {
            return Ok(None);
        };
        let quality = self.quality;
        let jpeg = tokio::task::spawn_blocking(move || frame.jpeg(quality)).await??;
        Ok(Some(jpeg))
    }
}
