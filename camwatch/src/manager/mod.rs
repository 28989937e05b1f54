//! Device Manager：所有相机状态的唯一所有者
//!
//! 状态只在一个 actor 任务里修改。外部操作都被包装成命令排队执行，
//! 因此任意两个操作之间都是串行的，不需要额外加锁。

mod actor;
mod registry;
pub mod store;

pub use registry::{Candidate, NotificationCallback, Registry, SweepReport};
pub use store::{CameraRecord, CameraStore, JsonFileStore, MemoryStore};

use crate::camera::{CameraHandle, CameraSnapshot, CaptureSettings};
use crate::error::{Error, Result};
use crate::sync::Teardown;
use camwatch_core::source::{CameraIdentity, CameraSource};
use camwatch_core::traits::Driver;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 配置中固定的网络流
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSource {
    pub url: String,
    pub name: Option<String>,
}

impl StreamSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
        }
    }

    fn candidate(&self) -> Candidate {
        Candidate {
            source: CameraSource::Url(self.url.clone()),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub capture: CaptureSettings,
    /// 每次扫描都会尝试的网络流
    pub streams: Vec<StreamSource>,
}

/// Device Manager 的前端，可以随意 clone
#[derive(Clone)]
pub struct DeviceManager {
    commands: mpsc::UnboundedSender<actor::Command>,
    shutdown: Teardown,
    driver: Arc<dyn Driver>,
    streams: Arc<Vec<StreamSource>>,
}

impl DeviceManager {
    /// 加载持久化的相机记录并启动 actor 任务
    ///
    /// 必须在 Tokio 运行时内调用。
    pub fn spawn(
        driver: Arc<dyn Driver>,
        store: Arc<dyn CameraStore>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let records = store.load()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Teardown::new();

        let registry = Registry::new(
            driver.clone(),
            store,
            Arc::new(config.capture),
            shutdown.clone(),
            tx.downgrade(),
        );
        tokio::spawn(actor::run(registry, records, rx, shutdown.clone()));
        info!(backend = driver.name(), streams = config.streams.len(), "device manager started");

        Ok(Self {
            commands: tx,
            shutdown,
            driver,
            streams: Arc::new(config.streams),
        })
    }

    /// 在 actor 任务内执行任意操作并取回结果
    ///
    /// 操作按提交顺序一个接一个执行。管理器关闭之后立即返回 `ManagerClosed`。
    ///
    /// ```ignore
    /// let count = manager.submit(|registry| Box::pin(async move { Ok(registry.len()) })).await?;
    /// ```
    pub async fn submit<T, F>(&self, action: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Registry) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        if self.shutdown.is_fired() {
            return Err(Error::ManagerClosed);
        }
        actor::submit(&self.commands, action).await
    }

    /// 枚举本机设备，连同配置的网络流一起扫描一遍
    ///
    /// 枚举失败不影响网络流的启动，错误在扫描完成后返回。
    pub async fn check_system_cameras(&self) -> Result<SweepReport> {
        if self.shutdown.is_fired() {
            return Err(Error::ManagerClosed);
        }

        // 1. 枚举可能阻塞，放到阻塞线程池
        let driver = self.driver.clone();
        let listed = tokio::task::spawn_blocking(move || driver.list_devices()).await?;
        let (mut candidates, enumeration_error) = match listed {
            Ok(devices) => (
                devices
                    .into_iter()
                    .map(|d| Candidate::named(d.source, d.name))
                    .collect::<Vec<_>>(),
                None,
            ),
            Err(e) => {
                warn!("device enumeration failed: {}", e);
                (Vec::new(), Some(e))
            }
        };

        // 2. 网络流
        candidates.extend(self.streams.iter().map(StreamSource::candidate));

        // 3. 整个扫描作为一个命令执行
        let report = self
            .submit(move |registry| Box::pin(async move { Ok(registry.sweep(candidates).await) }))
            .await?;
        info!(
            started = report.started.len(),
            running = report.running.len(),
            failed = report.failed.len(),
            "camera sweep finished"
        );

        match enumeration_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// 所有相机的拷贝
    pub async fn get_cameras(&self) -> Result<Vec<CameraSnapshot>> {
        self.submit(|registry| Box::pin(async move { Ok(registry.snapshots()) }))
            .await
    }

    /// 正在运行的相机；其他状态一律 `NotFound`
    pub async fn camera(&self, id: &CameraIdentity) -> Result<Arc<CameraHandle>> {
        let id = id.clone();
        self.submit(move |registry| {
            Box::pin(async move { registry.running_handle(&id).ok_or(Error::NotFound(id)) })
        })
        .await
    }

    pub async fn add_camera(
        &self,
        source: CameraSource,
        name: Option<String>,
    ) -> Result<CameraIdentity> {
        self.submit(move |registry| Box::pin(registry.add_camera(source, name)))
            .await
    }

    pub async fn remove_camera(&self, id: &CameraIdentity) -> Result<()> {
        let id = id.clone();
        self.submit(move |registry| Box::pin(async move { registry.remove_camera(&id).await }))
            .await
    }

    pub async fn rename_camera(&self, id: &CameraIdentity, name: impl Into<String>) -> Result<()> {
        let id = id.clone();
        let name = name.into();
        self.submit(move |registry| Box::pin(async move { registry.rename_camera(&id, name) }))
            .await
    }

    /// 注册状态变化回调
    ///
    /// 回调在 actor 任务内同步执行，看到的状态顺序和实际变化顺序一致。
    pub async fn add_notification_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&CameraSnapshot) + Send + Sync + 'static,
    {
        let callback: NotificationCallback = Arc::new(callback);
        self.submit(move |registry| {
            Box::pin(async move {
                registry.add_notification_callback(callback);
                Ok(())
            })
        })
        .await
    }

    /// 关闭所有相机并停止 actor，可以重复调用
    ///
    /// 返回时采集任务都已退出并释放了硬件，相机记录也已落盘。
    pub async fn close(&self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let result = self
            .submit(move |registry| {
                Box::pin(async move {
                    registry.close_all().await;
                    registry.flush_store().await;
                    shutdown.fire();
                    Ok(())
                })
            })
            .await;

        match result {
            Ok(()) | Err(Error::ManagerClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_fired()
    }

    /// 等待管理器关闭
    pub async fn closed(&self) {
        self.shutdown.fired().await
    }
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("backend", &self.driver.name())
            .field("streams", &self.streams)
            .field("closed", &self.is_closed())
            .finish()
    }
}
