use super::actor::{self, Command};
use super::store::{CameraRecord, CameraStore};
use crate::camera::{CameraDetails, CameraHandle, CameraSnapshot, CaptureSettings, Status};
use crate::error::{Error, Result};
use crate::sync::Teardown;
use camwatch_core::source::{CameraIdentity, CameraSource};
use camwatch_core::traits::Driver;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// 状态变化回调，在 actor 任务内同步调用，不能阻塞
pub type NotificationCallback = Arc<dyn Fn(&CameraSnapshot) + Send + Sync>;

/// 一次扫描中要尝试的相机
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: CameraSource,
    /// 新建条目时使用的名字
    pub name: Option<String>,
}

impl Candidate {
    pub fn new(source: CameraSource) -> Self {
        Self { source, name: None }
    }

    pub fn named(source: CameraSource, name: impl Into<String>) -> Self {
        Self {
            source,
            name: Some(name.into()),
        }
    }
}

/// 一次扫描的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// 本次新启动的
    pub started: Vec<CameraIdentity>,
    /// 之前已经在运行的
    pub running: Vec<CameraIdentity>,
    /// 已移除而被跳过的
    pub removed: Vec<CameraIdentity>,
    /// 启动失败的，附带原因
    pub failed: Vec<(CameraIdentity, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BringUp {
    Started,
    AlreadyRunning,
}

struct CameraEntry {
    name: String,
    status: Status,
    handle: Arc<CameraHandle>,
}

/// Device Manager 的全部可变状态
///
/// 只存在于 actor 任务内部；外部通过 `DeviceManager::submit` 提交的闭包拿到 `&mut Registry`，
/// 同一时刻只有一个闭包在执行。
pub struct Registry {
    cameras: BTreeMap<CameraIdentity, CameraEntry>,
    callbacks: Vec<NotificationCallback>,
    driver: Arc<dyn Driver>,
    store: Arc<dyn CameraStore>,
    /// 唤醒写盘任务；写盘期间的多次唤醒合并为一次
    flush: Arc<Notify>,
    settings: Arc<CaptureSettings>,
    shutdown: Teardown,
    commands: WeakUnboundedSender<Command>,
}

impl Registry {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        store: Arc<dyn CameraStore>,
        settings: Arc<CaptureSettings>,
        shutdown: Teardown,
        commands: WeakUnboundedSender<Command>,
    ) -> Self {
        let flush = Arc::new(Notify::new());
        spawn_flusher(store.clone(), flush.clone(), shutdown.clone());

        Self {
            cameras: BTreeMap::new(),
            callbacks: Vec::new(),
            driver,
            store,
            flush,
            settings,
            shutdown,
            commands,
        }
    }

    // ---------------------------------------------------------------
    // 查询
    // ---------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn status(&self, id: &CameraIdentity) -> Option<Status> {
        self.cameras.get(id).map(|e| e.status)
    }

    pub fn snapshot(&self, id: &CameraIdentity) -> Option<CameraSnapshot> {
        let entry = self.cameras.get(id)?;
        Some(CameraSnapshot {
            details: CameraDetails {
                identity: id.clone(),
                name: entry.name.clone(),
                source: entry.handle.source().clone(),
                info: entry.handle.info().cloned(),
            },
            status: entry.status,
        })
    }

    /// 所有相机的拷贝，按 identity 排序
    pub fn snapshots(&self) -> Vec<CameraSnapshot> {
        self.cameras
            .keys()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    /// 正在运行的相机句柄
    pub fn running_handle(&self, id: &CameraIdentity) -> Option<Arc<CameraHandle>> {
        self.cameras
            .get(id)
            .filter(|e| e.status == Status::Running)
            .map(|e| e.handle.clone())
    }

    // ---------------------------------------------------------------
    // 变更
    // ---------------------------------------------------------------

    pub fn add_notification_callback(&mut self, callback: NotificationCallback) {
        self.callbacks.push(callback);
    }

    /// 手动添加一台相机并立即尝试启动
    ///
    /// 已在运行返回 `Conflict`，已移除返回 `Removed`。
    pub async fn add_camera(
        &mut self,
        source: CameraSource,
        name: Option<String>,
    ) -> Result<CameraIdentity> {
        let id = CameraIdentity::of(&source);
        self.ensure_entry(&source, None);

        match self.status(&id) {
            Some(Status::Removed) => return Err(Error::Removed(id)),
            Some(Status::Running) => {
                return Err(Error::Conflict {
                    id,
                    reason: "camera is already running".into(),
                })
            }
            _ => {}
        }

        if let Some(name) = name {
            if let Some(entry) = self.cameras.get_mut(&id) {
                entry.name = name;
            }
            self.persist(&id);
        }
        self.set_status(&id, Status::Connected);
        self.bring_up(&source, None).await?;
        Ok(id)
    }

    /// 移除相机：先落盘 `Removed`，再关闭句柄并等待硬件释放
    ///
    /// 条目作为墓碑保留，之后的扫描不会再启动它。
    pub async fn remove_camera(&mut self, id: &CameraIdentity) -> Result<()> {
        let entry = self
            .cameras
            .get(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        if entry.status.is_terminal() {
            return Err(Error::Conflict {
                id: id.clone(),
                reason: "camera is already removed".into(),
            });
        }
        let handle = entry.handle.clone();

        self.set_status(id, Status::Removed);
        handle.close().await;
        info!(camera = %id, "camera removed");
        Ok(())
    }

    pub fn rename_camera(&mut self, id: &CameraIdentity, name: impl Into<String>) -> Result<()> {
        let entry = self
            .cameras
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        if entry.status.is_terminal() {
            return Err(Error::Removed(id.clone()));
        }
        entry.name = name.into();
        debug!(camera = %id, name = %entry.name, "camera renamed");

        self.persist(id);
        self.notify(id);
        Ok(())
    }

    /// 对候选列表和所有未运行的已知相机各尝试一次启动
    ///
    /// 单个相机失败不影响其他相机。
    pub async fn sweep(&mut self, candidates: Vec<Candidate>) -> SweepReport {
        let mut seen = BTreeSet::new();
        let mut queue = Vec::new();
        for candidate in candidates {
            if seen.insert(CameraIdentity::of(&candidate.source)) {
                queue.push(candidate);
            }
        }
        for (id, entry) in &self.cameras {
            let idle = matches!(entry.status, Status::Connected | Status::Disconnected);
            if idle && seen.insert(id.clone()) {
                queue.push(Candidate::new(entry.handle.source().clone()));
            }
        }

        let mut report = SweepReport::default();
        for candidate in queue {
            let id = CameraIdentity::of(&candidate.source);
            match self.bring_up(&candidate.source, candidate.name).await {
                Ok(BringUp::Started) => report.started.push(id),
                Ok(BringUp::AlreadyRunning) => report.running.push(id),
                Err(Error::Removed(_)) => report.removed.push(id),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }
        report
    }

    /// 确保条目存在并处于运行状态
    pub(crate) async fn bring_up(
        &mut self,
        source: &CameraSource,
        name: Option<String>,
    ) -> Result<BringUp> {
        let id = CameraIdentity::of(source);
        self.ensure_entry(source, name);

        let Some(entry) = self.cameras.get(&id) else {
            return Err(Error::NotFound(id));
        };
        match entry.status {
            Status::Removed => return Err(Error::Removed(id)),
            Status::Running => return Ok(BringUp::AlreadyRunning),
            Status::Connected | Status::Disconnected => {}
        }

        // 已经拆除的句柄不能再启动，换一个新的
        let handle = if entry.handle.is_closed() {
            let fresh = self.new_handle(source);
            if let Some(entry) = self.cameras.get_mut(&id) {
                entry.handle = fresh.clone();
            }
            fresh
        } else {
            entry.handle.clone()
        };

        match handle.start(self.driver.as_ref()).await {
            Ok(_) => {
                self.set_status(&id, Status::Running);
                self.watch(id, handle);
                Ok(BringUp::Started)
            }
            Err(e) => {
                warn!(camera = %id, "failed to start camera: {}", e);
                Err(e)
            }
        }
    }

    /// 采集任务自行退出后由监视任务提交
    ///
    /// 只处理仍然指向同一个句柄、且没有被移除的条目。
    pub(crate) fn on_capture_ended(&mut self, id: &CameraIdentity, handle: &Arc<CameraHandle>) {
        let current = self
            .cameras
            .get(id)
            .is_some_and(|e| Arc::ptr_eq(&e.handle, handle) && !e.status.is_terminal());
        if !current {
            return;
        }

        self.set_status(id, Status::Disconnected);
        self.cameras.remove(id);
        info!(camera = %id, "camera dropped from registry");
    }

    /// 关闭所有句柄，运行中的相机标记为 `Disconnected`
    pub(crate) async fn close_all(&mut self) {
        let ids: Vec<_> = self.cameras.keys().cloned().collect();
        for id in ids {
            let Some(entry) = self.cameras.get(&id) else {
                continue;
            };
            let handle = entry.handle.clone();
            let was_running = entry.status == Status::Running;

            handle.close().await;
            if was_running {
                self.set_status(&id, Status::Disconnected);
            }
        }
    }

    /// 从存储恢复条目：`Removed` 保持墓碑，其余一律按 `Disconnected` 等待扫描
    pub(crate) async fn restore(&mut self, records: Vec<CameraRecord>) {
        for record in records {
            let id = CameraIdentity::of(&record.source);
            if id != record.identity {
                warn!(
                    stored = %record.identity,
                    derived = %id,
                    "skipping camera record with mismatched identity"
                );
                continue;
            }

            let handle = self.new_handle(&record.source);
            let status = match record.status {
                Status::Removed => {
                    handle.close().await;
                    Status::Removed
                }
                _ => Status::Disconnected,
            };
            self.cameras.insert(
                id.clone(),
                CameraEntry {
                    name: record.name,
                    status,
                    handle,
                },
            );
            if status != record.status {
                self.persist(&id);
            }
        }
        debug!(cameras = self.cameras.len(), "camera registry restored");
    }

    fn new_handle(&self, source: &CameraSource) -> Arc<CameraHandle> {
        Arc::new(CameraHandle::new(
            source.clone(),
            self.settings.clone(),
            &self.shutdown,
        ))
    }

    fn ensure_entry(&mut self, source: &CameraSource, name: Option<String>) {
        let id = CameraIdentity::of(source);
        if self.cameras.contains_key(&id) {
            return;
        }

        let handle = self.new_handle(source);
        let name = name.unwrap_or_else(|| format!("Camera {}", id));
        debug!(camera = %id, source = %source, "tracking new camera");
        self.cameras.insert(
            id.clone(),
            CameraEntry {
                name,
                status: Status::Disconnected,
                handle,
            },
        );
        self.persist(&id);
    }

    fn set_status(&mut self, id: &CameraIdentity, status: Status) {
        let Some(entry) = self.cameras.get_mut(id) else {
            return;
        };
        if entry.status == status {
            return;
        }
        if entry.status.is_terminal() {
            warn!(camera = %id, "ignoring transition to {} for removed camera", status);
            return;
        }

        info!(camera = %id, from = %entry.status, to = %status, "camera status changed");
        entry.status = status;
        self.persist(id);
        self.notify(id);
    }

    // 存储失败只记录日志，内存状态仍然是权威的
    fn persist(&self, id: &CameraIdentity) {
        let Some(snapshot) = self.snapshot(id) else {
            return;
        };
        let record = CameraRecord {
            identity: snapshot.details.identity,
            name: snapshot.details.name,
            status: snapshot.status,
            source: snapshot.details.source,
        };
        if let Err(e) = self.store.save(&record) {
            error!(camera = %id, "failed to persist camera state: {}", e);
            return;
        }
        self.flush.notify_one();
    }

    /// 等待所有已保存的记录落盘
    pub(crate) async fn flush_store(&self) {
        flush_blocking(self.store.clone()).await;
    }

    fn notify(&self, id: &CameraIdentity) {
        let Some(snapshot) = self.snapshot(id) else {
            return;
        };
        for callback in &self.callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&snapshot))).is_err() {
                error!(camera = %id, "notification callback panicked");
            }
        }
    }

    /// 为运行中的句柄起一个监视任务，采集自行结束时回报 actor
    fn watch(&self, id: CameraIdentity, handle: Arc<CameraHandle>) {
        let commands = self.commands.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.fired() => return,
                _ = handle.closed() => {}
            }

            let Some(commands) = commands.upgrade() else {
                return;
            };
            let result = actor::submit(&commands, move |registry| {
                Box::pin(async move {
                    registry.on_capture_ended(&id, &handle);
                    Ok(())
                })
            })
            .await;
            if let Err(e) = result {
                debug!("capture end not reported: {}", e);
            }
        });
    }
}

/// 后台写盘任务，直到管理器关闭；关闭时的最后一次写盘由 `flush_store` 完成
fn spawn_flusher(store: Arc<dyn CameraStore>, wake: Arc<Notify>, shutdown: Teardown) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.fired() => break,
                _ = wake.notified() => {}
            }
            flush_blocking(store.clone()).await;
        }
    });
}

async fn flush_blocking(store: Arc<dyn CameraStore>) {
    match tokio::task::spawn_blocking(move || store.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("failed to flush camera store: {}", e),
        Err(e) => error!("camera store flush task failed: {}", e),
    }
}
