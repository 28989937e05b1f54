//! 仿真后端：不依赖硬件的相机驱动
//!
//! 用于测试与演示。每个 [`SimDevice`] 可以配置画面内容 (静止/移动方块)、
//! 打开失败、读帧失败以及"拔出"，[`SimStats`] 记录打开/释放次数，
//! 方便断言硬件句柄只被释放一次。

use async_trait::async_trait;
use camwatch_core::prelude::*;
use camwatch_core::frame::Timestamp;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// 画面内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    /// 固定的灰度渐变，没有任何运动
    Static,
    /// 一个白色方块每帧水平移动 `step` 像素
    MovingBlock { size: u32, step: u32 },
}

/// 读帧失败注入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailures {
    Never,
    /// 成功输出 n 帧之后每次读取都失败
    AfterFrames(u64),
    Always,
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub source: CameraSource,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub scene: Scene,
    pub open_fails: bool,
    pub failures: ReadFailures,
    unplugged: Arc<AtomicBool>,
}

impl SimDevice {
    /// 本机设备 `/dev/video{index}`
    pub fn local(index: u32) -> Self {
        Self::new(CameraSource::Device(index), format!("Simulated Camera {index}"))
    }

    /// 网络流设备，只能通过配置的 URL 打开，不会出现在枚举结果中
    pub fn stream(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = format!("Simulated Stream {url}");
        Self::new(CameraSource::Url(url), name)
    }

    fn new(source: CameraSource, name: String) -> Self {
        Self {
            source,
            name,
            width: 320,
            height: 240,
            fps: 30,
            scene: Scene::Static,
            open_fails: false,
            failures: ReadFailures::Never,
            unplugged: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn scene(mut self, scene: Scene) -> Self {
        self.scene = scene;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.open_fails = true;
        self
    }

    pub fn fail_reads(mut self, failures: ReadFailures) -> Self {
        self.failures = failures;
        self
    }
}

/// 全局计数器，所有设备共享
#[derive(Debug, Default)]
pub struct SimStats {
    opens: AtomicU64,
    releases: AtomicU64,
    frames: AtomicU64,
    failed_reads: AtomicU64,
}

impl SimStats {
    /// 成功打开的次数
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// 硬件句柄被释放 (Stream Drop) 的次数
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    /// 已经生成的帧数，同时也是最新一帧的序号
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn failed_reads(&self) -> u64 {
        self.failed_reads.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct SimDriver {
    devices: Mutex<Vec<SimDevice>>,
    enumeration_fails: AtomicBool,
    stats: Arc<SimStats>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: SimDevice) -> Self {
        self.plug(device);
        self
    }

    /// 模拟不支持设备枚举的平台
    pub fn without_enumeration(self) -> Self {
        self.enumeration_fails.store(true, Ordering::SeqCst);
        self
    }

    /// 接入一个设备 (已存在同一来源时替换)
    pub fn plug(&self, device: SimDevice) {
        let mut devices = self.devices();
        devices.retain(|d| d.source != device.source);
        devices.push(device);
    }

    /// 拔出设备：从枚举结果中移除，已打开的流随后读帧失败
    pub fn unplug(&self, source: &CameraSource) {
        let mut devices = self.devices();
        if let Some(pos) = devices.iter().position(|d| &d.source == source) {
            let device = devices.remove(pos);
            device.unplugged.store(true, Ordering::SeqCst);
            info!(source = %source, "simulated device unplugged");
        }
    }

    pub fn stats(&self) -> Arc<SimStats> {
        self.stats.clone()
    }

    fn devices(&self) -> MutexGuard<'_, Vec<SimDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Driver for SimDriver {
    fn name(&self) -> &'static str {
        "Simulation"
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        if self.enumeration_fails.load(Ordering::SeqCst) {
            return Err(CameraError::Unsupported(
                "device enumeration is not available".into(),
            ));
        }

        Ok(self
            .devices()
            .iter()
            .filter(|d| d.source.is_local())
            .map(|d| DeviceInfo {
                name: d.name.clone(),
                source: d.source.clone(),
                backend: "Simulation".into(),
                bus_info: None,
            })
            .collect())
    }

    async fn open(&self, source: &CameraSource, _config: &CameraConfig) -> Result<Box<dyn Stream>> {
        let device = self
            .devices()
            .iter()
            .find(|d| &d.source == source)
            .cloned()
            .ok_or_else(|| CameraError::OpenFailed {
                target: source.to_string(),
                reason: "no such device".into(),
            })?;

        if device.open_fails {
            return Err(CameraError::OpenFailed {
                target: source.to_string(),
                reason: "simulated open failure".into(),
            });
        }

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        debug!(source = %source, "simulated device opened");

        let frame_len = (device.width * device.height * 3) as usize;
        Ok(Box::new(SimStream {
            interval: Duration::from_secs(1) / device.fps,
            buffer: vec![0; frame_len],
            device,
            sequence: 0,
            delivered: 0,
            started: false,
            stats: self.stats.clone(),
        }))
    }
}

struct SimStream {
    device: SimDevice,
    buffer: Vec<u8>,
    interval: Duration,
    sequence: u64,
    delivered: u64,
    started: bool,
    stats: Arc<SimStats>,
}

impl SimStream {
    fn should_fail(&self) -> bool {
        if self.device.unplugged.load(Ordering::SeqCst) {
            return true;
        }
        match self.device.failures {
            ReadFailures::Never => false,
            ReadFailures::AfterFrames(n) => self.delivered >= n,
            ReadFailures::Always => true,
        }
    }

    fn render(&mut self) {
        let (w, h) = (self.device.width as usize, self.device.height as usize);
        match self.device.scene {
            Scene::Static => {
                for y in 0..h {
                    for x in 0..w {
                        let v = ((x + y) % 200) as u8 + 20;
                        let i = (y * w + x) * 3;
                        self.buffer[i..i + 3].fill(v);
                    }
                }
            }
            Scene::MovingBlock { size, step } => {
                let size = (size as usize).min(w).min(h);
                let span = (w - size).max(1);
                let left = (self.sequence as usize * step as usize) % span;
                let top = (h - size) / 2;
                self.buffer.fill(40);
                for y in top..top + size {
                    let row = (y * w + left) * 3;
                    self.buffer[row..row + size * 3].fill(255);
                }
            }
        }
    }
}

#[async_trait]
impl Stream for SimStream {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.device.width,
            height: self.device.height,
            fps: self.device.fps as f64,
            format: FourCC::BGR3.into(),
        }
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
            return Err(CameraError::SimulationError("stream is not started".into()));
        }

        // 按帧率节拍出帧 (测试中配合 tokio 的暂停时钟)
        tokio::time::sleep(self.interval).await;

        if self.should_fail() {
            self.stats.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(CameraError::Disconnected(format!(
                "{} stopped delivering frames",
                self.device.source
            )));
        }

        self.sequence += 1;
        self.delivered += 1;
        self.render();
        self.stats.frames.fetch_add(1, Ordering::SeqCst);

        Ok(Frame {
            data: &self.buffer,
            width: self.device.width,
            height: self.device.height,
            stride: self.device.width as usize * 3,
            format: FourCC::BGR3.into(),
            sequence: self.sequence,
            timestamp: Timestamp::now(0),
        })
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        debug!(source = %self.device.source, "simulated device released");
    }
}
