use async_trait::async_trait;
use camwatch_core::builder::CameraConfig;
use camwatch_core::error::{CameraError, Result as CameraResult};
use camwatch_core::source::CameraSource;
use camwatch_core::traits::{DeviceInfo, Driver, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// 后端选择，用于配置文件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// 按平台自动选择
    #[default]
    Auto,
    V4L2,
    /// 不依赖硬件的仿真相机
    Simulation,
}

/// 创建驱动实例的工厂函数
///
/// 本机设备交给平台后端，URL 交给网络后端；两者都由同一个 [`CompositeDriver`] 对外暴露。
pub fn create_driver(backend: BackendType) -> CameraResult<Arc<dyn Driver>> {
    let local: Option<Arc<dyn Driver>> = match backend {
        BackendType::Auto | BackendType::V4L2 => platform_driver(),
        BackendType::Simulation => simulation_driver(),
    };

    if local.is_none() && backend != BackendType::Auto {
        return Err(CameraError::Unsupported(format!(
            "backend {:?} is not compiled in. Please check Cargo features.",
            backend
        )));
    }

    Ok(Arc::new(CompositeDriver::new(local, network_driver())))
}

#[cfg(all(feature = "linux-v4l2", target_os = "linux"))]
fn platform_driver() -> Option<Arc<dyn Driver>> {
    Some(camwatch_backend_v4l2::default_driver())
}

#[cfg(not(all(feature = "linux-v4l2", target_os = "linux")))]
fn platform_driver() -> Option<Arc<dyn Driver>> {
    None
}

#[cfg(feature = "simulation")]
fn simulation_driver() -> Option<Arc<dyn Driver>> {
    use camwatch_simulation::{Scene, SimDevice, SimDriver};
    let driver = SimDriver::new()
        .with_device(SimDevice::local(0).scene(Scene::MovingBlock { size: 64, step: 8 }));
    Some(Arc::new(driver))
}

#[cfg(not(feature = "simulation"))]
fn simulation_driver() -> Option<Arc<dyn Driver>> {
    None
}

#[cfg(feature = "http-streams")]
fn network_driver() -> Option<Arc<dyn Driver>> {
    Some(Arc::new(camwatch_backend_http::HttpDriver::new()))
}

#[cfg(not(feature = "http-streams"))]
fn network_driver() -> Option<Arc<dyn Driver>> {
    None
}

/// 按来源类型把请求路由到对应后端
pub struct CompositeDriver {
    local: Option<Arc<dyn Driver>>,
    network: Option<Arc<dyn Driver>>,
}

impl CompositeDriver {
    pub fn new(local: Option<Arc<dyn Driver>>, network: Option<Arc<dyn Driver>>) -> Self {
        Self { local, network }
    }

    fn route(&self, source: &CameraSource) -> CameraResult<&Arc<dyn Driver>> {
        let (driver, kind) = match source {
            CameraSource::Device(_) => (&self.local, "local devices"),
            CameraSource::Url(_) => (&self.network, "network streams"),
        };
        driver
            .as_ref()
            .ok_or_else(|| CameraError::Unsupported(format!("no backend available for {}", kind)))
    }
}

#[async_trait]
impl Driver for CompositeDriver {
    fn name(&self) -> &'static str {
        self.local.as_ref().map_or("None", |d| d.name())
    }

    fn list_devices(&self) -> CameraResult<Vec<DeviceInfo>> {
        match &self.local {
            Some(driver) => driver.list_devices(),
            None => Err(CameraError::Unsupported(
                "no local camera backend for this OS".into(),
            )),
        }
    }

    async fn open(&self, source: &CameraSource, config: &CameraConfig) -> CameraResult<Box<dyn Stream>> {
        let driver = self.route(source)?;
        debug!(source = %source, backend = driver.name(), "opening camera");
        driver.open(source, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_core::pixel_format::PixelFormat;
    use camwatch_core::traits::StreamInfo;
    use camwatch_core::frame::Frame;

    struct Named(&'static str);

    struct Idle;

    #[async_trait]
    impl Stream for Idle {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                width: 1,
                height: 1,
                fps: 1.0,
                format: PixelFormat::Unknown(0),
            }
        }
        async fn start(&mut self) -> CameraResult<()> {
            Ok(())
        }
        async fn stop(&mut self) -> CameraResult<()> {
            Ok(())
        }
        async fn next_frame(&mut self) -> CameraResult<Frame<'_>> {
            Err(CameraError::Disconnected("idle".into()))
        }
    }

    #[async_trait]
    impl Driver for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        fn list_devices(&self) -> CameraResult<Vec<DeviceInfo>> {
            Ok(vec![])
        }
        async fn open(&self, _: &CameraSource, _: &CameraConfig) -> CameraResult<Box<dyn Stream>> {
            Ok(Box::new(Idle))
        }
    }

    #[tokio::test]
    async fn routes_by_source_kind() {
        let only_local = CompositeDriver::new(Some(Arc::new(Named("local"))), None);
        let config = CameraConfig::new();

        assert!(only_local.open(&CameraSource::Device(0), &config).await.is_ok());
        let err = only_local
            .open(&CameraSource::Url("http://cam/stream".into()), &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::Unsupported(_)));
        assert_eq!(only_local.name(), "local");
    }

    #[test]
    fn enumeration_without_local_backend_is_unsupported() {
        let network_only = CompositeDriver::new(None, Some(Arc::new(Named("net"))));
        assert!(matches!(
            network_only.list_devices(),
            Err(CameraError::Unsupported(_))
        ));
    }

    #[test]
    fn backend_type_parses_lowercase() {
        let parsed: BackendType = serde_json::from_str("\"simulation\"").unwrap();
        assert_eq!(parsed, BackendType::Simulation);
    }
}
