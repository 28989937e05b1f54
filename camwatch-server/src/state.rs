use crate::auth::{StaticToken, TokenValidator};
use crate::config::Config;
use crate::streaming::ViewerGauge;
use camwatch::manager::DeviceManager;
use camwatch::sync::Teardown;
use std::sync::Arc;

/// 所有 handler 共享的状态
#[derive(Clone)]
pub struct AppState {
    pub manager: DeviceManager,
    /// None 表示不鉴权
    pub validator: Option<Arc<dyn TokenValidator>>,
    pub fps_limit: u32,
    /// 服务器关闭信号，每个观看会话持有它的子信号
    pub shutdown: Teardown,
    pub viewers: ViewerGauge,
}

impl AppState {
    pub fn new(manager: DeviceManager, config: &Config, shutdown: Teardown) -> Self {
        let validator = config
            .auth
            .token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| Arc::new(StaticToken::new(t.as_str())) as Arc<dyn TokenValidator>);

        Self {
            manager,
            validator,
            fps_limit: config.streaming.fps_limit.max(1),
            shutdown,
            viewers: ViewerGauge::default(),
        }
    }
}
