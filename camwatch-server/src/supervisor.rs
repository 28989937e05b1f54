use camwatch::manager::DeviceManager;
use camwatch::sync::Teardown;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 周期性地重新扫描相机，第一次扫描立即执行
pub fn spawn_supervisor(manager: DeviceManager, every: Duration, shutdown: Teardown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?every, "discovery supervisor started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.fired() => break,
                _ = manager.closed() => break,
                _ = ticker.tick() => {}
            }

            match manager.check_system_cameras().await {
                Ok(report) => debug!(
                    started = report.started.len(),
                    running = report.running.len(),
                    failed = report.failed.len(),
                    "discovery pass finished"
                ),
                Err(camwatch::Error::ManagerClosed) => break,
                // 已在 manager 中记录
                Err(e) => warn!("discovery pass incomplete: {}", e),
            }
        }

        debug!("discovery supervisor stopped");
    })
}
