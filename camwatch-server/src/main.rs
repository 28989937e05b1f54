use anyhow::Context;
use camwatch::manager::{DeviceManager, JsonFileStore};
use camwatch::sync::Teardown;
use camwatch::videoio::backend::{create_driver, BackendType};
use camwatch_server::{recording, supervisor, AppState, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "camwatch-server", version, about = "Camera live view and motion recording service")]
struct Args {
    /// 配置文件路径，不存在时生成默认配置
    #[arg(short, long, default_value = "camwatch.toml")]
    config: PathBuf,

    /// 使用仿真相机 (忽略配置中的 backend)
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camwatch=info,camwatch_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting camwatch-server v{}", env!("CARGO_PKG_VERSION"));

    // 1. 配置
    let config = Config::load_or_create(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    let backend = if args.simulate {
        BackendType::Simulation
    } else {
        config.discovery.backend
    };
    tracing::info!(
        addr = %config.api.addr(),
        backend = ?backend,
        streams = config.streams.len(),
        auth = config.auth.token.is_some(),
        "Configuration loaded"
    );

    // 2. 相机管理
    let driver = create_driver(backend).context("failed to create camera backend")?;
    let store = JsonFileStore::open(config.storage.camera_store())
        .context("failed to open camera store")?;
    let manager = DeviceManager::spawn(driver, Arc::new(store), config.manager_config()?)
        .context("failed to start device manager")?;

    // 3. 后台任务
    let shutdown = Teardown::new();
    if config.recording.enabled {
        recording::spawn_recorder(&manager, config.recording.clone(), shutdown.clone())
            .await
            .context("failed to start recording scheduler")?;
    }
    supervisor::spawn_supervisor(manager.clone(), config.discovery.interval(), shutdown.clone());

    // 4. HTTP 服务
    let app = camwatch_server::router(AppState::new(manager.clone(), &config, shutdown.clone()));
    let listener = tokio::net::TcpListener::bind(config.api.addr())
        .await
        .with_context(|| format!("failed to bind {}", config.api.addr()))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            signal.fire();
        })
        .await?;

    // 5. 释放所有相机
    manager.close().await?;
    tracing::info!("camwatch-server stopped");
    Ok(())
}
