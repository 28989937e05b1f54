//! camwatch 服务端：WebSocket 实时画面、相机列表、定时发现与自动录像

pub mod auth;
pub mod config;
pub mod error;
pub mod recording;
pub mod routes;
pub mod state;
pub mod streaming;
pub mod supervisor;

pub use config::Config;
pub use routes::router;
pub use state::AppState;
