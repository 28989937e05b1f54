use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Failed to open {target}: {reason}")]
    OpenFailed { target: String, reason: String },

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("Device busy: Exclusive access required")]
    DeviceBusy,

    #[error("Format negotiation failed: No hardware support for requested constraints")]
    FormatNotSupported,

    /// 当前平台或后端不支持该操作 (例如 macOS 上的设备枚举)
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Simulation backend error: {0}")]
    SimulationError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CameraError>;
