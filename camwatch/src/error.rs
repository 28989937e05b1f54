use camwatch_core::error::CameraError;
use camwatch_core::source::CameraIdentity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Camera {0} not found")]
    NotFound(CameraIdentity),

    /// Removed 是终态，任何试图复活它的操作都会得到这个错误
    #[error("Camera {0} has been removed")]
    Removed(CameraIdentity),

    #[error("Camera {id}: {reason}")]
    Conflict { id: CameraIdentity, reason: String },

    #[error("Camera {0} is not running")]
    NotRunning(CameraIdentity),

    #[error("Device manager is closed")]
    ManagerClosed,

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Camera store error: {0}")]
    Store(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
