//! 相机句柄与每个相机的采集任务

mod capture;
mod handle;
mod reader;
mod record;
mod types;

pub use capture::{MAX_READ_RETRIES, RETRY_BACKOFF};
pub use handle::{CameraHandle, FrameReceiver};
pub use record::RecordingSummary;
pub use types::{CameraDetails, CameraSnapshot, CaptureInfo, CaptureSettings, LiveFrame, Status};
