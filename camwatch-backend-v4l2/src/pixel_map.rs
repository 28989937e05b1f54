use camwatch_core::pixel_format::{FourCC, PixelFormat};
use v4l::format::fourcc::FourCC as V4lFourCC;

/// 将 v4l crate 的 FourCC 转换为 camwatch-core 的 PixelFormat
pub fn from_v4l_fourcc(cc: V4lFourCC) -> PixelFormat {
    // 提取 u32 原始值
    let code: u32 = cc.into();

    match PixelFormat::from(code) {
        PixelFormat::Unknown(code) => {
            tracing::debug!(target: "camwatch::v4l2", "Unsupported V4L2 pixel format: {}", FourCC(code));
            PixelFormat::Unknown(code)
        }
        known => known,
    }
}

/// 将 camwatch-core 的格式转换为 v4l 的 FourCC
/// 用于请求设备设置格式
pub fn to_v4l_fourcc(fmt: PixelFormat) -> Option<V4lFourCC> {
    match fmt {
        PixelFormat::Known(cc) => Some(V4lFourCC::new(&cc.0.to_le_bytes())),
        PixelFormat::Unknown(_) => None, // 无法主动请求未知的格式
    }
}
