use crate::pixel_format::PixelFormat;
use std::time::Instant;

/// 核心帧结构体
/// 使用生命周期 'a 绑定到底层 Buffer，实现零拷贝。
/// 调用方需要在下一次 `next_frame` 之前把数据拷走。
#[derive(Debug)]
pub struct Frame<'a> {
    /// 原始图像数据切片
    pub data: &'a [u8],

    /// 图像宽度 (Pixels)
    pub width: u32,

    /// 图像高度 (Pixels)
    pub height: u32,

    /// 【关键】跨距/步长 (Bytes per line)
    /// 可能大于 width * bpp；压缩格式为 0
    pub stride: usize,

    /// 像素格式 (含 MJPEG 等压缩格式)
    pub format: PixelFormat,

    /// 帧索引 (用于丢帧统计)
    pub sequence: u64,

    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    /// 硬件原始时间戳 (纳秒，来源各异，可能为 0)
    pub hw_raw_ns: u64,

    /// 帧到达用户态的单调时间
    pub arrival: Instant,
}

impl Timestamp {
    pub fn now(hw_raw_ns: u64) -> Self {
        Self {
            hw_raw_ns,
            arrival: Instant::now(),
        }
    }
}
