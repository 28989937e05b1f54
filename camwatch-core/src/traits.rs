use crate::builder::CameraConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::pixel_format::PixelFormat;
use crate::source::CameraSource;
use async_trait::async_trait;

/// 设备基本信息
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// 对用户友好的显示名称 (e.g. "Logitech C920")
    pub name: String,

    /// 设备来源，用于 Driver::open 的参数
    pub source: CameraSource,

    /// 后端类型标识 (e.g. "V4L2", "Simulation")
    pub backend: String,

    /// 硬件总线信息 (可选，e.g. "usb-0000:00:14.0-1")
    pub bus_info: Option<String>,
}

/// 打开设备后协商得到的实际参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: PixelFormat,
}

/// 1. 驱动入口：设备枚举与打开
#[async_trait]
pub trait Driver: Send + Sync {
    /// 后端名称，用于日志
    fn name(&self) -> &'static str;

    /// 扫描本机设备。平台不支持枚举时返回 `CameraError::Unsupported`
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// 打开设备并协商格式；返回的 Stream 独占硬件句柄，Drop 时释放
    async fn open(&self, source: &CameraSource, config: &CameraConfig) -> Result<Box<dyn Stream>>;
}

/// 2. 数据面：流式获取
/// 必须是 Send，以便在 Tokio 任务中运行
#[async_trait]
pub trait Stream: Send {
    /// 协商后的实际格式
    fn info(&self) -> StreamInfo;

    /// 启动采集 (Alloc buffers, Start DMA)
    async fn start(&mut self) -> Result<()>;

    /// 停止采集 (Release bandwidth)
    async fn stop(&mut self) -> Result<()>;

    /// 获取下一帧
    /// 注意：这里返回的 Frame 生命周期绑定到 self (Stream)
    async fn next_frame(&mut self) -> Result<Frame<'_>>;

    /// `next_frame` 是否会阻塞当前线程 (例如 V4L2 的 DQBUF)
    ///
    /// 返回 true 的流不能直接在异步 worker 上 poll，调用方需要把它放到专用线程上读帧。
    fn is_blocking(&self) -> bool {
        false
    }
}

// 为 Box<T> 实现 Stream，这样 Box<dyn Stream> 也能被当做 Stream 使用
#[async_trait]
impl<S: Stream + ?Sized + Send> Stream for Box<S> {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    async fn start(&mut self) -> Result<()> {
        (**self).start().await
    }

    async fn stop(&mut self) -> Result<()> {
        (**self).stop().await
    }

    async fn next_frame(&mut self) -> Result<Frame<'_>> {
        (**self).next_frame().await
    }

    fn is_blocking(&self) -> bool {
        (**self).is_blocking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Timestamp;
    use crate::pixel_format::FourCC;

    struct Counter {
        data: Vec<u8>,
        sequence: u64,
    }

    #[async_trait]
    impl Stream for Counter {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                width: 2,
                height: 1,
                fps: 30.0,
                format: FourCC::BGR3.into(),
            }
        }

        async fn start(&mut self) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Frame<'_>> {
            self.sequence += 1;
            self.data.fill(self.sequence as u8);
            Ok(Frame {
                data: &self.data,
                width: 2,
                height: 1,
                stride: 6,
                format: FourCC::BGR3.into(),
                sequence: self.sequence,
                timestamp: Timestamp::now(0),
            })
        }
    }

    #[tokio::test]
    async fn boxed_stream_forwards_calls() -> anyhow::Result<()> {
        let mut stream: Box<dyn Stream> = Box::new(Counter {
            data: vec![0; 6],
            sequence: 0,
        });
        stream.start().await?;

        let first = stream.next_frame().await?;
        assert_eq!(first.sequence, 1);
        let second = stream.next_frame().await?;
        assert_eq!(second.data, &[2u8; 6][..]);
        assert_eq!(stream.info().format, FourCC::BGR3);
        assert!(!stream.is_blocking());
        Ok(())
    }
}
