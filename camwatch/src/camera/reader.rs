use async_trait::async_trait;
use camwatch_core::error::{CameraError, Result};
use camwatch_core::frame::{Frame, Timestamp};
use camwatch_core::pixel_format::PixelFormat;
use camwatch_core::source::CameraIdentity;
use camwatch_core::traits::{Stream, StreamInfo};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// 从驱动缓冲区拷贝出来的一帧
struct OwnedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    sequence: u64,
    timestamp: Timestamp,
}

impl OwnedFrame {
    fn copy_from(frame: &Frame<'_>) -> Self {
        Self {
            data: frame.data.to_vec(),
            width: frame.width,
            height: frame.height,
            stride: frame.stride,
            format: frame.format,
            sequence: frame.sequence,
            timestamp: frame.timestamp,
        }
    }

    fn as_frame(&self) -> Frame<'_> {
        Frame {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }
}

/// 在专用线程上读帧的阻塞式流
///
/// 线程独占底层流，读到的帧拷贝后经容量为 1 的通道交给采集任务。
/// 采集任务只在通道上等待，所以 teardown 随时可以打断它，异步 worker 也不会被占住。
pub(crate) struct ThreadedStream {
    info: StreamInfo,
    frames: mpsc::Receiver<Result<OwnedFrame>>,
    stop: Arc<AtomicBool>,
    stopped: Option<oneshot::Receiver<()>>,
    current: Option<OwnedFrame>,
}

impl ThreadedStream {
    /// 把已经启动的流移交给读帧线程
    pub(crate) fn spawn(identity: &CameraIdentity, mut stream: Box<dyn Stream>) -> io::Result<Self> {
        let info = stream.info();
        let (tx, frames) = mpsc::channel(1);
        let (done, stopped) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let camera = identity.clone();

        thread::Builder::new()
            .name(format!("camwatch-cap-{identity}"))
            .spawn(move || {
                // 1. 读帧直到被要求停止，或者采集任务不再接收
                while !flag.load(Ordering::Acquire) {
                    let next = futures::executor::block_on(stream.next_frame())
                        .map(|frame| OwnedFrame::copy_from(&frame));
                    if tx.blocking_send(next).is_err() {
                        break;
                    }
                }

                // 2. 在本线程上停止并释放硬件
                if let Err(e) = futures::executor::block_on(stream.stop()) {
                    debug!(camera = %camera, "stream stop failed: {}", e);
                }
                drop(stream);
                debug!(camera = %camera, "capture reader thread exited");
                let _ = done.send(());
            })?;

        Ok(Self {
            info,
            frames,
            stop,
            stopped: Some(stopped),
            current: None,
        })
    }
}

#[async_trait]
impl Stream for ThreadedStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    // 底层流在移交之前已经启动
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// 通知线程退出并等待它释放硬件
    ///
    /// 线程可能正卡在一次读帧里，这里异步等待，不占用 worker。
    async fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        self.frames.close();
        if let Some(stopped) = self.stopped.take() {
            // 线程 panic 时发送端被丢弃，同样视为已退出
            let _ = stopped.await;
        }
        // 丢掉线程退出前已经排队的帧
        while self.frames.try_recv().is_ok() {}
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame<'_>> {
        match self.frames.recv().await {
            Some(Ok(frame)) => Ok(self.current.insert(frame).as_frame()),
            Some(Err(e)) => Err(e),
            None => Err(CameraError::Disconnected("capture reader thread exited".into())),
        }
    }
}

impl Drop for ThreadedStream {
    fn drop(&mut self) {
        // 没有走 stop() 时，线程在当前这次读帧之后自行退出
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_core::pixel_format::FourCC;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Sleepy {
        data: Vec<u8>,
        sequence: u64,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stream for Sleepy {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                width: 2,
                height: 1,
                fps: 20.0,
                format: FourCC::BGR3.into(),
            }
        }

        async fn start(&mut self) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Frame<'_>> {
            std::thread::sleep(Duration::from_millis(20));
            self.sequence += 1;
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

        fn is_blocking(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn frames_arrive_in_order_and_stop_releases_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let inner = Box::new(Sleepy {
            data: vec![7; 6],
            sequence: 0,
            stops: stops.clone(),
        });
        let mut stream = ThreadedStream::spawn(&CameraIdentity::from("0"), inner).unwrap();
        assert_eq!(stream.info().width, 2);

        let first = stream.next_frame().await.unwrap().sequence;
        let second = stream.next_frame().await.unwrap();
        assert!(second.sequence > first);
        assert_eq!(second.data, &[7u8; 6][..]);

        tokio::time::timeout(Duration::from_secs(2), stream.stop())
            .await
            .unwrap()
            .unwrap();
        stream.stop().await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(stream.next_frame().await.is_err());
    }
}
