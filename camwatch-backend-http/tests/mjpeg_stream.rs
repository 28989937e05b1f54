use camwatch_backend_http::HttpDriver;
use camwatch_core::prelude::*;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let pixels = vec![shade; (width * height * 3) as usize];
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 80)
        .encode(&pixels, width, height, ColorType::Rgb8)
        .unwrap();
    out
}

/// 一个最小的 mjpg-streamer：回应任意请求，推送 `frames` 张 JPEG 后断开
async fn serve_mjpeg(frames: usize) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await.unwrap();

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
                  Connection: close\r\n\r\n",
            )
            .await
            .unwrap();

        for i in 0..frames {
            let body = jpeg(48, 32, 40 * i as u8);
            let header = format!(
                "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
        }
        socket.shutdown().await.unwrap();
    });

    Ok(format!("http://{addr}/stream"))
}

#[tokio::test]
async fn reads_frames_until_the_peer_hangs_up() -> anyhow::Result<()> {
    let url = serve_mjpeg(3).await?;
    let driver = HttpDriver::new();

    let mut stream = driver
        .open(&CameraSource::Url(url), &CameraConfig::new().fps(10, Priority::Low))
        .await?;
    let info = stream.info();
    assert_eq!((info.width, info.height), (48, 32));
    assert_eq!(info.format, FourCC::MJPEG);
    assert_eq!(info.fps, 10.0);

    stream.start().await?;
    for expected in 1..=3 {
        let frame = stream.next_frame().await?;
        assert_eq!(frame.sequence, expected);
        assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame.data[frame.data.len() - 2..], &[0xFF, 0xD9]);
    }

    assert!(matches!(
        stream.next_frame().await,
        Err(CameraError::Disconnected(_))
    ));
    Ok(())
}

#[tokio::test]
async fn refuses_local_devices_and_dead_endpoints() {
    let driver = HttpDriver::new();
    assert!(matches!(
        driver.open(&CameraSource::Device(0), &CameraConfig::new()).await,
        Err(CameraError::Unsupported(_))
    ));

    // 端口 9 (discard) 上通常没有 HTTP 服务
    let dead = CameraSource::Url("http://127.0.0.1:9/stream".into());
    assert!(driver.open(&dead, &CameraConfig::new()).await.is_err());
    assert!(driver.list_devices().unwrap().is_empty());
}
