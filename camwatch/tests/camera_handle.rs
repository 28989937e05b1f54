use camwatch::camera::{CameraHandle, CaptureSettings, MAX_READ_RETRIES, RETRY_BACKOFF};
use camwatch::error::Error;
use camwatch::sync::Teardown;
use camwatch_core::source::CameraSource;
use camwatch_simulation::{ReadFailures, Scene, SimDevice, SimDriver};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

fn settings() -> Arc<CaptureSettings> {
    Arc::new(CaptureSettings {
        overlay: None,
        ..CaptureSettings::default()
    })
}

fn handle_for(index: u32, root: &Teardown) -> Arc<CameraHandle> {
    Arc::new(CameraHandle::new(CameraSource::Device(index), settings(), root))
}

#[tokio::test(start_paused = true)]
async fn capture_yields_jpeg_frames() {
    let driver = SimDriver::new().with_device(SimDevice::local(0));
    let root = Teardown::new();
    let handle = handle_for(0, &root);

    let info = handle.start(&driver).await.unwrap();
    assert_eq!((info.width, info.height), (320, 240));
    assert_eq!(handle.info(), Some(&info));

    let jpeg = handle.capture(&Teardown::new()).await.unwrap().expect("a frame");
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    handle.close().await;
    assert_eq!(driver.stats().opens(), 1);
    assert_eq!(driver.stats().releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected() {
    let driver = SimDriver::new().with_device(SimDevice::local(0));
    let root = Teardown::new();
    let handle = handle_for(0, &root);

    handle.start(&driver).await.unwrap();
    assert!(matches!(handle.start(&driver).await, Err(Error::Conflict { .. })));
    handle.close().await;
    assert!(matches!(handle.start(&driver).await, Err(Error::Conflict { .. })));
    assert_eq!(driver.stats().opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_open_leaves_handle_reusable() {
    let driver = SimDriver::new().with_device(SimDevice::local(0).fail_open());
    let root = Teardown::new();
    let handle = handle_for(0, &root);

    assert!(handle.start(&driver).await.is_err());
    assert!(!handle.is_started());

    driver.plug(SimDevice::local(0));
    handle.start(&driver).await.unwrap();
    handle.close().await;
    assert_eq!(driver.stats().releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_close_releases_once() {
    let driver = SimDriver::new().with_device(SimDevice::local(0));
    let root = Teardown::new();
    let handle = handle_for(0, &root);
    handle.start(&driver).await.unwrap();

    let (a, b) = (handle.clone(), handle.clone());
    let first = tokio::spawn(async move { a.close().await });
    let second = tokio::spawn(async move { b.close().await });
    handle.close().await;
    first.await.unwrap();
    second.await.unwrap();

    assert!(handle.is_closed());
    assert_eq!(driver.stats().releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_bounded_retries() {
    let driver = SimDriver::new().with_device(SimDevice::local(0).fail_reads(ReadFailures::Always));
    let root = Teardown::new();
    let handle = handle_for(0, &root);

    let started = Instant::now();
    handle.start(&driver).await.unwrap();
    timeout(Duration::from_secs(60), handle.closed())
        .await
        .expect("capture must give up on its own");

    assert_eq!(driver.stats().failed_reads(), u64::from(MAX_READ_RETRIES));
    assert!(started.elapsed() >= RETRY_BACKOFF * (MAX_READ_RETRIES - 1));

    handle.close().await;
    assert_eq!(driver.stats().releases(), 1);
    assert!(!root.is_fired());
}

#[tokio::test(start_paused = true)]
async fn capture_ends_cleanly_after_teardown() {
    let driver = SimDriver::new().with_device(SimDevice::local(0));
    let root = Teardown::new();
    let handle = handle_for(0, &root);
    handle.start(&driver).await.unwrap();

    let cancel = Teardown::new();
    cancel.fire();
    assert!(handle.capture(&cancel).await.unwrap().is_none());

    handle.close().await;
    assert!(handle.capture(&Teardown::new()).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn parent_shutdown_stops_capture() {
    let driver = SimDriver::new().with_device(SimDevice::local(0));
    let root = Teardown::new();
    let handle = handle_for(0, &root);
    handle.start(&driver).await.unwrap();

    root.fire();
    timeout(Duration::from_secs(5), handle.closed()).await.unwrap();
    handle.close().await;
    assert_eq!(driver.stats().releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_consumer_only_sees_latest_frame() {
    let driver = SimDriver::new().with_device(SimDevice::local(0).fps(30));
    let root = Teardown::new();
    let handle = handle_for(0, &root);
    handle.start(&driver).await.unwrap();

    let cancel = Teardown::new();
    let mut frames = handle.subscribe();
    let first = frames.next(&cancel).await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let next = frames.next(&cancel).await.unwrap();
    assert!(
        next.sequence > first.sequence + 1,
        "expected to skip stale frames: {} -> {}",
        first.sequence,
        next.sequence
    );

    handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn recording_requires_running_camera() {
    let dir = tempfile::tempdir().unwrap();
    let root = Teardown::new();
    let handle = handle_for(0, &root);

    let result = handle
        .record_video(dir.path().join("idle.mjpeg"), false, &Teardown::new())
        .await;
    assert!(matches!(result, Err(Error::NotRunning(_))));
}

async fn record_for(scene: Scene, motion_only: bool, path: std::path::PathBuf) -> (u64, u64) {
    let driver = SimDriver::new().with_device(SimDevice::local(0).scene(scene));
    let root = Teardown::new();
    let handle = handle_for(0, &root);
    handle.start(&driver).await.unwrap();

    let cancel = Teardown::new();
    let recording = {
        let handle = handle.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { handle.record_video(path, motion_only, &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.fire();
    let summary = recording.await.unwrap().unwrap();
    handle.close().await;
    (summary.frames_seen, summary.frames_written)
}

#[tokio::test(start_paused = true)]
async fn motion_filter_skips_still_scene() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.mjpeg");

    let (seen, written) = record_for(Scene::Static, true, path.clone()).await;
    assert!(seen > 0);
    assert_eq!(written, 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn motion_filter_keeps_moving_scene() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("moving.mjpeg");

    let scene = Scene::MovingBlock { size: 64, step: 8 };
    let (seen, written) = record_for(scene, true, path.clone()).await;
    assert!(written > 0);
    assert!(written <= seen);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[tokio::test(start_paused = true)]
async fn unfiltered_recording_writes_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, written) = record_for(Scene::Static, false, dir.path().join("all.mjpeg")).await;
    assert!(seen > 0);
    assert_eq!(seen, written);
}
