use camwatch_core::prelude::*;
use camwatch_simulation::{ReadFailures, Scene, SimDevice, SimDriver};

#[test]
fn enumerates_only_local_devices() -> anyhow::Result<()> {
    let driver = SimDriver::new()
        .with_device(SimDevice::local(0))
        .with_device(SimDevice::stream("http://cam.local/stream"));

    let devices = driver.list_devices()?;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].source, CameraSource::Device(0));
    assert_eq!(devices[0].backend, "Simulation");
    Ok(())
}

#[test]
fn enumeration_can_be_disabled() {
    let driver = SimDriver::new().without_enumeration();
    assert!(matches!(
        driver.list_devices(),
        Err(CameraError::Unsupported(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn moving_block_frames_differ() -> anyhow::Result<()> {
    let driver = SimDriver::new().with_device(
        SimDevice::local(1)
            .size(64, 48)
            .scene(Scene::MovingBlock { size: 8, step: 4 }),
    );
    let mut stream = driver.open(&CameraSource::Device(1), &CameraConfig::new()).await?;
    stream.start().await?;

    let first = stream.next_frame().await?.data.to_vec();
    let second = stream.next_frame().await?;
    assert_eq!(second.sequence, 2);
    assert_eq!(second.format, FourCC::BGR3);
    assert_ne!(first, second.data);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn read_failures_and_release_are_counted() -> anyhow::Result<()> {
    let driver = SimDriver::new()
        .with_device(SimDevice::local(0).fail_reads(ReadFailures::AfterFrames(1)));
    let stats = driver.stats();

    let mut stream = driver.open(&CameraSource::Device(0), &CameraConfig::new()).await?;
    stream.start().await?;
    assert!(stream.next_frame().await.is_ok());
    assert!(stream.next_frame().await.is_err());
    assert_eq!(stats.failed_reads(), 1);

    drop(stream);
    assert_eq!(stats.opens(), 1);
    assert_eq!(stats.releases(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn open_failures_and_unplug() -> anyhow::Result<()> {
    let driver = SimDriver::new()
        .with_device(SimDevice::local(0).fail_open())
        .with_device(SimDevice::local(1));

    assert!(driver.open(&CameraSource::Device(0), &CameraConfig::new()).await.is_err());
    assert!(driver.open(&CameraSource::Device(9), &CameraConfig::new()).await.is_err());

    let mut stream = driver.open(&CameraSource::Device(1), &CameraConfig::new()).await?;
    stream.start().await?;
    assert!(stream.next_frame().await.is_ok());

    driver.unplug(&CameraSource::Device(1));
    assert!(stream.next_frame().await.is_err());
    assert_eq!(driver.list_devices()?.len(), 1);
    Ok(())
}
