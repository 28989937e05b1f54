pub mod backend;

use crate::core::mat::Mat;
use crate::error::{Error, Result};
use crate::imgcodecs::{self, DEFAULT_JPEG_QUALITY};
use camwatch_core::error::CameraError;
use camwatch_core::pixel_format::FourCC;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// OpenCV 风格的视频写入器
///
/// 目前只支持 MJPG：输出文件是逐帧 JPEG 直接拼接的 Motion-JPEG 流，
/// ffmpeg / VLC 可以直接播放 (`-f mjpeg`)。
/// 文件在 `release()` 或 Drop 时关闭。
#[derive(Debug)]
pub struct VideoWriter {
    out: Option<BufWriter<File>>,
    path: PathBuf,
    fourcc: FourCC,
    fps: f64,
    size: (u32, u32),
    quality: u8,
    frames: u64,
}

impl VideoWriter {
    pub fn create<P: AsRef<Path>>(path: P, fourcc: FourCC, fps: f64, size: (u32, u32)) -> Result<Self> {
        if fourcc != FourCC::MJPEG {
            return Err(CameraError::FormatNotSupported.into());
        }
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::Codec(format!("invalid frame size {}x{}", size.0, size.1)));
        }

        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(&path)?;
        debug!(path = %path.display(), %fourcc, fps, "video writer opened");

        Ok(Self {
            out: Some(BufWriter::new(file)),
            path,
            fourcc,
            fps,
            size,
            quality: DEFAULT_JPEG_QUALITY,
            frames: 0,
        })
    }

    pub fn is_opened(&self) -> bool {
        self.out.is_some()
    }

    /// 追加一帧，尺寸必须与创建时一致
    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        if frame.size() != self.size {
            return Err(Error::Codec(format!(
                "frame size {:?} does not match writer size {:?}",
                frame.size(),
                self.size
            )));
        }
        if self.out.is_none() {
            return Err(Error::Codec("video writer is released".into()));
        }

        let jpeg = imgcodecs::imencode_jpeg(frame, self.quality)?;
        self.write_jpeg(&jpeg)
    }

    /// 追加一帧已经编码好的 JPEG，调用方负责尺寸一致
    pub fn write_jpeg(&mut self, jpeg: &[u8]) -> Result<()> {
        if !jpeg.starts_with(&[0xFF, 0xD8]) {
            return Err(Error::Codec("frame is not a JPEG image".into()));
        }
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| Error::Codec("video writer is released".into()))?;

        out.write_all(jpeg)?;
        self.frames += 1;
        Ok(())
    }

    /// 刷新并关闭文件，可以重复调用
    pub fn release(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
            debug!(path = %self.path.display(), frames = self.frames, "video writer released");
        }
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn fourcc(&self) -> FourCC {
        self.fourcc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), "failed to flush video file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_concatenated_jpeg_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips/out.mjpeg");
        let frame = Mat::new(24, 32, 3);

        let mut writer = VideoWriter::create(&path, FourCC::MJPEG, 15.0, (32, 24)).unwrap();
        writer.write(&frame).unwrap();
        writer.write(&frame).unwrap();
        assert!(writer.write(&Mat::new(10, 10, 3)).is_err());
        writer.release().unwrap();
        writer.release().unwrap();
        assert!(!writer.is_opened());
        assert!(writer.write(&frame).is_err());

        let bytes = std::fs::read(&path).unwrap();
        let starts = bytes.windows(3).filter(|w| **w == [0xFF, 0xD8, 0xFF]).count();
        assert_eq!(starts, 2);
        assert_eq!(writer.frames_written(), 2);
    }

    #[test]
    fn encoded_frames_are_appended_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.mjpeg");
        let jpeg = imgcodecs::imencode_jpeg(&Mat::new(24, 32, 3), 70).unwrap();

        let mut writer = VideoWriter::create(&path, FourCC::MJPEG, 10.0, (32, 24)).unwrap();
        writer.write_jpeg(&jpeg).unwrap();
        assert!(writer.write_jpeg(b"not a jpeg").is_err());
        writer.release().unwrap();
        assert!(writer.write_jpeg(&jpeg).is_err());

        assert_eq!(std::fs::read(&path).unwrap(), jpeg);
        assert_eq!(writer.frames_written(), 1);
    }

    #[test]
    fn only_mjpeg_is_supported() {
        let dir = tempfile::tempdir().unwrap();
        let err = VideoWriter::create(dir.path().join("a.avi"), FourCC::H264, 15.0, (32, 24));
        assert!(matches!(err, Err(Error::Camera(CameraError::FormatNotSupported))));
    }
}
