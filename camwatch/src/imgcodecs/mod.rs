use crate::core::mat::Mat;
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

/// 实时流和录像使用的 JPEG 质量
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// 把 BGR (或单通道灰度) Mat 编码为 JPEG
pub fn imencode_jpeg(mat: &Mat, quality: u8) -> Result<Vec<u8>> {
    if mat.is_empty() {
        return Err(Error::Codec("cannot encode an empty image".into()));
    }

    // 1. 整理为 image crate 需要的连续数据 (BGR -> RGB)
    let (pixels, color) = match mat.channels {
        1 => (mat.to_packed(), ColorType::L8),
        3 => {
            let mut rgb = Vec::with_capacity((mat.rows * mat.cols) as usize * 3);
            for r in 0..mat.rows {
                for px in mat.row_bytes(r).chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            (rgb, ColorType::Rgb8)
        }
        n => return Err(Error::Codec(format!("unsupported channel count {n}"))),
    };

    // 2. 编码
    let mut out = Vec::with_capacity(pixels.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        &pixels,
        mat.cols as u32,
        mat.rows as u32,
        color,
    )?;
    Ok(out)
}

/// 解码内存中的图像 (MJPEG 帧等)，强制转换为 BGR 以匹配 OpenCV 默认行为。
pub fn imdecode(buf: &[u8]) -> Result<Mat> {
    let rgb = image::load_from_memory(buf)?.to_rgb8();
    let (width, height) = (rgb.width() as i32, rgb.height() as i32);

    let mut bgr = rgb.into_raw();
    for px in bgr.chunks_exact_mut(3) {
        px.swap(0, 2);
    }

    Mat::from_packed(height, width, 3, bgr)
        .ok_or_else(|| Error::Codec("decoded image has an unexpected size".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_bgr() {
        let mut mat = Mat::new(16, 24, 3);
        for px in mat.data.chunks_exact_mut(3) {
            px.copy_from_slice(&[200, 10, 10]); // 蓝色
        }

        let jpeg = imencode_jpeg(&mat, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = imdecode(&jpeg).unwrap();
        assert_eq!(decoded.size(), (24, 16));
        let px = &decoded.row_bytes(8)[36..39];
        assert!(px[0] > 150 && px[2] < 60, "unexpected pixel {px:?}");
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(imencode_jpeg(&Mat::empty(), 75).is_err());
        assert!(imdecode(b"not a jpeg").is_err());
    }
}
