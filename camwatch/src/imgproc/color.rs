use crate::core::mat::Mat;
use crate::error::{Error, Result};
use crate::imgcodecs;
use camwatch_core::error::CameraError;
use camwatch_core::frame::Frame;
use camwatch_core::pixel_format::FourCC;

/// 把驱动借出的帧拷贝成自有的 BGR Mat
///
/// 支持 YUYV / MJPEG / BGR3 / RGB3，其它格式返回 `FormatNotSupported`。
pub fn frame_to_bgr(frame: &Frame<'_>) -> Result<Mat> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let format = frame.format.fourcc();

    if format == FourCC::MJPEG {
        return imgcodecs::imdecode(frame.data);
    }

    let bpp = match format {
        FourCC::YUYV => 2,
        FourCC::BGR3 | FourCC::RGB3 => 3,
        _ => return Err(CameraError::FormatNotSupported.into()),
    };

    let stride = if frame.stride == 0 { w * bpp } else { frame.stride };
    if stride < w * bpp || frame.data.len() < stride * h.saturating_sub(1) + w * bpp {
        return Err(Error::Codec(format!(
            "truncated {format} frame: {} bytes for {w}x{h}",
            frame.data.len()
        )));
    }

    let mut mat = Mat::new(h as i32, w as i32, 3);
    for y in 0..h {
        let src = &frame.data[y * stride..y * stride + w * bpp];
        let dst = mat.row_bytes_mut(y as i32);
        match format {
            FourCC::YUYV => yuyv_to_bgr(src, dst),
            FourCC::BGR3 => dst.copy_from_slice(src),
            _ => {
                for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                    d.copy_from_slice(&[s[2], s[1], s[0]]);
                }
            }
        }
    }
    Ok(mat)
}

/// YUYV 4:2:2 -> BGR24 (BT.601 整数近似)
fn yuyv_to_bgr(src: &[u8], dest: &mut [u8]) {
    for (yuyv, out) in src.chunks_exact(4).zip(dest.chunks_exact_mut(6)) {
        let d = yuyv[1] as i32 - 128;
        let e = yuyv[3] as i32 - 128;

        for (k, y) in [yuyv[0], yuyv[2]].into_iter().enumerate() {
            let c = y as i32 - 16;
            out[k * 3] = clip((298 * c + 516 * d + 128) >> 8);
            out[k * 3 + 1] = clip((298 * c - 100 * d - 208 * e + 128) >> 8);
            out[k * 3 + 2] = clip((298 * c + 409 * e + 128) >> 8);
        }
    }
}

#[inline]
fn clip(val: i32) -> u8 {
    val.clamp(0, 255) as u8
}

/// BGR -> 单通道灰度 (ITU-R BT.601 权重)
pub fn bgr_to_gray(src: &Mat) -> Mat {
    if src.channels == 1 {
        return src.clone();
    }

    let mut gray = Mat::new(src.rows, src.cols, 1);
    for r in 0..src.rows {
        let row = src.row_bytes(r);
        let step = src.channels as usize;
        for (dst, px) in gray.row_bytes_mut(r).iter_mut().zip(row.chunks_exact(step)) {
            let (b, g, rr) = (px[0] as u32, px[1] as u32, px[2] as u32);
            *dst = ((29 * b + 150 * g + 77 * rr + 128) >> 8) as u8;
        }
    }
    gray
}
