use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::CameraError;

/// 四字符代码 (Four Character Code)，视频工业标准
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FourCC(pub u32);

impl FourCC {
    /// 从 ASCII 字符创建 FourCC
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();

        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// 配置文件里的 codec 字符串 (例如 "MJPG")，不足四位用空格补齐
impl FromStr for FourCC {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(CameraError::Unsupported(format!("invalid codec code {s:?}")));
        }
        let mut code = [b' '; 4];
        code[..bytes.len()].copy_from_slice(bytes);
        Ok(Self::new(code[0], code[1], code[2], code[3]))
    }
}

/// 常用像素格式定义
impl FourCC {
    // --- YUV Formats ---
    /// YUYV 4:2:2 - USB 摄像头最常用的未压缩格式
    pub const YUYV: Self = Self::new(b'Y', b'U', b'Y', b'V');

    // --- RGB Formats ---
    /// RGB24 (Little Endian: B-G-R)
    pub const BGR3: Self = Self::new(b'B', b'G', b'R', b'3');
    /// RGB24 (Big Endian: R-G-B)
    pub const RGB3: Self = Self::new(b'R', b'G', b'B', b'3');

    // --- Compressed Formats ---
    /// Motion-JPEG - 用于节省 USB 带宽，也是录像文件的编码
    pub const MJPEG: Self = Self::new(b'M', b'J', b'P', b'G');
    /// H.264
    pub const H264: Self = Self::new(b'H', b'2', b'6', b'4');
}

/// 像素格式的高级枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 已知的标准格式
    Known(FourCC),
    /// 驱动返回了库不认识的私有格式
    Unknown(u32),
}

impl PixelFormat {
    /// 判断是否为压缩格式 (JPEG, H264)
    pub fn is_compressed(&self) -> bool {
        match self {
            Self::Known(cc) => matches!(*cc, FourCC::MJPEG | FourCC::H264),
            _ => false,
        }
    }

    pub fn fourcc(&self) -> FourCC {
        match self {
            Self::Known(cc) => *cc,
            Self::Unknown(val) => FourCC(*val),
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

impl From<u32> for PixelFormat {
    fn from(val: u32) -> Self {
        match FourCC(val) {
            cc @ (FourCC::YUYV | FourCC::BGR3 | FourCC::RGB3 | FourCC::MJPEG | FourCC::H264) => {
                Self::Known(cc)
            }
            _ => Self::Unknown(val),
        }
    }
}

impl From<FourCC> for PixelFormat {
    fn from(cc: FourCC) -> Self {
        Self::Known(cc)
    }
}

impl PartialEq<PixelFormat> for FourCC {
    fn eq(&self, other: &PixelFormat) -> bool {
        match other {
            PixelFormat::Known(cc) => self == cc,
            PixelFormat::Unknown(val) => self.0 == *val,
        }
    }
}

// 反向比较也加上
impl PartialEq<FourCC> for PixelFormat {
    fn eq(&self, other: &FourCC) -> bool {
        match self {
            PixelFormat::Known(cc) => cc == other,
            PixelFormat::Unknown(val) => *val == other.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codec_strings() {
        assert_eq!("MJPG".parse::<FourCC>().unwrap(), FourCC::MJPEG);
        assert_eq!("YUYV".parse::<FourCC>().unwrap().to_string(), "YUYV");
        assert_eq!("Z1".parse::<FourCC>().unwrap().to_string(), "Z1  ");
        assert!("".parse::<FourCC>().is_err());
        assert!("TOOLONG".parse::<FourCC>().is_err());
    }

    #[test]
    fn unknown_codes_stay_unknown() {
        let format = PixelFormat::from(FourCC::new(b'N', b'V', b'1', b'2').0);
        assert!(matches!(format, PixelFormat::Unknown(_)));
        assert!(PixelFormat::from(FourCC::MJPEG.0).is_compressed());
        assert_eq!(PixelFormat::from(FourCC::YUYV), FourCC::YUYV);
    }
}
