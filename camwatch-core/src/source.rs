use sha2::{Digest, Sha256};
use std::fmt;

/// 帧的来源：本机设备 (`/dev/videoN`) 或网络流地址
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum CameraSource {
    /// 本机设备编号
    Device(u32),
    /// 网络视频流 URL
    Url(String),
}

impl CameraSource {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(index) => write!(f, "/dev/video{index}"),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// 相机的稳定标识
///
/// 本机设备直接使用设备编号 (十进制)，网络流使用 URL 的 SHA-256 前 8 字节 (16 位小写十六进制)。
/// 两种形式长度不同，不会互相冲突。计算是纯函数，不依赖进程级状态。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct CameraIdentity(String);

impl CameraIdentity {
    pub fn of(source: &CameraSource) -> Self {
        match source {
            CameraSource::Device(index) => Self(index.to_string()),
            CameraSource::Url(url) => Self(url_digest(url)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn url_digest(url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

impl fmt::Display for CameraIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 路由参数等外部输入直接作为标识使用
impl From<String> for CameraIdentity {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for CameraIdentity {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_identity_is_the_index() {
        let id = CameraIdentity::of(&CameraSource::Device(3));
        assert_eq!(id.as_str(), "3");
        assert_eq!(CameraSource::Device(3).to_string(), "/dev/video3");
    }

    #[test]
    fn url_identity_is_stable_and_hex() {
        let a = CameraIdentity::of(&CameraSource::Url("rtsp://10.0.0.7/live".into()));
        let b = CameraIdentity::of(&CameraSource::Url(" rtsp://10.0.0.7/live\n".into()));
        let c = CameraIdentity::of(&CameraSource::Url("rtsp://10.0.0.8/live".into()));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn serializes_as_plain_values() -> anyhow::Result<()> {
        let id = CameraIdentity::of(&CameraSource::Device(0));
        assert_eq!(serde_json::to_string(&id)?, "\"0\"");

        let source: CameraSource = serde_json::from_str(r#"{"url":"http://cam/stream"}"#)?;
        assert_eq!(source, CameraSource::Url("http://cam/stream".into()));
        Ok(())
    }
}
