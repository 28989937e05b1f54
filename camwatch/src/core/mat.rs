use std::fmt;

/// OpenCV-like Matrix structure.
/// Owns its data (Vec<u8>) and supports strided memory layout.
#[derive(Clone, PartialEq, Eq)]
pub struct Mat {
    pub data: Vec<u8>,
    pub rows: i32,
    pub cols: i32,
    /// 每一行占用的字节数 (Stride)
    /// 对于 Packed 图像，step = cols * channels
    /// 对于 Padded 图像，step > cols * channels
    pub step: usize,
    pub channels: u8,
}

impl Mat {
    pub fn new(rows: i32, cols: i32, channels: u8) -> Self {
        let step = (cols * channels as i32) as usize;
        let size = (rows as usize) * step;
        Self {
            data: vec![0; size],
            rows,
            cols,
            step,
            channels,
        }
    }

    /// 用已有的 Packed 数据构造，长度不匹配时返回 None
    pub fn from_packed(rows: i32, cols: i32, channels: u8, data: Vec<u8>) -> Option<Self> {
        let step = (cols.max(0) as usize) * channels as usize;
        if rows < 0 || data.len() != rows as usize * step {
            return None;
        }
        Some(Self {
            data,
            rows,
            cols,
            step,
            channels,
        })
    }

    /// 创建一个空的 Mat (通常用于作为输出 buffer)
    pub fn empty() -> Self {
        Self {
            data: vec![],
            rows: 0,
            cols: 0,
            step: 0,
            channels: 0,
        }
    }

    /// 检查是否为空
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.rows == 0 || self.cols == 0
    }

    pub fn size(&self) -> (u32, u32) {
        (self.cols as u32, self.rows as u32)
    }

    /// 获取像素数据的切片 (考虑 Stride)
    pub fn row_bytes(&self, row: i32) -> &[u8] {
        let start = (row as usize) * self.step;
        let end = start + (self.cols as usize * self.channels as usize);
        &self.data[start..end] // 注意：这里我们忽略了行尾的 Padding
    }

    pub fn row_bytes_mut(&mut self, row: i32) -> &mut [u8] {
        let start = (row as usize) * self.step;
        let end = start + (self.cols as usize * self.channels as usize);
        &mut self.data[start..end]
    }

    /// 去掉行尾 Padding 后的连续数据
    pub fn to_packed(&self) -> Vec<u8> {
        let row_len = self.cols as usize * self.channels as usize;
        if self.step == row_len {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(row_len * self.rows as usize);
        for r in 0..self.rows {
            out.extend_from_slice(self.row_bytes(r));
        }
        out
    }
}

impl fmt::Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mat")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("channels", &self.channels)
            .field("step", &self.step)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_constructor_checks_length() {
        assert!(Mat::from_packed(2, 2, 3, vec![0; 12]).is_some());
        assert!(Mat::from_packed(2, 2, 3, vec![0; 11]).is_none());
    }

    #[test]
    fn padded_rows_are_stripped() {
        let mut mat = Mat::new(2, 1, 1);
        mat.step = 4;
        mat.data = vec![1, 0, 0, 0, 2, 0, 0, 0];
        assert_eq!(mat.to_packed(), vec![1, 2]);
        mat.row_bytes_mut(1)[0] = 7;
        assert_eq!(mat.row_bytes(1), &[7]);
    }
}
