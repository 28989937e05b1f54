//! 运动检测
//!
//! 流水线与 OpenCV 的常见写法一致：
//! 灰度 -> 背景建模 (前景掩码) -> 二值化 -> 膨胀 -> 外轮廓 -> 面积过滤。
//! 轮廓用 8 连通区域近似，面积是区域内的像素数。

use super::color::bgr_to_gray;
use super::drawing::Rect;
use crate::core::mat::Mat;

/// 二值化阈值
pub const MOTION_THRESHOLD: u8 = 25;

/// 默认最小运动面积 (像素)
pub const DEFAULT_MIN_AREA: usize = 3000;

/// 自适应的逐像素高斯背景模型 (单高斯版本的 MOG)
#[derive(Debug, Clone)]
pub struct BackgroundSubtractor {
    mean: Vec<f32>,
    var: Vec<f32>,
    size: (i32, i32),
    learning_rate: f32,
    var_threshold: f32,
}

impl BackgroundSubtractor {
    const VAR_INIT: f32 = 15.0;
    const VAR_MIN: f32 = 4.0;
    const VAR_MAX: f32 = 75.0;

    /// `history` 决定学习速率 (1 / history)，`var_threshold` 是马氏距离平方的阈值
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            mean: Vec::new(),
            var: Vec::new(),
            size: (0, 0),
            learning_rate: 1.0 / history.max(1) as f32,
            var_threshold,
        }
    }

    /// 输入单通道图像，输出前景掩码 (255 前景 / 0 背景)
    ///
    /// 第一帧 (或尺寸变化后的第一帧) 只用于初始化模型，输出全背景。
    pub fn apply(&mut self, gray: &Mat) -> Mat {
        let mut mask = Mat::new(gray.rows, gray.cols, 1);
        let pixels = gray.to_packed();

        if self.size != (gray.rows, gray.cols) || self.mean.len() != pixels.len() {
            self.size = (gray.rows, gray.cols);
            self.mean = pixels.iter().map(|&p| p as f32).collect();
            self.var = vec![Self::VAR_INIT; pixels.len()];
            return mask;
        }

        let alpha = self.learning_rate;
        for (i, &p) in pixels.iter().enumerate() {
            let diff = p as f32 - self.mean[i];
            let d2 = diff * diff;

            if d2 > self.var_threshold * self.var[i] {
                mask.data[i] = 255;
            }

            self.mean[i] += alpha * diff;
            self.var[i] = (self.var[i] + alpha * (d2 - self.var[i])).clamp(Self::VAR_MIN, Self::VAR_MAX);
        }
        mask
    }
}

impl Default for BackgroundSubtractor {
    fn default() -> Self {
        Self::new(500, 16.0)
    }
}

/// 二值化：大于 thresh 的像素置为 max_value，其余为 0
pub fn threshold(src: &Mat, thresh: u8, max_value: u8) -> Mat {
    let mut dst = src.clone();
    for v in dst.data.iter_mut() {
        *v = if *v > thresh { max_value } else { 0 };
    }
    dst
}

/// 3x3 矩形结构元素的膨胀
pub fn dilate(src: &Mat, iterations: u32) -> Mat {
    let mut current = src.clone();
    for _ in 0..iterations {
        let mut out = Mat::new(current.rows, current.cols, 1);
        for r in 0..current.rows {
            for c in 0..current.cols {
                let mut max = 0u8;
                for dr in -1..=1 {
                    for dc in -1..=1 {
                        let (rr, cc) = (r + dr, c + dc);
                        if rr >= 0 && rr < current.rows && cc >= 0 && cc < current.cols {
                            max = max.max(current.data[rr as usize * current.step + cc as usize]);
                        }
                    }
                }
                out.data[r as usize * out.step + c as usize] = max;
            }
        }
        current = out;
    }
    current
}

/// 一个外轮廓 (连通区域)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contour {
    /// 区域像素数
    pub area: usize,
    pub bounds: Rect,
}

/// 查找二值图中的外轮廓 (8 连通)
pub fn find_contours(binary: &Mat) -> Vec<Contour> {
    let (rows, cols) = (binary.rows.max(0) as usize, binary.cols.max(0) as usize);
    let mut visited = vec![false; rows * cols];
    let mut contours = Vec::new();
    let mut stack = Vec::new();

    let on = |r: usize, c: usize| binary.data[r * binary.step + c] != 0;

    for r0 in 0..rows {
        for c0 in 0..cols {
            if visited[r0 * cols + c0] || !on(r0, c0) {
                continue;
            }

            visited[r0 * cols + c0] = true;
            stack.push((r0, c0));
            let (mut area, mut min_r, mut max_r, mut min_c, mut max_c) = (0, r0, r0, c0, c0);

            while let Some((r, c)) = stack.pop() {
                area += 1;
                min_r = min_r.min(r);
                max_r = max_r.max(r);
                min_c = min_c.min(c);
                max_c = max_c.max(c);

                for nr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
                    for nc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                        let idx = nr * cols + nc;
                        if !visited[idx] && on(nr, nc) {
                            visited[idx] = true;
                            stack.push((nr, nc));
                        }
                    }
                }
            }

            contours.push(Contour {
                area,
                bounds: Rect::new(
                    min_c as i32,
                    min_r as i32,
                    (max_c - min_c + 1) as i32,
                    (max_r - min_r + 1) as i32,
                ),
            });
        }
    }
    contours
}

/// 有状态的运动检测器，每个录像会话一个
#[derive(Debug, Clone)]
pub struct MotionDetector {
    background: BackgroundSubtractor,
    min_area: usize,
}

impl MotionDetector {
    pub fn new(min_area: usize) -> Self {
        Self {
            background: BackgroundSubtractor::default(),
            min_area,
        }
    }

    /// 返回达到最小面积的运动区域；为空表示这一帧没有运动
    pub fn detect(&mut self, frame: &Mat) -> Vec<Contour> {
        let gray = bgr_to_gray(frame);
        let mask = self.background.apply(&gray);
        let binary = threshold(&mask, MOTION_THRESHOLD, 255);
        let dilated = dilate(&binary, 1);

        find_contours(&dilated)
            .into_iter()
            .filter(|c| c.area >= self.min_area)
            .collect()
    }

    pub fn has_motion(&mut self, frame: &Mat) -> bool {
        !self.detect(frame).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(block_at: Option<(i32, i32)>, size: i32) -> Mat {
        let mut mat = Mat::new(120, 160, 3);
        mat.data.fill(30);
        if let Some((x, y)) = block_at {
            for r in y..y + size {
                for c in x..x + size {
                    let idx = r as usize * mat.step + c as usize * 3;
                    mat.data[idx..idx + 3].fill(230);
                }
            }
        }
        mat
    }

    #[test]
    fn static_scene_has_no_motion() {
        let mut detector = MotionDetector::new(50);
        for _ in 0..10 {
            assert!(!detector.has_motion(&scene(None, 0)));
        }
    }

    #[test]
    fn large_moving_block_is_motion() {
        let mut detector = MotionDetector::new(300);
        assert!(!detector.has_motion(&scene(None, 0)));
        let contours = detector.detect(&scene(Some((40, 40)), 30));
        assert_eq!(contours.len(), 1);
        assert!(contours[0].area >= 900);
        assert!(contours[0].bounds.area() >= 900);
    }

    #[test]
    fn small_change_below_min_area_is_ignored() {
        let mut detector = MotionDetector::new(DEFAULT_MIN_AREA);
        detector.detect(&scene(None, 0));
        assert!(!detector.has_motion(&scene(Some((10, 10)), 8)));
    }

    #[test]
    fn disjoint_regions_are_separate_contours() {
        let mut binary = Mat::new(10, 10, 1);
        binary.data[0] = 255;
        binary.data[1] = 255;
        binary.data[9 * 10 + 9] = 255;
        let mut contours = find_contours(&binary);
        contours.sort_by_key(|c| c.area);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].area, 1);
        assert_eq!(contours[1].area, 2);
    }

    #[test]
    fn dilation_grows_a_single_pixel() {
        let mut binary = Mat::new(5, 5, 1);
        binary.data[2 * 5 + 2] = 255;
        let dilated = dilate(&threshold(&binary, MOTION_THRESHOLD, 255), 1);
        assert_eq!(dilated.data.iter().filter(|&&v| v == 255).count(), 9);
    }
}
