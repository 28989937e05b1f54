use crate::core::mat::Mat;
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use rusttype::{point, Font, PositionedGlyph, Scale};
use std::fmt;
use std::path::Path;

// --- 基础结构 ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scalar {
    pub v0: u8, // Blue
    pub v1: u8, // Green
    pub v2: u8, // Red
}

impl Scalar {
    pub fn new(b: u8, g: u8, r: u8) -> Self {
        Self {
            v0: b,
            v1: g,
            v2: r,
        }
    }
    pub fn all(v: u8) -> Self {
        Self {
            v0: v,
            v1: v,
            v2: v,
        }
    }
}

// --- 文本渲染 ---

/// 文本渲染器
///
/// 字体在运行时从文件加载 (TrueType)；没有配置字体时使用内置的 5x7 点阵，
/// 点阵只覆盖时间戳需要的字符 (数字、`-`、`:`、空格)。
#[derive(Clone, Default)]
pub struct TextRenderer {
    font: Option<Font<'static>>,
}

impl fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRenderer")
            .field("truetype", &self.font.is_some())
            .finish()
    }
}

impl TextRenderer {
    /// 只使用内置点阵
    pub fn bitmap() -> Self {
        Self { font: None }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let font = Font::try_from_vec(bytes).ok_or_else(|| {
            Error::Codec(format!("invalid font file {}", path.as_ref().display()))
        })?;
        Ok(Self { font: Some(font) })
    }

    /// 在图像上绘制文字，`org` 是左下角基线位置 (与 OpenCV 一致)
    pub fn put_text(&self, mat: &mut Mat, text: &str, org: Point, font_scale: f32, color: Scalar) {
        match &self.font {
            Some(font) => put_truetype(font, mat, text, org, font_scale, color),
            None => put_bitmap(mat, text, org, font_scale, color),
        }
    }
}

/// 在画面左下角 (10, rows - 10) 打上 `YYYY-mm-dd HH:MM:SS` 时间戳
pub fn draw_timestamp(mat: &mut Mat, renderer: &TextRenderer, at: &DateTime<Local>) {
    let text = at.format("%Y-%m-%d %H:%M:%S").to_string();
    renderer.put_text(
        mat,
        &text,
        Point::new(10, mat.rows - 10),
        0.6,
        Scalar::all(255),
    );
}

fn put_truetype(font: &Font<'_>, mat: &mut Mat, text: &str, org: Point, font_scale: f32, color: Scalar) {
    let scale = Scale::uniform(font_scale * 20.0); // 调整倍率以匹配 OpenCV 手感
    let start = point(org.x as f32, org.y as f32);
    let glyphs: Vec<PositionedGlyph<'_>> = font.layout(text, scale, start).collect();

    let step = mat.step;
    let rows = mat.rows;
    let cols = mat.cols;
    let channels = mat.channels as usize;
    if channels < 3 {
        return;
    }

    for glyph in glyphs {
        if let Some(bounding_box) = glyph.pixel_bounding_box() {
            // 栅格化每个字符
            glyph.draw(|x, y, v| {
                // v 是覆盖率 (0.0 - 1.0)，用于抗锯齿混合
                let px = x as i32 + bounding_box.min.x;
                let py = y as i32 + bounding_box.min.y;

                if px >= 0 && px < cols && py >= 0 && py < rows {
                    let idx = (py as usize) * step + (px as usize) * channels;
                    let blend = |old: u8, new: u8| (new as f32 * v + old as f32 * (1.0 - v)) as u8;

                    mat.data[idx] = blend(mat.data[idx], color.v0);
                    mat.data[idx + 1] = blend(mat.data[idx + 1], color.v1);
                    mat.data[idx + 2] = blend(mat.data[idx + 2], color.v2);
                }
            });
        }
    }
}

const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;

// 每行 5 bit，最高位在最左边
fn glyph(ch: char) -> Option<[u8; 7]> {
    Some(match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    })
}

fn put_bitmap(mat: &mut Mat, text: &str, org: Point, font_scale: f32, color: Scalar) {
    let channels = mat.channels as usize;
    if channels < 3 {
        return;
    }
    let cell = ((font_scale * 3.0).round() as i32).max(1);
    let top = org.y - GLYPH_H * cell;

    for (i, ch) in text.chars().enumerate() {
        // 不认识的字符留空
        let Some(rows) = glyph(ch) else { continue };
        let left = org.x + i as i32 * (GLYPH_W + 1) * cell;

        for (gy, bits) in rows.iter().enumerate() {
            for gx in 0..GLYPH_W {
                if bits & (0x10 >> gx) == 0 {
                    continue;
                }
                for dy in 0..cell {
                    for dx in 0..cell {
                        let px = left + gx * cell + dx;
                        let py = top + gy as i32 * cell + dy;
                        if px >= 0 && px < mat.cols && py >= 0 && py < mat.rows {
                            let idx = py as usize * mat.step + px as usize * channels;
                            mat.data[idx] = color.v0;
                            mat.data[idx + 1] = color.v1;
                            mat.data[idx + 2] = color.v2;
                        }
                    }
                }
            }
        }
    }
}
