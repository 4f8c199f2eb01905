//! 图像的持久化存储.

use crate::consts::gray::*;
use crate::{Image, Mask};
use image::{GrayImage, ImageResult, Luma, Rgb, RgbImage};
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于 [`Mask`], 前景映射为白色, 背景映射为黑色.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使标注像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    match label {
        MASK_BACKGROUND => BLACK,
        MASK_FOREGROUND => WHITE,
        any_else => panic!("只允许标注存在 0, 1 像素, 但发现了 `{any_else}`"),
    }
}

/// `[0, 1]` 灰度到 8-bit 灰度.
#[inline]
pub(crate) fn to_gray(p: f32) -> u8 {
    // 255, not 256.
    (p.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl ImgWriteVis for Mask {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = GrayImage::new(width as u32, height as u32);
        for ((h, w), &p) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, Luma([pretty(p)]));
        }
        buf.save(path)
    }
}

/// 将前景像素以 `tint` 颜色按 40% 不透明度叠加到灰度像素上.
#[inline]
fn overlay(gray: u8, on: bool, tint: [u8; 3]) -> Rgb<u8> {
    if !on {
        return Rgb([gray; 3]);
    }
    let mix = |c: u8| ((f32::from(gray) * 0.6) + (f32::from(c) * 0.4)).round() as u8;
    Rgb([mix(tint[0]), mix(tint[1]), mix(tint[2])])
}

/// 保存一张 "输入 | 标注 | 预测" 三联图, 用于定性检查.
///
/// 标注以红色叠加, 预测以蓝色叠加. 三者形状必须一致, 否则程序 panic.
pub fn save_triplet<P: AsRef<Path>>(
    path: P,
    image: &Image,
    reference: &Mask,
    prediction: &Mask,
) -> ImageResult<()> {
    const RED: [u8; 3] = [WHITE, BLACK, BLACK];
    const BLUE: [u8; 3] = [BLACK, BLACK, WHITE];

    assert_eq!(image.shape(), reference.shape(), "图像和标注形状不一致");
    assert_eq!(image.shape(), prediction.shape(), "图像和预测形状不一致");

    let (height, width) = image.shape();
    let mut buf = RgbImage::new(3 * width as u32, height as u32);
    for ((h, w), &p) in image.indexed_iter() {
        let gray = to_gray(p);
        let (x, y) = (w as u32, h as u32);
        buf.put_pixel(x, y, Rgb([gray; 3]));
        let (g, q) = (reference[(h, w)], prediction[(h, w)]);
        buf.put_pixel(x + width as u32, y, overlay(gray, is_foreground(g), RED));
        buf.put_pixel(x + 2 * width as u32, y, overlay(gray, is_foreground(q), BLUE));
    }
    buf.save(path)
}
