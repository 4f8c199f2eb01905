//! 图像预处理: 把磁盘上的灰度图像变成 [`Image`] 和 [`Mask`].
//!
//! 图像: 高斯模糊 (`sigma = 1.1`) → 直方图均衡化 → 缩放到 `[0, 1]`.
//!
//! 标注: 最近邻缩放到图像形状 → 大于 0 的像素为前景.

use crate::consts::gray::WHITE;
use crate::consts::BLUR_SIGMA;
use crate::{Idx2d, Image, Mask, SegError, SegResult};
use image::error::{ParameterError, ParameterErrorKind};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageError};
use ndarray::{Array2, ArrayView2};
use std::path::Path;

/// 直方图均衡化, 与常见视觉库的 `equalizeHist` 一致:
/// `lut[i] = round((cdf[i] - cdf_min) * 255 / (N - cdf_min))`.
///
/// 常量图像原样返回.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cdf_min = histogram.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return img.clone();
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    let scale = f64::from(WHITE) / (total - cdf_min) as f64;
    for (v, &count) in histogram.iter().enumerate() {
        cdf += count;
        lut[v] = ((cdf.saturating_sub(cdf_min)) as f64 * scale).round() as u8;
    }

    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

fn to_array(img: &GrayImage) -> Array2<u8> {
    let (w, h) = img.dimensions();
    // `GrayImage` 按行优先存储, 恰好是 `(h, w)` 的标准布局.
    ArrayView2::from_shape((h as usize, w as usize), img.as_raw())
        .map(|v| v.to_owned())
        .unwrap_or_else(|_| Array2::zeros((0, 0)))
}

/// 预处理灰度图像. 任一维度为 0 时返回 `None`.
pub fn preprocess(raw: &GrayImage) -> Option<Image> {
    if raw.width() == 0 || raw.height() == 0 {
        return None;
    }
    let blurred = imageops::blur(raw, BLUR_SIGMA);
    let equalized = equalize_histogram(&blurred);
    let scale = f32::from(WHITE);
    Image::new(to_array(&equalized).mapv(|p| f32::from(p) / scale))
}

/// 将原始标注最近邻缩放到 `shape` (高, 宽) 后二值化.
///
/// 任一维度为 0 时返回 `None`.
pub fn binarize_mask(raw: &GrayImage, shape: Idx2d) -> Option<Mask> {
    let (h, w) = shape;
    if raw.width() == 0 || raw.height() == 0 || h == 0 || w == 0 {
        return None;
    }
    let raw = if raw.dimensions() == (w as u32, h as u32) {
        to_array(raw)
    } else {
        to_array(&imageops::resize(raw, w as u32, h as u32, FilterType::Nearest))
    };
    Mask::binarize(raw.view())
}

fn empty_image_error() -> ImageError {
    ImageError::Parameter(ParameterError::from_kind(
        ParameterErrorKind::DimensionMismatch,
    ))
}

fn open_gray(path: &Path) -> SegResult<GrayImage> {
    image::open(path)
        .map(|img| img.into_luma8())
        .map_err(|source| SegError::UnreadableInput {
            path: path.to_path_buf(),
            source,
        })
}

/// 读取并预处理 `path` 处的图像.
pub fn load_image<P: AsRef<Path>>(path: P) -> SegResult<Image> {
    let path = path.as_ref();
    preprocess(&open_gray(path)?).ok_or_else(|| SegError::UnreadableInput {
        path: path.to_path_buf(),
        source: empty_image_error(),
    })
}

/// 读取 `path` 处的标注, 并对齐到 `shape`.
///
/// 文件不存在时返回 [`SegError::MaskNotFound`].
pub fn load_mask<P: AsRef<Path>>(path: P, shape: Idx2d) -> SegResult<Mask> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SegError::MaskNotFound(path.to_path_buf()));
    }
    binarize_mask(&open_gray(path)?, shape).ok_or_else(|| SegError::UnreadableInput {
        path: path.to_path_buf(),
        source: empty_image_error(),
    })
}

/// 读取一对图像与标注.
pub fn load_pair<P: AsRef<Path>, Q: AsRef<Path>>(image: P, mask: Q) -> SegResult<(Image, Mask)> {
    let image = load_image(image)?;
    let mask = load_mask(mask, image.shape())?;
    Ok((image, mask))
}
