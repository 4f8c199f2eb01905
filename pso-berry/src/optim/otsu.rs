//! [Otsu 方法](https://ieeexplore.ieee.org/document/4310076): 最大化类间方差的全局阈值.
//!
//! 粒子群搜索塌缩到区间边界时, 用它作为确定性的回退.

use crate::consts::OTSU_BINS;
use crate::Image;

/// 计算 `image` 的 Otsu 阈值 (使用 [`OTSU_BINS`] 个直方图柱).
#[inline]
pub fn otsu_threshold(image: &Image) -> f64 {
    otsu_threshold_with_bins(image, OTSU_BINS)
}

/// 计算 `image` 的 Otsu 阈值.
///
/// 直方图覆盖图像自身的 `[min, max]` 区间, 返回最优分割柱的 **上边沿**.
/// 每个柱为左开右闭区间 `(edge[i-1], edge[i]]`, 恰好落在边沿上的像素归入下方的柱,
/// 因此 `image > tau` 与直方图上的前景类逐像素一致.
/// 常量图像直接返回其像素值. `bins` 为 0 时程序 panic.
pub fn otsu_threshold_with_bins(image: &Image, bins: usize) -> f64 {
    assert!(bins > 0, "直方图柱数必须为正");

    let (lo, hi) = image.min_max();
    let (lo, hi) = (f64::from(lo), f64::from(hi));
    if hi - lo < 1e-10 {
        return lo;
    }

    let width = (hi - lo) / bins as f64;
    let mut histogram = vec![0u64; bins];
    for &p in image.iter() {
        histogram[bin_index(f64::from(p), lo, width, bins)] += 1;
    }

    let total = image.size() as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_bg = 0.0;
    let mut weight_bg = 0.0;
    let mut max_variance = 0.0;
    let mut best_bin = 0usize;

    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * count as f64;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_total - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);

        if variance > max_variance {
            max_variance = variance;
            best_bin = t;
        }
    }

    upper_edge(lo, width, best_bin)
}

#[inline]
fn upper_edge(lo: f64, width: f64, bin: usize) -> f64 {
    lo + (bin + 1) as f64 * width
}

/// `p` 所在的柱, 满足 `upper_edge(bin - 1) < p <= upper_edge(bin)` (首尾两柱除外).
///
/// 先估算再用同一个边沿公式校正, 以免浮点舍入让边沿上的像素落错柱.
fn bin_index(p: f64, lo: f64, width: f64, bins: usize) -> usize {
    let mut bin = (((p - lo) / width).ceil() as usize)
        .saturating_sub(1)
        .min(bins - 1);
    while bin > 0 && p <= upper_edge(lo, width, bin - 1) {
        bin -= 1;
    }
    while bin < bins - 1 && p > upper_edge(lo, width, bin) {
        bin += 1;
    }
    bin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otsu_bimodal() {
        let mut pixels = vec![0.2f32; 50];
        pixels.extend(std::iter::repeat(0.8f32).take(50));
        let img = Image::from_shape_vec((10, 10), pixels).unwrap();

        let tau = otsu_threshold(&img);
        assert!(tau > 0.2 && tau < 0.8, "tau = {tau}");
        assert_eq!(img.threshold(tau).count_foreground(), 50);
    }

    #[test]
    fn test_otsu_spread_clusters() {
        let pixels: Vec<f32> = (0..100)
            .map(|i| 0.1 + 0.2 * (i as f32 / 100.0))
            .chain((0..100).map(|i| 0.7 + 0.2 * (i as f32 / 100.0)))
            .collect();
        let img = Image::from_shape_vec((20, 10), pixels).unwrap();
        let tau = otsu_threshold(&img);
        assert!(tau > 0.29 && tau < 0.7, "tau = {tau}");
        assert_eq!(img.threshold(tau).count_foreground(), 100);
    }

    #[test]
    fn test_bin_index_right_closed() {
        let (lo, width) = (0.0, 0.25);
        assert_eq!(bin_index(0.0, lo, width, 4), 0);
        assert_eq!(bin_index(0.25, lo, width, 4), 0);
        assert_eq!(bin_index(0.250_001, lo, width, 4), 1);
        assert_eq!(bin_index(0.75, lo, width, 4), 2);
        assert_eq!(bin_index(1.0, lo, width, 4), 3);

        let (lo, width) = (0.1, 0.7 / 7.0);
        for bin in 0..7 {
            let edge = upper_edge(lo, width, bin);
            assert_eq!(bin_index(edge, lo, width, 7), bin);
        }
    }

    #[test]
    fn test_otsu_edge_pixel_stays_background() {
        // 0.25 恰好是第一个柱的上边沿, 与 0.0 同属背景类.
        let img = Image::from_shape_vec((1, 3), vec![0.0, 0.25, 1.0]).unwrap();
        let tau = otsu_threshold_with_bins(&img, 4);
        assert_eq!(tau, 0.25);
        assert_eq!(img.threshold(tau).count_foreground(), 1);
    }

    #[test]
    fn test_otsu_constant() {
        let img = Image::from_shape_vec((4, 4), vec![0.5; 16]).unwrap();
        assert_eq!(otsu_threshold(&img), 0.5);
    }
}
