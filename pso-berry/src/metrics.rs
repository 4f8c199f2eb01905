//! 二值分割的重叠度指标.
//!
//! 所有指标都由一次遍历得到的 [`Overlap`] 计数导出. 空标注/空预测的边界情形严格按照下表处理
//! (`G` 为标注前景数, `P` 为预测前景数):
//!
//! | 指标        | `G = 0, P = 0` | `G > 0, P = 0` | `G = 0, P > 0` | 其他                    |
//! |-------------|----------------|----------------|----------------|-------------------------|
//! | dice        | 1              | 公式 (= 0)     | 公式 (= 0)     | `2I / (G + P + ε)`      |
//! | iou         | 1              | 公式 (= 0)     | 公式 (= 0)     | `I / (U + ε)`           |
//! | precision   | 1              | 0              | 公式 (= 0)     | `I / (P + ε)`           |
//! | recall      | 1              | 公式 (= 0)     | 0              | `I / (G + ε)`           |
//!
//! 健康切片 (空标注 + 空预测) 依赖第一列得到满分.

use crate::consts::gray::is_foreground;
use crate::consts::EPS;
use crate::{Image, Mask};
use ndarray::Zip;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 标注 `G` 与预测 `P` 的前景计数.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Overlap {
    /// `|G ∧ P|`.
    pub intersection: u64,

    /// `|G ∨ P|`.
    pub union: u64,

    /// `|G|`.
    pub sum_ref: u64,

    /// `|P|`.
    pub sum_pred: u64,
}

impl Overlap {
    /// 一次遍历统计 `reference` 与 `prediction` 的计数.
    ///
    /// 两者形状不一致时程序 panic.
    pub fn between(reference: &Mask, prediction: &Mask) -> Self {
        assert_eq!(reference.shape(), prediction.shape(), "标注和预测形状不一致");
        let mut acc = Self::default();
        Zip::from(reference.view())
            .and(prediction.view())
            .for_each(|&g, &p| acc.push(is_foreground(g), is_foreground(p)));
        acc
    }

    /// 一次遍历统计 `reference` 与 `image > tau` 的计数, 不构造中间预测.
    ///
    /// 这是阈值搜索的适应度热路径. 两者形状不一致时程序 panic.
    pub fn thresholded(reference: &Mask, image: &Image, tau: f64) -> Self {
        assert_eq!(reference.shape(), image.shape(), "标注和图像形状不一致");
        let mut acc = Self::default();
        Zip::from(reference.view())
            .and(image.view())
            .for_each(|&g, &p| acc.push(is_foreground(g), f64::from(p) > tau));
        acc
    }

    #[inline]
    fn push(&mut self, g: bool, p: bool) {
        self.intersection += u64::from(g & p);
        self.union += u64::from(g | p);
        self.sum_ref += u64::from(g);
        self.sum_pred += u64::from(p);
    }

    #[inline]
    fn both_empty(&self) -> bool {
        self.sum_ref == 0 && self.sum_pred == 0
    }

    /// Dice 系数.
    pub fn dice(&self) -> f64 {
        if self.both_empty() {
            return 1.0;
        }
        2.0 * self.intersection as f64 / (self.sum_ref as f64 + self.sum_pred as f64 + EPS)
    }

    /// IoU (Jaccard) 系数.
    pub fn iou(&self) -> f64 {
        if self.both_empty() {
            return 1.0;
        }
        self.intersection as f64 / (self.union as f64 + EPS)
    }

    /// 精确率.
    pub fn precision(&self) -> f64 {
        match (self.sum_pred, self.sum_ref) {
            (0, 0) => 1.0,
            (0, _) => 0.0,
            (p, _) => self.intersection as f64 / (p as f64 + EPS),
        }
    }

    /// 召回率.
    pub fn recall(&self) -> f64 {
        match (self.sum_ref, self.sum_pred) {
            (0, 0) => 1.0,
            (0, _) => 0.0,
            (g, _) => self.intersection as f64 / (g as f64 + EPS),
        }
    }

    /// 导出全部四个指标.
    #[inline]
    pub fn metrics(&self) -> Metrics {
        Metrics {
            dice: self.dice(),
            iou: self.iou(),
            precision: self.precision(),
            recall: self.recall(),
        }
    }
}

/// 一组重叠度指标.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Metrics {
    /// Dice 系数.
    pub dice: f64,

    /// IoU 系数.
    pub iou: f64,

    /// 精确率.
    pub precision: f64,

    /// 召回率.
    pub recall: f64,
}

impl Metrics {
    /// 按 (dice, iou, precision, recall) 顺序的数组.
    #[inline]
    pub fn to_array(&self) -> [f64; 4] {
        [self.dice, self.iou, self.precision, self.recall]
    }
}

/// 计算 `reference` 与 `prediction` 的全部指标.
#[inline]
pub fn compute_all(reference: &Mask, prediction: &Mask) -> Metrics {
    Overlap::between(reference, prediction).metrics()
}
