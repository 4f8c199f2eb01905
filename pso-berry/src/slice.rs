//! 单切片流水线.
//!
//! 1. 标注为空 → 健康切片: 跳过搜索, 预测为全背景, 无阈值.
//! 2. 标注非空 → 病灶切片: 按 [`ThresholdStrategy`] 获得阈值 `tau`, 预测为 `image > tau`.
//!
//! 两种情形都用 [`compute_all`] 计算最终指标.

use crate::consts::DEFAULT_FIXED_THRESHOLD;
use crate::metrics::{compute_all, Metrics};
use crate::optim::{otsu_threshold, PsoParams, SearchOutcome, ThresholdOptimizer};
use crate::preprocess::load_pair;
use crate::{Image, Mask, SegError, SegResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 切片分类.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum Classification {
    /// 标注为空.
    Healthy,

    /// 标注非空.
    Pathological,
}

impl Classification {
    /// 小写名称, 同时用作导出文件名前缀.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Pathological => "pathological",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个切片的处理记录. 创建后不可变.
///
/// 健康切片的 `threshold` 总为 `None`, 病灶切片总为 `Some`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceRecord {
    /// 切片标识 (图像文件名).
    pub id: String,

    /// 最终指标.
    pub metrics: Metrics,

    /// 使用的阈值.
    pub threshold: Option<f64>,

    /// 分类.
    pub classification: Classification,
}

impl SliceRecord {
    /// 是否为健康切片?
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.classification == Classification::Healthy
    }
}

/// 病灶切片的阈值来源.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum ThresholdStrategy {
    /// 粒子群搜索 (带 Otsu 回退).
    #[default]
    Swarm,

    /// 固定阈值.
    Fixed(f64),

    /// 直接使用 Otsu 阈值.
    Otsu,
}

impl ThresholdStrategy {
    /// 默认固定阈值 `0.5`.
    #[inline]
    pub const fn fixed() -> Self {
        Self::Fixed(DEFAULT_FIXED_THRESHOLD)
    }

    /// 简短名称.
    pub fn label(&self) -> String {
        match self {
            Self::Swarm => "pso".to_string(),
            Self::Fixed(t) => format!("fixed@{t}"),
            Self::Otsu => "otsu".to_string(),
        }
    }
}

/// 单个切片的完整输出, 包括给下游展示用的预测.
#[derive(Clone, Debug)]
pub struct SliceOutcome {
    /// 处理记录.
    pub record: SliceRecord,

    /// 预测标注.
    pub prediction: Mask,

    /// 搜索细节. 仅病灶切片在 [`ThresholdStrategy::Swarm`] 下为 `Some`.
    pub search: Option<SearchOutcome>,
}

/// 单切片处理器. 只持有配置, 可在线程间共享.
#[derive(Clone, Debug)]
pub struct SliceProcessor {
    optimizer: ThresholdOptimizer,
    strategy: ThresholdStrategy,
}

impl SliceProcessor {
    /// 初始化. 参数不合法 (包括固定阈值不在搜索区间内) 时返回 [`SegError::InvalidConfig`].
    pub fn new(params: PsoParams, strategy: ThresholdStrategy) -> SegResult<Self> {
        let optimizer = ThresholdOptimizer::new(params)?;
        if let ThresholdStrategy::Fixed(t) = strategy {
            let (lo, hi) = params.bounds;
            if !(lo..=hi).contains(&t) {
                return Err(SegError::config(format!(
                    "fixed threshold {t} outside [{lo}, {hi}]"
                )));
            }
        }
        Ok(Self {
            optimizer,
            strategy,
        })
    }

    /// 使用默认超参数与粒子群策略.
    pub fn with_defaults() -> Self {
        Self {
            optimizer: ThresholdOptimizer::new(PsoParams::default())
                .expect("默认参数总是合法的"),
            strategy: ThresholdStrategy::Swarm,
        }
    }

    /// 超参数.
    #[inline]
    pub fn params(&self) -> &PsoParams {
        self.optimizer.params()
    }

    /// 阈值策略.
    #[inline]
    pub fn strategy(&self) -> ThresholdStrategy {
        self.strategy
    }

    /// 处理一对已加载的图像与标注, 随机数源由外部注入.
    pub fn process<R: Rng + ?Sized>(
        &self,
        id: impl Into<String>,
        image: &Image,
        reference: &Mask,
        rng: &mut R,
    ) -> SegResult<SliceOutcome> {
        if image.shape() != reference.shape() {
            return Err(SegError::ShapeMismatch {
                image: image.shape(),
                mask: reference.shape(),
            });
        }

        let id = id.into();
        if reference.is_background() {
            let prediction = Mask::zeros(reference.shape());
            return Ok(SliceOutcome {
                record: SliceRecord {
                    id,
                    metrics: compute_all(reference, &prediction),
                    threshold: None,
                    classification: Classification::Healthy,
                },
                prediction,
                search: None,
            });
        }

        let (threshold, search) = match self.strategy {
            ThresholdStrategy::Swarm => {
                let out = self.optimizer.search_with_rng(image, reference, rng);
                (out.threshold, Some(out))
            }
            ThresholdStrategy::Fixed(t) => (t, None),
            ThresholdStrategy::Otsu => {
                let (lo, hi) = self.params().bounds;
                (otsu_threshold(image).clamp(lo, hi), None)
            }
        };
        let prediction = image.threshold(threshold);
        Ok(SliceOutcome {
            record: SliceRecord {
                id,
                metrics: compute_all(reference, &prediction),
                threshold: Some(threshold),
                classification: Classification::Pathological,
            },
            prediction,
            search,
        })
    }

    /// 以 `seed` 播种 [`StdRng`] 处理.
    #[inline]
    pub fn process_seeded(
        &self,
        id: impl Into<String>,
        image: &Image,
        reference: &Mask,
        seed: u64,
    ) -> SegResult<SliceOutcome> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.process(id, image, reference, &mut rng)
    }

    /// 读取并预处理磁盘上的图像与标注, 然后处理.
    pub fn process_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        id: impl Into<String>,
        image: P,
        mask: Q,
        seed: u64,
    ) -> SegResult<SliceOutcome> {
        let (image, mask) = load_pair(image, mask)?;
        self.process_seeded(id, &image, &mask, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn bright_square() -> (Image, Mask) {
        let inside = |h: usize, w: usize| (3..7).contains(&h) && (3..7).contains(&w);
        let img = Array2::from_shape_fn((10, 10), |(h, w)| {
            if inside(h, w) {
                0.9f32
            } else {
                0.2
            }
        });
        let mask = Array2::from_shape_fn((10, 10), |(h, w)| u8::from(inside(h, w)));
        (Image::new(img).unwrap(), Mask::new(mask).unwrap())
    }

    #[test]
    fn test_healthy_slice() {
        let pixels = (0..16).map(|i| i as f32 / 16.0).collect();
        let img = Image::from_shape_vec((4, 4), pixels).unwrap();
        let mask = Mask::zeros((4, 4));
        let out = SliceProcessor::with_defaults()
            .process_seeded("h.png", &img, &mask, 0)
            .unwrap();

        assert_eq!(out.record.classification, Classification::Healthy);
        assert_eq!(out.record.threshold, None);
        assert_eq!(out.record.metrics.to_array(), [1.0; 4]);
        assert!(out.prediction.is_background());
        assert!(out.search.is_none());
    }

    #[test]
    fn test_pathological_slice() {
        let (img, mask) = bright_square();
        let out = SliceProcessor::with_defaults()
            .process_seeded("p.png", &img, &mask, 5)
            .unwrap();

        assert_eq!(out.record.id, "p.png");
        assert_eq!(out.record.classification, Classification::Pathological);
        let tau = out.record.threshold.unwrap();
        assert!((0.0..=1.0).contains(&tau));
        assert!(f64_eq(out.record.metrics.dice, 1.0), "{:?}", out.record);
        assert_eq!(out.search.map(|s| s.threshold), Some(tau));
        assert_eq!(out.prediction, img.threshold(tau));
    }

    #[test]
    fn test_shape_mismatch() {
        let img = Image::from_shape_vec((2, 2), vec![0.0; 4]).unwrap();
        let mask = Mask::zeros((2, 3));
        let err = SliceProcessor::with_defaults()
            .process_seeded("x", &img, &mask, 0)
            .unwrap_err();
        assert!(matches!(err, SegError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_fixed_and_otsu_strategies() {
        let (img, mask) = bright_square();
        let params = PsoParams::default();

        let fixed = SliceProcessor::new(params, ThresholdStrategy::fixed()).unwrap();
        let out = fixed.process_seeded("f", &img, &mask, 0).unwrap();
        assert_eq!(out.record.threshold, Some(0.5));
        assert!(f64_eq(out.record.metrics.dice, 1.0));
        assert!(out.search.is_none());

        let otsu = SliceProcessor::new(params, ThresholdStrategy::Otsu).unwrap();
        let out = otsu.process_seeded("o", &img, &mask, 0).unwrap();
        assert!(f64_eq(out.record.metrics.dice, 1.0));
    }

    #[test]
    fn test_fixed_outside_bounds() {
        let strategy = ThresholdStrategy::Fixed(1.5);
        let err = SliceProcessor::new(PsoParams::default(), strategy).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_same_seed_same_record() {
        let (img, mask) = bright_square();
        let p = SliceProcessor::with_defaults();
        let a = p.process_seeded("s", &img, &mask, 9).unwrap();
        let b = p.process_seeded("s", &img, &mask, 9).unwrap();
        assert_eq!(a.record, b.record);
    }
}
