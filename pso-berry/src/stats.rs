//! 分组统计汇总.

use crate::slice::{Classification, SliceRecord};
use itertools::Itertools;
use ordered_float::NotNan;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一组数值的描述统计.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatSummary {
    /// 样本数.
    pub count: usize,

    /// 均值.
    pub mean: f64,

    /// 总体标准差 (除以 `n`).
    pub std: f64,

    /// 最小值.
    pub min: f64,

    /// 最大值.
    pub max: f64,

    /// 中位数. 偶数个样本时取中间两者的均值.
    pub median: f64,
}

impl StatSummary {
    /// 从 `values` 计算. NaN 被忽略 (debug 模式下 panic); 没有有效值时返回 `None`.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let sorted = values
            .into_iter()
            .filter_map(|v| {
                debug_assert!(!v.is_nan(), "统计数据中出现 NaN");
                NotNan::new(v).ok()
            })
            .sorted()
            .map(NotNan::into_inner)
            .collect_vec();

        let n = sorted.len();
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let median = match n % 2 {
            1 => sorted[n / 2],
            _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
        };

        Some(Self {
            count: n,
            // 浮点误差可能使均值略微越界.
            mean: mean.clamp(min, max),
            std: var.sqrt(),
            min,
            max,
            median,
        })
    }
}

/// 单个分组 (健康/病灶) 的统计.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupSummary {
    /// 该组切片数.
    pub count: usize,

    /// Dice.
    pub dice: StatSummary,

    /// IoU.
    pub iou: StatSummary,

    /// 精确率.
    pub precision: StatSummary,

    /// 召回率.
    pub recall: StatSummary,

    /// 阈值. 仅病灶组存在.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub threshold: Option<StatSummary>,
}

impl GroupSummary {
    /// 汇总一组记录. 记录为空时返回 `None`.
    pub fn from_records<'a, I>(records: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a SliceRecord>,
    {
        let records = records.into_iter().collect_vec();
        let of = |f: fn(&SliceRecord) -> f64| {
            StatSummary::from_values(records.iter().map(|r| f(r)))
        };

        Some(Self {
            count: records.len(),
            dice: of(|r| r.metrics.dice)?,
            iou: of(|r| r.metrics.iou)?,
            precision: of(|r| r.metrics.precision)?,
            recall: of(|r| r.metrics.recall)?,
            threshold: StatSummary::from_values(records.iter().filter_map(|r| r.threshold)),
        })
    }
}

/// 按分组的统计. 空分组被省略.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Summary {
    /// 病灶组.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub pathological: Option<GroupSummary>,

    /// 健康组.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub healthy: Option<GroupSummary>,
}

impl Summary {
    /// 获取 `class` 对应分组的统计.
    #[inline]
    pub fn group(&self, class: Classification) -> Option<&GroupSummary> {
        match class {
            Classification::Healthy => self.healthy.as_ref(),
            Classification::Pathological => self.pathological.as_ref(),
        }
    }

    /// 是否所有分组都为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.healthy.is_none() && self.pathological.is_none()
    }
}

/// 按分类汇总 `records`.
pub fn summarize(records: &[SliceRecord]) -> Summary {
    let of = |class: Classification| {
        GroupSummary::from_records(records.iter().filter(|r| r.classification == class))
    };
    Summary {
        pathological: of(Classification::Pathological),
        healthy: of(Classification::Healthy),
    }
}

/// 批处理的最终结果: 全部记录以及分组统计.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    /// 全部成功处理的记录.
    pub records: Vec<SliceRecord>,

    /// 分组统计.
    pub summary: Summary,
}

impl BatchResult {
    /// 汇总 `records`.
    pub fn new(records: Vec<SliceRecord>) -> Self {
        let summary = summarize(&records);
        Self { records, summary }
    }

    /// `class` 分组中的记录.
    pub fn group(&self, class: Classification) -> impl Iterator<Item = &SliceRecord> + '_ {
        self.records.iter().filter(move |r| r.classification == class)
    }

    /// 健康组记录.
    #[inline]
    pub fn healthy(&self) -> impl Iterator<Item = &SliceRecord> + '_ {
        self.group(Classification::Healthy)
    }

    /// 病灶组记录.
    #[inline]
    pub fn pathological(&self) -> impl Iterator<Item = &SliceRecord> + '_ {
        self.group(Classification::Pathological)
    }
}
