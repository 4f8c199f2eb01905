#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 基于粒子群优化 (PSO) 为医学图像切片搜索最优二值化阈值,
//! 并在整个数据集上评估分割精度.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 输入切片是 2D 灰度图像 (jpg/png), 标注是同名的 `{name}_mask.{ext}` 图像.
//!   标注中任何非零像素都视为肿瘤 (前景).
//! 2. 搜索过程完全由外部注入的随机数源驱动. 给定相同的种子, 相同的图像与标注,
//!   相同的超参数, 搜索结果完全一致.
//! 3. 单个切片的失败 (无法读取, 形状不符, 甚至 panic) 永远不会中断整个批处理.
//!
//! # 开发计划
//!
//! ### 重叠度指标 (Dice, IoU, Precision, Recall) ✅
//!
//! 单次遍历统计交集/并集, 并严格保留 "空标注/空预测" 的四种边界情形.
//!
//! 实现位于 `pso-berry/src/metrics.rs`.
//!
//! ### 一维粒子群阈值搜索 ✅
//!
//! 纯 Rust 实现的全局最优 PSO, 不依赖任何外部优化库.
//! 搜索塌缩到边界时退化为 Otsu 全局阈值.
//!
//! 实现位于 `pso-berry/src/optim`.
//!
//! ### 单切片流水线 ✅
//!
//! 健康切片 (空标注) 跳过搜索, 病灶切片执行搜索. 两者都输出统一的 [`SliceRecord`].
//!
//! 实现位于 `pso-berry/src/slice.rs`.
//!
//! ### 批处理与失败隔离 ✅
//!
//! 固定大小的线程池, 每个任务返回带标签的成功/失败结果. 支持尽力而为的取消.
//!
//! 实现位于 `pso-berry/src/batch.rs`.
//!
//! ### 统计汇总与结果导出 ✅
//!
//! 分组 (健康/病灶) 计算均值, 总体标准差, 最小值, 最大值, 中位数;
//! 导出 JSON 汇总与按组的 CSV 表格.
//!
//! 实现位于 `pso-berry/src/stats.rs` 和 `pso-berry/src/export.rs`.
//!
//! ### 小功能 ✅
//!
//! 1. 图像预处理 (高斯模糊, 直方图均衡化, 归一化). ✅
//! 2. 数据集发现与迭代器风格的加载器. ✅
//! 3. 定性样例 (输入/标注/预测 三联图) 导出. ✅

/// 二维索引 (高, 宽), 同时也用作图像形状.
pub type Idx2d = (usize, usize);

/// 2D 图像与二值标注的基础数据结构.
mod data;

mod error;

pub use data::{save_triplet, Image, ImgWriteVis, Mask};

pub use error::{SegError, SegResult};

pub mod consts;

pub mod preprocess;

pub mod metrics;

pub mod optim;

pub mod slice;

pub use slice::{Classification, SliceOutcome, SliceProcessor, SliceRecord, ThresholdStrategy};

pub mod batch;

pub mod stats;

pub mod dataset;

pub mod export;

pub mod prelude;
