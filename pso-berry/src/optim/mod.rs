//! 阈值搜索.
//!
//! 给定图像 `I` 与标注 `G`, 在 `[lo, hi]` 内搜索使 `dice(G, I > tau)` 最大的 `tau`.
//!
//! 搜索依次经历四个阶段:
//!
//! 1. 初始化: 均匀撒下粒子, 记录个体/全局最优.
//! 2. 迭代: 固定次数的粒子群更新 (见 [`Swarm::step`]).
//! 3. 收敛: 全局最优位置即候选阈值.
//! 4. 定稿: 候选阈值贴近区间两端 (默认 `<= 0.01` 或 `>= 0.99`) 时视为退化收敛,
//!   改用 [`otsu_threshold`]; 否则保留候选阈值.
//!
//! 搜索总在固定迭代次数后终止, 不会无限阻塞.

mod otsu;
mod swarm;

pub use otsu::{otsu_threshold, otsu_threshold_with_bins};
pub use swarm::{Fitness, GlobalBest, NegDice, Particle, Swarm};

use crate::consts::*;
use crate::{Image, Mask, SegError, SegResult};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 粒子群超参数. 所有值都由外部提供, 核心不硬编码任何一项.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PsoParams {
    /// 粒子数 `N`.
    pub particles: usize,

    /// 迭代次数.
    pub iterations: usize,

    /// 惯性权重 `w`.
    pub inertia: f64,

    /// 认知系数 `c1`.
    pub cognitive: f64,

    /// 社会系数 `c2`.
    pub social: f64,

    /// 阈值搜索区间 `[lo, hi]`.
    pub bounds: (f64, f64),

    /// 初始速度采样范围, 相对区间宽度.
    pub velocity_scale: f64,

    /// 随机种子.
    pub seed: u64,
}

impl Default for PsoParams {
    fn default() -> Self {
        Self {
            particles: DEFAULT_PARTICLES,
            iterations: DEFAULT_ITERATIONS,
            inertia: DEFAULT_INERTIA,
            cognitive: DEFAULT_COGNITIVE,
            social: DEFAULT_SOCIAL,
            bounds: DEFAULT_BOUNDS,
            velocity_scale: DEFAULT_VELOCITY_SCALE,
            seed: DEFAULT_SEED,
        }
    }
}

impl PsoParams {
    /// 检查参数在结构上是否合法. 不合法的参数对整个运行是致命的.
    pub fn validate(&self) -> SegResult<()> {
        if self.particles == 0 {
            return Err(SegError::config("particle count must be positive"));
        }
        if self.iterations == 0 {
            return Err(SegError::config("iteration count must be positive"));
        }
        let (lo, hi) = self.bounds;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(SegError::config(format!("invalid bounds [{lo}, {hi}]")));
        }
        if !self.inertia.is_finite() {
            return Err(SegError::config("inertia must be finite"));
        }
        for (name, c) in [("cognitive", self.cognitive), ("social", self.social)] {
            if !(c.is_finite() && c >= 0.0) {
                return Err(SegError::config(format!(
                    "{name} coefficient must be finite and non-negative, got {c}"
                )));
            }
        }
        if !(self.velocity_scale.is_finite() && self.velocity_scale >= 0.0) {
            return Err(SegError::config("velocity scale must be finite and non-negative"));
        }
        Ok(())
    }

    /// 候选阈值是否为退化收敛 (贴近区间两端).
    pub fn is_degenerate(&self, candidate: f64) -> bool {
        let (lo, hi) = self.bounds;
        let margin = DEGENERATE_MARGIN * (hi - lo);
        candidate <= lo + margin || candidate >= hi - margin
    }
}

/// 一次阈值搜索的结果.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchOutcome {
    /// 最终阈值 `tau*`, 总在搜索区间内.
    pub threshold: f64,

    /// 粒子群收敛得到的候选阈值.
    pub candidate: f64,

    /// 粒子群找到的最佳 Dice. 发生回退时不对应 `threshold`.
    pub best_dice: f64,

    /// 是否因退化收敛回退到 Otsu 阈值.
    pub fallback: bool,

    /// 完成的迭代次数.
    pub iterations: usize,
}

/// 阈值搜索器.
///
/// 搜索器本身只持有 (已校验的) 超参数; 每次搜索都创建全新的 [`Swarm`],
/// 搜索结束后丢弃. 因此同一个搜索器可以在多个线程间共享.
#[derive(Clone, Debug)]
pub struct ThresholdOptimizer {
    params: PsoParams,
}

impl ThresholdOptimizer {
    /// 初始化. 参数不合法时返回 [`SegError::InvalidConfig`].
    pub fn new(params: PsoParams) -> SegResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// 超参数.
    #[inline]
    pub fn params(&self) -> &PsoParams {
        &self.params
    }

    /// 使用外部注入的随机数源搜索.
    ///
    /// `image` 和 `reference` 形状必须一致, 否则程序 panic.
    pub fn search_with_rng<R: Rng + ?Sized>(
        &self,
        image: &Image,
        reference: &Mask,
        rng: &mut R,
    ) -> SearchOutcome {
        let fitness = NegDice::new(image, reference);

        let mut swarm = Swarm::init(&self.params, &fitness, rng);
        for _ in 0..self.params.iterations {
            swarm.step(&fitness, rng);
        }
        debug_assert_eq!(swarm.iteration(), self.params.iterations);
        let best = swarm.converge();

        self.finalize(image, best)
    }

    /// 以 `seed` 播种 [`StdRng`] 搜索.
    #[inline]
    pub fn search_seeded(&self, image: &Image, reference: &Mask, seed: u64) -> SearchOutcome {
        let mut rng = StdRng::seed_from_u64(seed);
        self.search_with_rng(image, reference, &mut rng)
    }

    /// 以参数中的种子搜索.
    #[inline]
    pub fn search(&self, image: &Image, reference: &Mask) -> SearchOutcome {
        self.search_seeded(image, reference, self.params.seed)
    }

    /// 以参数中的种子搜索, 仅返回最终阈值.
    #[inline]
    pub fn optimize(&self, image: &Image, reference: &Mask) -> f64 {
        self.search(image, reference).threshold
    }

    fn finalize(&self, image: &Image, best: GlobalBest) -> SearchOutcome {
        let (lo, hi) = self.params.bounds;
        let outcome = SearchOutcome {
            threshold: best.position,
            candidate: best.position,
            best_dice: -best.cost,
            fallback: false,
            iterations: self.params.iterations,
        };
        if !self.params.is_degenerate(best.position) {
            return outcome;
        }

        let threshold = otsu_threshold(image).clamp(lo, hi);
        debug!(
            "swarm collapsed to {:.4} (dice {:.4}), falling back to Otsu threshold {:.4}",
            best.position, outcome.best_dice, threshold
        );
        SearchOutcome {
            threshold,
            fallback: true,
            ..outcome
        }
    }
}
