//! 一维全局最优粒子群.
//!
//! 状态完全保存在 [`Swarm`] 值对象中, 由调用方在一次搜索内独占;
//! 搜索之间不共享任何状态. 状态迁移由方法签名约束:
//! [`Swarm::init`] (初始化) → [`Swarm::step`] (迭代, 重复) → [`Swarm::converge`] (收敛, 消费自我).

use super::PsoParams;
use crate::metrics::Overlap;
use crate::{Image, Mask};
use rand::Rng;

/// 搜索目标. 代价越小越好.
pub trait Fitness: Sync {
    /// 位置 `x` 处的代价.
    fn cost(&self, x: f64) -> f64;
}

impl<F: Fn(f64) -> f64 + Sync> Fitness for F {
    #[inline]
    fn cost(&self, x: f64) -> f64 {
        self(x)
    }
}

/// 负 Dice: 以 `x` 为阈值二值化 `image` 后与 `reference` 的 Dice 系数取反.
#[derive(Copy, Clone, Debug)]
pub struct NegDice<'a> {
    image: &'a Image,
    reference: &'a Mask,
}

impl<'a> NegDice<'a> {
    /// 初始化. 两者形状必须一致, 否则程序 panic.
    pub fn new(image: &'a Image, reference: &'a Mask) -> Self {
        assert_eq!(image.shape(), reference.shape(), "图像和标注形状不一致");
        Self { image, reference }
    }
}

impl Fitness for NegDice<'_> {
    #[inline]
    fn cost(&self, x: f64) -> f64 {
        -Overlap::thresholded(self.reference, self.image, x).dice()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        /// 并行评估所有位置. 评估是纯函数, 顺序与结果无关.
        fn evaluate<F: Fitness>(fitness: &F, positions: &[f64]) -> Vec<f64> {
            positions.par_iter().map(|&x| fitness.cost(x)).collect()
        }
    } else {
        fn evaluate<F: Fitness>(fitness: &F, positions: &[f64]) -> Vec<f64> {
            positions.iter().map(|&x| fitness.cost(x)).collect()
        }
    }
}

/// 单个粒子.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Particle {
    /// 当前位置, 总在搜索区间内.
    pub position: f64,

    /// 当前速度.
    pub velocity: f64,

    /// 历史最优位置.
    pub best_position: f64,

    /// 历史最优代价.
    pub best_cost: f64,
}

/// 全局最优.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlobalBest {
    /// 位置.
    pub position: f64,

    /// 代价.
    pub cost: f64,
}

/// 粒子群.
#[derive(Clone, Debug)]
pub struct Swarm {
    particles: Vec<Particle>,
    best: GlobalBest,
    inertia: f64,
    cognitive: f64,
    social: f64,
    bounds: (f64, f64),

    /// 当前位置已知的代价. 仅在初始化后、第一次迭代前为 `Some`,
    /// 使第一次迭代无需重复评估初始位置.
    known_costs: Option<Vec<f64>>,

    iteration: usize,
}

impl Swarm {
    /// 初始化粒子群.
    ///
    /// 位置从 `params.bounds` 中均匀采样, 速度从
    /// `[-s * (hi - lo), s * (hi - lo)]` 中均匀采样 (`s = params.velocity_scale`).
    /// 每个粒子的历史最优即其初始位置, 全局最优为初始粒子中最好的一个 (并列时取靠前者).
    ///
    /// `params` 必须已经通过 [`PsoParams::validate`], 否则程序行为未定义.
    pub fn init<F: Fitness, R: Rng + ?Sized>(params: &PsoParams, fitness: &F, rng: &mut R) -> Self {
        let (lo, hi) = params.bounds;
        let v_max = params.velocity_scale * (hi - lo);

        let particles: Vec<Particle> = (0..params.particles)
            .map(|_| {
                let position = rng.gen_range(lo..=hi);
                let velocity = if v_max > 0.0 {
                    rng.gen_range(-v_max..=v_max)
                } else {
                    0.0
                };
                Particle {
                    position,
                    velocity,
                    best_position: position,
                    best_cost: f64::INFINITY,
                }
            })
            .collect();

        let mut swarm = Self {
            particles,
            best: GlobalBest {
                position: lo,
                cost: f64::INFINITY,
            },
            inertia: params.inertia,
            cognitive: params.cognitive,
            social: params.social,
            bounds: params.bounds,
            known_costs: None,
            iteration: 0,
        };
        let costs = evaluate(fitness, &swarm.positions());
        swarm.absorb(&costs);
        swarm.known_costs = Some(costs);
        swarm
    }

    /// 一次迭代: 评估当前位置, 更新个体/全局最优, 再按
    ///
    /// `v = w * v + c1 * r1 * (pbest - x) + c2 * r2 * (gbest - x)`
    ///
    /// 更新速度, 并将 `x + v` 截断到搜索区间内. `r1`, `r2` 对每个粒子独立地从 `[0, 1)` 采样.
    pub fn step<F: Fitness, R: Rng + ?Sized>(&mut self, fitness: &F, rng: &mut R) {
        let costs = match self.known_costs.take() {
            Some(costs) => costs,
            None => evaluate(fitness, &self.positions()),
        };
        self.absorb(&costs);

        let (lo, hi) = self.bounds;
        let g = self.best.position;
        for p in self.particles.iter_mut() {
            let r1: f64 = rng.gen();
            let r2: f64 = rng.gen();
            p.velocity = self.inertia * p.velocity
                + self.cognitive * r1 * (p.best_position - p.position)
                + self.social * r2 * (g - p.position);
            p.position = (p.position + p.velocity).clamp(lo, hi);
        }
        self.iteration += 1;
    }

    /// 结束迭代, 获得全局最优 (候选阈值).
    #[inline]
    pub fn converge(self) -> GlobalBest {
        self.best
    }

    /// 用 `costs` (与粒子一一对应) 更新个体最优与全局最优. 只接受严格更优的结果.
    fn absorb(&mut self, costs: &[f64]) {
        debug_assert_eq!(costs.len(), self.particles.len());
        for (p, &c) in self.particles.iter_mut().zip(costs) {
            if c < p.best_cost {
                p.best_cost = c;
                p.best_position = p.position;
            }
            if c < self.best.cost {
                self.best = GlobalBest {
                    position: p.position,
                    cost: c,
                };
            }
        }
    }

    /// 所有粒子的当前位置.
    #[inline]
    pub fn positions(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.position).collect()
    }

    /// 所有粒子.
    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// 当前全局最优.
    #[inline]
    pub fn best(&self) -> GlobalBest {
        self.best
    }

    /// 已完成的迭代次数.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(particles: usize) -> PsoParams {
        PsoParams {
            particles,
            ..PsoParams::default()
        }
    }

    #[test]
    fn test_init_sets_personal_and_global_best() {
        let f = |x: f64| (x - 0.3).abs();
        let mut rng = StdRng::seed_from_u64(7);
        let swarm = Swarm::init(&params(12), &f, &mut rng);

        assert_eq!(swarm.particles().len(), 12);
        for p in swarm.particles() {
            assert!((0.0..=1.0).contains(&p.position));
            assert!(p.velocity.abs() <= 0.1);
            assert_eq!(p.best_position, p.position);
            assert_eq!(p.best_cost, f(p.position));
        }
        let min_cost = swarm
            .particles()
            .iter()
            .map(|p| p.best_cost)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(swarm.best().cost, min_cost);
        assert_eq!(swarm.iteration(), 0);
    }

    #[test]
    fn test_steps_stay_in_bounds_and_never_worsen() {
        let f = |x: f64| (x - 0.9).powi(2);
        let mut p = params(8);
        p.inertia = 1.2;
        p.cognitive = 3.0;
        p.social = 3.0;
        p.bounds = (0.25, 0.75);
        let mut rng = StdRng::seed_from_u64(11);
        let mut swarm = Swarm::init(&p, &f, &mut rng);

        let mut last = swarm.best().cost;
        for _ in 0..30 {
            swarm.step(&f, &mut rng);
            assert!(swarm.best().cost <= last);
            last = swarm.best().cost;
            for q in swarm.particles() {
                assert!((0.25..=0.75).contains(&q.position));
            }
        }
        assert_eq!(swarm.iteration(), 30);
    }

    #[test]
    fn test_converges_on_smooth_target() {
        let f = |x: f64| (x - 0.42).powi(2);
        let mut rng = StdRng::seed_from_u64(3);
        let mut swarm = Swarm::init(&params(30), &f, &mut rng);
        for _ in 0..40 {
            swarm.step(&f, &mut rng);
        }
        let best = swarm.converge();
        assert!((best.position - 0.42).abs() < 1e-2, "{best:?}");
    }

    #[test]
    fn test_first_step_reuses_initial_costs() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = AtomicUsize::new(0);
        let f = |x: f64| {
            calls.fetch_add(1, Ordering::Relaxed);
            x
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut swarm = Swarm::init(&params(5), &f, &mut rng);
        assert_eq!(calls.load(Ordering::Relaxed), 5);
        swarm.step(&f, &mut rng);
        assert_eq!(calls.load(Ordering::Relaxed), 5);
        swarm.step(&f, &mut rng);
        assert_eq!(calls.load(Ordering::Relaxed), 10);
    }
}
