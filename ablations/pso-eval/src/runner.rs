//! 程序运行函数.

use crate::result::{EvalResult, StrategyRun};
use pso_berry::batch::BatchConfig;
use pso_berry::export;
use pso_berry::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::mem;
use std::path::Path;
use utils::config::EvalConfig;
use utils::loader;

/// 本次评估依次运行的策略. 首个为配置中的主策略, 其后是与之不同类的基线.
fn strategies(config: &EvalConfig) -> Vec<ThresholdStrategy> {
    let main = config.batch.strategy;
    let mut plan = vec![main];
    if config.baselines {
        plan.extend(
            [ThresholdStrategy::fixed(), ThresholdStrategy::Otsu]
                .into_iter()
                .filter(|b| mem::discriminant(b) != mem::discriminant(&main)),
        );
    }
    plan
}

/// 以 `strategy` 运行一次完整的批处理.
fn run_strategy(
    base: BatchConfig,
    strategy: ThresholdStrategy,
    pairs: &[SlicePair],
) -> SegResult<(BatchResult, StrategyRun)> {
    let config = BatchConfig { strategy, ..base };
    let output = BatchOrchestrator::new(config)?.run(pairs.iter().cloned())?;
    let report = output.report.clone();
    let result = output.into_result();
    let run = StrategyRun {
        name: strategy.label(),
        report,
        summary: result.summary,
    };
    Ok((result, run))
}

/// 在 `pairs` 上按 `config` 评估, 主策略的结果导出到 `out_dir`.
fn run_with(config: &EvalConfig, pairs: &[SlicePair], out_dir: &Path) -> SegResult<EvalResult> {
    config.validate()?;
    let plan = strategies(config);
    log::info!("Main strategy `{}`", plan[0].label());

    let (result, main_run) = run_strategy(config.batch, plan[0], pairs)?;
    export::export_all(out_dir, &result, main_run.report.skipped)?;

    let mut rng = StdRng::seed_from_u64(config.batch.pso.seed);
    let k = config.qualitative_samples;
    let selected = export::choose_qualitative(&result.records, k, &mut rng);
    let samples = export::export_triplets(out_dir.join("qualitative"), pairs, &selected)?;
    log::info!("Exported {} qualitative files", samples.len());

    let mut runs = vec![main_run];
    for &strategy in &plan[1..] {
        runs.push(run_strategy(config.batch, strategy, pairs)?.1);
    }
    Ok(EvalResult::from_iter(runs))
}

/// 实际运行.
pub fn run() -> SegResult<EvalResult> {
    let config = EvalConfig::from_env_or_default()?;
    let pairs = loader::pairs_from_env_or_home()?;
    let out_dir = loader::output_dir_from_env_or_default();
    println!("Evaluating {} slices...", pairs.len());
    run_with(&config, &pairs, &out_dir)
}
