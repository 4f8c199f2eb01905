//! 实验结果.

use pso_berry::batch::BatchReport;
use pso_berry::stats::{StatSummary, Summary};
use std::io::{self, Write};
use std::time::Duration;

/// 一种阈值策略的运行结果.
#[derive(Clone, Debug)]
pub struct StrategyRun {
    /// 策略名称.
    pub name: String,

    /// 运行统计.
    pub report: BatchReport,

    /// 分组统计.
    pub summary: Summary,
}

/// 将 `run` 的结果写进 `w` 中.
fn describe_into<W: Write>(run: &StrategyRun, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn stat_to_display(s: Option<&StatSummary>) -> String {
        match s {
            Some(s) => format!(
                "{:.6} ± {:.6} (median {:.6}, range [{:.6}, {:.6}])",
                s.mean, s.std, s.median, s.min, s.max
            ),
            None => "/".to_string(),
        }
    }

    #[inline]
    fn us(d: Duration) -> u64 {
        d.as_micros() as u64
    }

    let r = &run.report;
    writeln!(w, "Profile `{}`:", run.name)?;
    writeln!(w, "{S4}Healthy slices: {}", r.healthy)?;
    writeln!(w, "{S4}Pathological slices: {}", r.pathological)?;
    writeln!(w, "{S4}Skipped slices: {}", r.skipped)?;
    writeln!(w, "{S4}Total machine time: {} us", us(r.wall_time))?;
    writeln!(w, "{S4}Summed slice time: {} us", us(r.busy_time))?;
    match r.avg_item_time() {
        Some(d) => writeln!(w, "{S4}Average slice time: {} us", us(d))?,
        None => writeln!(w, "{S4}Average slice time: /")?,
    }

    let p = run.summary.pathological.as_ref();
    writeln!(w, "{S4}Pathological dice: {}", stat_to_display(p.map(|g| &g.dice)))?;
    writeln!(w, "{S4}Pathological IoU: {}", stat_to_display(p.map(|g| &g.iou)))?;
    writeln!(
        w,
        "{S4}Pathological threshold: {}",
        stat_to_display(p.and_then(|g| g.threshold.as_ref()))
    )?;
    let h = run.summary.healthy.as_ref();
    writeln!(w, "{S4}Healthy dice: {}", stat_to_display(h.map(|g| &g.dice)))?;

    match &r.slowest {
        Some((id, d)) => write!(w, "{S4}Most time-consuming slice `{id}` costs {} us", us(*d))?,
        None => write!(w, "{S4}Most time-consuming slice costs / us")?,
    }
    Ok(())
}

/// 评估最终结果.
pub struct EvalResult {
    data: Vec<StrategyRun>,
}

impl EvalResult {
    pub fn from_iter<I: IntoIterator<Item = StrategyRun>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 各策略的运行结果, 主策略在前.
    #[inline]
    pub fn runs(&self) -> &[StrategyRun] {
        &self.data
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(1024);

        for run in self.data.iter() {
            describe_into(run, &mut buf).unwrap();
            println!("{}", String::from_utf8_lossy(&buf));
            buf.clear();

            utils::sep();
        }
    }
}
