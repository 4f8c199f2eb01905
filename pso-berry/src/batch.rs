//! 批处理: 把单切片流水线分发到固定大小的线程池上.
//!
//! 每个任务相互独立, 通过 channel 回传带索引的 `Result`. 任一切片的失败
//! (读取失败, 形状不符, 取消, 甚至 panic) 都只会让该切片被跳过.

use crate::dataset::SlicePair;
use crate::optim::PsoParams;
use crate::slice::{SliceProcessor, SliceRecord, ThresholdStrategy};
use crate::stats::BatchResult;
use crate::{Image, Mask, SegError, SegResult};
use log::{info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use threadpool::ThreadPool;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 获得可并行核心数.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 默认工作线程数: 可并行核心数减一, 至少为 1.
#[inline]
pub fn default_workers() -> usize {
    available_cpus().saturating_sub(1).max(1)
}

/// 第 `index` 个切片的搜索种子 (splitmix64). 与调度顺序无关.
pub fn slice_seed(seed: u64, index: usize) -> u64 {
    let step = (index as u64).wrapping_add(1);
    let mut z = seed.wrapping_add(step.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// 批处理配置.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct BatchConfig {
    /// 粒子群超参数, 其中的种子同时是整个批处理的种子.
    pub pso: PsoParams,

    /// 工作线程数. `None` 时使用 [`default_workers`].
    pub workers: Option<usize>,

    /// 病灶切片的阈值策略.
    pub strategy: ThresholdStrategy,
}

impl BatchConfig {
    /// 检查配置在结构上是否合法.
    pub fn validate(&self) -> SegResult<()> {
        self.pso.validate()?;
        if self.workers == Some(0) {
            return Err(SegError::config("worker count must be positive"));
        }
        Ok(())
    }

    /// 实际使用的工作线程数.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }
}

/// 尽力而为的取消标记. 克隆体共享同一个标记.
///
/// 设置后, 尚未开始的切片以 [`SegError::Cancelled`] 结束; 正在进行的搜索照常完成.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// 是否已请求取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 一个工作单元.
#[derive(Clone, Debug)]
pub enum WorkItem {
    /// 磁盘上的文件, 在工作线程中读取.
    Files(SlicePair),

    /// 已加载的图像与标注.
    Loaded {
        /// 切片标识.
        id: String,

        /// 图像.
        image: Image,

        /// 标注.
        mask: Mask,
    },
}

impl WorkItem {
    /// 切片标识.
    pub fn id(&self) -> &str {
        match self {
            Self::Files(pair) => &pair.id,
            Self::Loaded { id, .. } => id,
        }
    }

    fn run(self, processor: &SliceProcessor, seed: u64) -> SegResult<SliceRecord> {
        let outcome = match self {
            Self::Files(pair) => processor.process_files(pair.id, pair.image, pair.mask, seed)?,
            Self::Loaded { id, image, mask } => processor.process_seeded(id, &image, &mask, seed)?,
        };
        Ok(outcome.record)
    }
}

impl From<SlicePair> for WorkItem {
    #[inline]
    fn from(pair: SlicePair) -> Self {
        Self::Files(pair)
    }
}

impl From<(String, Image, Mask)> for WorkItem {
    #[inline]
    fn from((id, image, mask): (String, Image, Mask)) -> Self {
        Self::Loaded { id, image, mask }
    }
}

/// 被跳过的切片.
#[derive(Debug)]
pub struct Skipped {
    /// 切片标识.
    pub id: String,

    /// 原因.
    pub reason: SegError,
}

/// 批处理运行统计.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// 成功处理的切片数.
    pub processed: usize,

    /// 其中的健康切片数.
    pub healthy: usize,

    /// 其中的病灶切片数.
    pub pathological: usize,

    /// 被跳过的切片数.
    pub skipped: usize,

    /// 整个批处理的自然时间.
    pub wall_time: Duration,

    /// 所有切片处理时间之和 (包括失败的切片).
    pub busy_time: Duration,

    /// 最耗时的切片及其耗时.
    pub slowest: Option<(String, Duration)>,
}

impl BatchReport {
    /// 平均每个切片的处理时间. 没有切片时返回 `None`.
    pub fn avg_item_time(&self) -> Option<Duration> {
        match self.processed + self.skipped {
            0 => None,
            n => Some(self.busy_time / n as u32),
        }
    }
}

/// 批处理输出.
#[derive(Debug)]
pub struct BatchOutput {
    /// 成功处理的记录, 按输入顺序排列.
    pub records: Vec<SliceRecord>,

    /// 被跳过的切片, 按输入顺序排列.
    pub skipped: Vec<Skipped>,

    /// 运行统计.
    pub report: BatchReport,
}

impl BatchOutput {
    /// 汇总记录, 获得最终结果.
    #[inline]
    pub fn into_result(self) -> BatchResult {
        BatchResult::new(self.records)
    }
}

/// 工作线程回传的消息.
struct Done {
    index: usize,
    id: String,
    elapsed: Duration,
    result: SegResult<SliceRecord>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 执行 `job`, 把其中的 panic 转为 [`SegError::WorkerPanic`].
fn guarded<T, F: FnOnce() -> SegResult<T>>(job: F) -> SegResult<T> {
    panic::catch_unwind(AssertUnwindSafe(job))
        .unwrap_or_else(|p| Err(SegError::WorkerPanic(panic_message(p))))
}

/// 批处理调度器.
#[derive(Debug)]
pub struct BatchOrchestrator {
    processor: Arc<SliceProcessor>,
    workers: usize,
    seed: u64,
    cancel: CancelToken,
}

impl BatchOrchestrator {
    /// 初始化. 配置不合法时返回 [`SegError::InvalidConfig`].
    pub fn new(config: BatchConfig) -> SegResult<Self> {
        config.validate()?;
        Ok(Self {
            processor: Arc::new(SliceProcessor::new(config.pso, config.strategy)?),
            workers: config.worker_count(),
            seed: config.pso.seed,
            cancel: CancelToken::new(),
        })
    }

    /// 使用外部的取消标记.
    #[inline]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// 取消标记. 可以从其他线程调用 [`CancelToken::cancel`].
    #[inline]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 工作线程数.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 单切片处理器.
    #[inline]
    pub fn processor(&self) -> &SliceProcessor {
        &self.processor
    }

    /// 处理全部 `items`. 阻塞直到所有切片结束.
    ///
    /// 输入为空时返回 [`SegError::EmptyDataset`]; 其余失败都记录在 [`BatchOutput::skipped`] 中.
    pub fn run<I, W>(&self, items: I) -> SegResult<BatchOutput>
    where
        I: IntoIterator<Item = W>,
        W: Into<WorkItem>,
    {
        let items: Vec<WorkItem> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            return Err(SegError::EmptyDataset);
        }

        let total = items.len();
        let workers = self.workers.min(total);
        info!("Processing {total} slices on {workers} workers");

        let start = Instant::now();
        let pool = ThreadPool::new(workers);
        let (tx, rx) = mpsc::channel();
        for (index, item) in items.into_iter().enumerate() {
            let tx = tx.clone();
            let processor = Arc::clone(&self.processor);
            let cancel = self.cancel.clone();
            let seed = slice_seed(self.seed, index);

            pool.execute(move || {
                let id = item.id().to_string();
                let begin = Instant::now();
                let result = if cancel.is_cancelled() {
                    Err(SegError::Cancelled)
                } else {
                    guarded(|| item.run(&processor, seed))
                };
                // 接收端只在所有消息收齐后才关闭.
                let _ = tx.send(Done {
                    index,
                    id,
                    elapsed: begin.elapsed(),
                    result,
                });
            });
        }
        drop(tx);

        let mut done: Vec<Done> = rx.iter().collect();
        pool.join();
        done.sort_unstable_by_key(|d| d.index);

        let mut report = BatchReport::default();
        let mut records = Vec::with_capacity(done.len());
        let mut skipped = Vec::new();
        for Done {
            id, elapsed, result, ..
        } in done
        {
            report.busy_time += elapsed;
            if report.slowest.as_ref().map_or(true, |(_, d)| elapsed > *d) {
                report.slowest = Some((id.clone(), elapsed));
            }
            match result {
                Ok(record) => {
                    if record.is_healthy() {
                        report.healthy += 1;
                    } else {
                        report.pathological += 1;
                    }
                    records.push(record);
                }
                Err(reason) => {
                    warn!("Skipping `{id}`: {reason}");
                    skipped.push(Skipped { id, reason });
                }
            }
        }
        report.processed = records.len();
        report.skipped = skipped.len();
        report.wall_time = start.elapsed();

        info!(
            "Processed {} slices ({} healthy, {} pathological), skipped {}",
            report.processed, report.healthy, report.pathological, report.skipped
        );
        Ok(BatchOutput {
            records,
            skipped,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::Classification;
    use ndarray::Array2;

    fn square(n: usize, lo: usize, hi: usize) -> (Image, Mask) {
        let inside = |h: usize, w: usize| (lo..hi).contains(&h) && (lo..hi).contains(&w);
        let img = Array2::from_shape_fn((n, n), |(h, w)| {
            if inside(h, w) {
                0.85f32
            } else {
                0.15
            }
        });
        let mask = Array2::from_shape_fn((n, n), |(h, w)| u8::from(inside(h, w)));
        (Image::new(img).unwrap(), Mask::new(mask).unwrap())
    }

    fn items() -> Vec<WorkItem> {
        let (i0, m0) = square(12, 2, 6);
        let (i1, _) = square(12, 0, 0);
        let (i2, m2) = square(12, 4, 10);
        vec![
            (String::from("p0"), i0.clone(), m0).into(),
            (String::from("h1"), i1, Mask::zeros((12, 12))).into(),
            (String::from("bad"), i0, Mask::zeros((3, 3))).into(),
            (String::from("p2"), i2, m2).into(),
        ]
    }

    fn config(workers: usize) -> BatchConfig {
        BatchConfig {
            workers: Some(workers),
            ..Default::default()
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let out = BatchOrchestrator::new(config(3)).unwrap().run(items()).unwrap();

        let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["p0", "h1", "p2"]);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].id, "bad");
        assert!(matches!(out.skipped[0].reason, SegError::ShapeMismatch { .. }));

        assert_eq!(out.report.processed, 3);
        assert_eq!(out.report.healthy, 1);
        assert_eq!(out.report.pathological, 2);
        assert_eq!(out.report.skipped, 1);
        assert!(out.report.slowest.is_some());

        let result = out.into_result();
        assert_eq!(result.summary.healthy.unwrap().count, 1);
        assert_eq!(result.summary.pathological.unwrap().count, 2);
        for r in result.pathological() {
            assert!(r.threshold.is_some());
        }
    }

    #[test]
    fn test_independent_of_worker_count() {
        let a = BatchOrchestrator::new(config(1)).unwrap().run(items()).unwrap();
        let b = BatchOrchestrator::new(config(4)).unwrap().run(items()).unwrap();
        assert_eq!(a.records, b.records);
    }

    #[test]
    fn test_empty_dataset_is_fatal() {
        let err = BatchOrchestrator::new(config(2))
            .unwrap()
            .run(Vec::<WorkItem>::new())
            .unwrap_err();
        assert!(matches!(err, SegError::EmptyDataset));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_config() {
        assert!(BatchOrchestrator::new(config(0)).is_err());
        let mut c = config(1);
        c.pso.particles = 0;
        assert!(BatchOrchestrator::new(c).unwrap_err().is_fatal());
    }

    #[test]
    fn test_cancelled_before_start() {
        let batch = BatchOrchestrator::new(config(2)).unwrap();
        batch.cancel_token().cancel();
        let out = batch.run(items()).unwrap();

        assert!(out.records.is_empty());
        assert_eq!(out.skipped.len(), 4);
        assert!(out.skipped.iter().all(|s| matches!(s.reason, SegError::Cancelled)));
    }

    #[test]
    fn test_panics_become_errors() {
        let r: SegResult<()> = guarded(|| panic!("boom"));
        match r {
            Err(SegError::WorkerPanic(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(guarded(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn test_slice_seeds_differ() {
        let seeds: Vec<u64> = (0..64).map(|i| slice_seed(0, i)).collect();
        for (i, a) in seeds.iter().enumerate() {
            assert!(seeds[i + 1..].iter().all(|b| a != b));
        }
        assert_eq!(slice_seed(7, 3), slice_seed(7, 3));
        assert_ne!(slice_seed(7, 3), slice_seed(8, 3));
    }

    #[test]
    fn test_healthy_record_via_batch() {
        let out = BatchOrchestrator::new(config(2)).unwrap().run(items()).unwrap();
        let h = out.records.iter().find(|r| r.id == "h1").unwrap();
        assert_eq!(h.classification, Classification::Healthy);
        assert_eq!(h.threshold, None);
        assert_eq!(h.metrics.to_array(), [1.0; 4]);
    }
}
