//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx2d;

pub use crate::data::{save_triplet, Image, ImgWriteVis, Mask};
pub use crate::error::{SegError, SegResult};

pub use crate::consts::gray::{BLACK, MASK_BACKGROUND, MASK_FOREGROUND, WHITE};
pub use crate::consts::EPS;

pub use crate::metrics::{Metrics, Overlap};
pub use crate::optim::{PsoParams, SearchOutcome, ThresholdOptimizer};
pub use crate::slice::{
    Classification, SliceOutcome, SliceProcessor, SliceRecord, ThresholdStrategy,
};

pub use crate::batch::{
    BatchConfig, BatchOrchestrator, BatchOutput, BatchReport, CancelToken, Skipped, WorkItem,
};
pub use crate::stats::{summarize, BatchResult, GroupSummary, StatSummary, Summary};

pub use crate::dataset::{self, discover_pairs, home_dataset_dir_with, pair_loader, SlicePair};
pub use crate::preprocess::{load_image, load_mask, load_pair};
