//! 对 `pso-berry::dataset` 的更一层封装. 提供更直接的数据集路径与加载器.

use pso_berry::dataset::{self, SlicePair};
use pso_berry::SegResult;
use std::env;
use std::path::{Path, PathBuf};

/// 读取环境变量 `key`; 未设置或为空时返回 `None`.
fn non_empty_env(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `$HOME/dataset/{leaf}`; 无法确定主目录时为 `./dataset/{leaf}`.
fn home_or_local(leaf: &str) -> PathBuf {
    dataset::home_dataset_dir_with([leaf]).unwrap_or_else(|| Path::new("dataset").join(leaf))
}

/// 获取切片图像目录.
///
/// 1. 若环境变量 `$PSO_IMAGE_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/images`.
pub fn image_dir_from_env_or_home() -> PathBuf {
    non_empty_env("PSO_IMAGE_DIR").unwrap_or_else(|| home_or_local("images"))
}

/// 获取标注目录.
///
/// 1. 若环境变量 `$PSO_MASK_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/masks`.
pub fn mask_dir_from_env_or_home() -> PathBuf {
    non_empty_env("PSO_MASK_DIR").unwrap_or_else(|| home_or_local("masks"))
}

/// 获取结果输出目录.
///
/// 1. 若环境变量 `$PSO_OUTPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `./pso-results`.
pub fn output_dir_from_env_or_default() -> PathBuf {
    non_empty_env("PSO_OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("pso-results"))
}

/// 发现 `image_dir` 与 `mask_dir` 下的全部图像/标注对.
#[inline]
pub fn pairs<P, Q>(image_dir: P, mask_dir: Q) -> SegResult<Vec<SlicePair>>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    dataset::discover_pairs(image_dir, mask_dir)
}

/// 从 `$PSO_IMAGE_DIR`/`$PSO_MASK_DIR` (或主目录下的默认位置) 发现全部图像/标注对.
#[inline]
pub fn pairs_from_env_or_home() -> SegResult<Vec<SlicePair>> {
    pairs(image_dir_from_env_or_home(), mask_dir_from_env_or_home())
}
