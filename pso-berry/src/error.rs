//! 运行时错误.

use crate::Idx2d;
use std::path::PathBuf;

/// 切片处理, 批处理与结果导出的运行时错误.
///
/// 其中 [`SegError::InvalidConfig`] 和 [`SegError::EmptyDataset`] 对整个运行是致命的,
/// 必须在任何处理开始前返回; 其余错误都只影响单个切片.
#[derive(thiserror::Error, Debug)]
pub enum SegError {
    /// 图像或标注无法解码.
    #[error("cannot decode `{path}`: {source}")]
    UnreadableInput {
        /// 出错的文件.
        path: PathBuf,

        /// 底层解码错误.
        #[source]
        source: image::ImageError,
    },

    /// 找不到图像对应的标注文件.
    #[error("mask not found: `{0}`")]
    MaskNotFound(PathBuf),

    /// 标注无法与图像形状对应.
    #[error("shape mismatch: image {image:?}, mask {mask:?}")]
    ShapeMismatch {
        /// 图像形状 (高, 宽).
        image: Idx2d,

        /// 标注形状 (高, 宽).
        mask: Idx2d,
    },

    /// 结构上不合法的配置.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 数据集为空.
    #[error("empty dataset")]
    EmptyDataset,

    /// 批处理在该切片开始前被取消.
    #[error("cancelled before start")]
    Cancelled,

    /// 工作线程在处理该切片时 panic.
    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    /// 写出图像失败.
    #[error("cannot write image `{path}`: {source}")]
    ImageWrite {
        /// 目标文件.
        path: PathBuf,

        /// 底层编码错误.
        #[source]
        source: image::ImageError,
    },

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误.
    #[cfg(feature = "serde")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SegError {
    /// 该错误是否对整个运行致命.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::EmptyDataset)
    }

    /// 构造 [`SegError::InvalidConfig`].
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// 切片处理运行时结果.
pub type SegResult<T> = Result<T, SegError>;
