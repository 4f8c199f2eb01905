use crate::consts::gray::*;
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView2, Ix2};
use std::borrow::Cow;
use std::ops::Index;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 拥有所有权的二维灰度图像, 像素值归一化到 `[0, 1]`.
///
/// 图像由预处理产生, 之后不可变.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    data: Array2<f32>,
}

impl Image {
    /// 直接初始化.
    ///
    /// 如果任一维度为 0, 或存在 `[0, 1]` 以外的像素 (包括 NaN), 则返回 `None`.
    pub fn new(data: Array2<f32>) -> Option<Self> {
        let valid = data.nrows() > 0
            && data.ncols() > 0
            && data.iter().all(|p| (0.0..=1.0).contains(p));
        valid.then_some(Self { data })
    }

    /// 从行优先存储的像素构造图像. 像素个数与形状不符时返回 `None`.
    pub fn from_shape_vec(shape: Idx2d, pixels: Vec<f32>) -> Option<Self> {
        Array2::from_shape_vec(shape, pixels).ok().and_then(Self::new)
    }

    /// 以 `tau` 为阈值二值化: **严格大于** `tau` 的像素为前景.
    pub fn threshold(&self, tau: f64) -> Mask {
        Mask {
            data: self
                .data
                .mapv(|p| if f64::from(p) > tau { MASK_FOREGROUND } else { MASK_BACKGROUND }),
        }
    }

    /// 获得 (最小像素值, 最大像素值).
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)))
    }
}

/// 拥有所有权的二维二值标注, 像素只取 [`MASK_BACKGROUND`] 或 [`MASK_FOREGROUND`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    data: Array2<u8>,
}

impl Mask {
    /// 直接初始化.
    ///
    /// 如果任一维度为 0, 或存在 0/1 以外的像素, 则返回 `None`.
    pub fn new(data: Array2<u8>) -> Option<Self> {
        let valid = data.nrows() > 0
            && data.ncols() > 0
            && data.iter().all(|&p| is_foreground(p) || is_background(p));
        valid.then_some(Self { data })
    }

    /// 将任意灰度数组二值化: 大于 0 的像素为前景.
    ///
    /// 如果任一维度为 0, 则返回 `None`.
    pub fn binarize(raw: ArrayView2<u8>) -> Option<Self> {
        if raw.nrows() == 0 || raw.ncols() == 0 {
            return None;
        }
        Some(Self {
            data: raw.mapv(|p| u8::from(p > 0)),
        })
    }

    /// 从行优先存储的像素构造标注. 像素个数与形状不符或存在非 0/1 像素时返回 `None`.
    pub fn from_shape_vec(shape: Idx2d, pixels: Vec<u8>) -> Option<Self> {
        Array2::from_shape_vec(shape, pixels).ok().and_then(Self::new)
    }

    /// 全背景标注.
    #[inline]
    pub fn zeros(shape: Idx2d) -> Self {
        Self {
            data: Array2::zeros(shape),
        }
    }

    /// 前景像素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&p| is_foreground(p)).count()
    }

    /// 该图是否为全背景图?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }
}

/// 图像与标注共用的不可变方法集合.
macro_rules! impl_slice_immut {
    ($($slice: ty => $pix: ty),+) => {
        $(
            impl $slice {
                /// 获得底层数据的一份不可变 shallow copy.
                #[inline]
                pub fn view(&self) -> ArrayView2<$pix> {
                    self.data.view()
                }

                /// 直接获得底层数据.
                #[inline]
                pub fn into_raw(self) -> Array2<$pix> {
                    self.data
                }

                /// 获取可以迭代像素的迭代器.
                #[inline]
                pub fn iter(&self) -> Iter<'_, $pix, Ix2> {
                    self.data.iter()
                }

                /// 以行优先规则, 获取能迭代所有 `(索引, 像素值)` 的迭代器.
                #[inline]
                pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &$pix)> {
                    self.data.indexed_iter()
                }

                /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
                #[inline]
                pub fn get(&self, pos: Idx2d) -> Option<&$pix> {
                    self.data.get(pos)
                }

                /// 分辨率 (高, 宽).
                #[inline]
                pub fn shape(&self) -> Idx2d {
                    self.data.dim()
                }

                /// 像素个数.
                #[inline]
                pub fn size(&self) -> usize {
                    let (h, w) = self.shape();
                    h * w
                }

                /// 高.
                #[inline]
                pub fn height(&self) -> usize {
                    self.shape().0
                }

                /// 宽.
                #[inline]
                pub fn width(&self) -> usize {
                    self.shape().1
                }

                /// 获得行优先存储的序列化数据.
                /// 当原始数据本身就是行优先格式时, 可以避免一次 deepcopy.
                pub fn as_row_major_slice(&self) -> Cow<[$pix]> {
                    match self.data.as_slice() {
                        Some(s) => Cow::Borrowed(s),
                        None => Cow::Owned(self.data.iter().copied().collect()),
                    }
                }
            }

            impl Index<Idx2d> for $slice {
                type Output = $pix;

                #[inline]
                fn index(&self, index: Idx2d) -> &Self::Output {
                    &self.data[index]
                }
            }
        )+
    };
}

impl_slice_immut!(Image => f32, Mask => u8);
