//! 通用常量.

/// 单通道颜色.
pub mod gray {
    /// 二值标注中背景的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 二值标注中前景 (肿瘤) 的像素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        matches!(p, MASK_FOREGROUND)
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }
}

/// 重叠度指标分母中的平滑项, 仅用于避免除零.
pub const EPS: f64 = 1e-8;

/// 默认粒子数.
pub const DEFAULT_PARTICLES: usize = 30;

/// 默认迭代次数.
pub const DEFAULT_ITERATIONS: usize = 40;

/// 默认惯性权重 `w`.
pub const DEFAULT_INERTIA: f64 = 0.5;

/// 默认认知系数 `c1`.
pub const DEFAULT_COGNITIVE: f64 = 1.5;

/// 默认社会系数 `c2`.
pub const DEFAULT_SOCIAL: f64 = 1.5;

/// 默认阈值搜索区间.
pub const DEFAULT_BOUNDS: (f64, f64) = (0.0, 1.0);

/// 初始速度的采样范围 (相对搜索区间宽度). 初始速度从
/// `[-s * (hi - lo), s * (hi - lo)]` 中均匀采样.
pub const DEFAULT_VELOCITY_SCALE: f64 = 0.1;

/// 默认随机种子.
pub const DEFAULT_SEED: u64 = 0;

/// 退化判定带宽 (相对搜索区间宽度). 候选阈值落在区间两端该带宽以内时视为退化收敛.
///
/// 对默认区间 `[0, 1]` 即 `<= 0.01` 或 `>= 0.99`.
pub const DEGENERATE_MARGIN: f64 = 0.01;

/// Otsu 方法使用的直方图柱数.
pub const OTSU_BINS: usize = 256;

/// 固定阈值策略的默认阈值.
pub const DEFAULT_FIXED_THRESHOLD: f64 = 0.5;

/// 预处理高斯模糊的标准差. 等价于 5x5 核在 `sigma = 0` 时自动推导出的值.
pub const BLUR_SIGMA: f32 = 1.1;

/// 数据集中图像文件的扩展名.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "JPG", "PNG"];

/// 标注文件依次尝试的扩展名.
pub const MASK_EXTENSIONS: [&str; 4] = ["jpg", "png", "JPG", "PNG"];

/// 标注文件名后缀: `{image-basename}_mask.{ext}`.
pub const MASK_SUFFIX: &str = "_mask";

/// 默认导出的定性样例个数.
pub const DEFAULT_QUALITATIVE_SAMPLES: usize = 6;
