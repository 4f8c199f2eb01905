//! 2D 切片数据: 归一化灰度图像与二值标注.

pub mod slice;

pub use slice::{save_triplet, Image, ImgWriteVis, Mask};
