//! 图像/标注切片对象的操作.

mod core;
mod save;

pub use core::{Image, Mask};

pub use save::{save_triplet, ImgWriteVis};
