//! 图像/标注对的发现与加载.
//!
//! 图像目录中所有扩展名属于 [`IMAGE_EXTENSIONS`] 的文件都是切片图像 (按文件名排序);
//! 图像 `{name}.{ext}` 的标注为标注目录下的 `{name}_mask.{ext}`,
//! 依次尝试 [`MASK_EXTENSIONS`], 都不存在时取 `{name}_mask.jpg`.
//!
//! 提供迭代器风格的数据集获取模式.

use crate::consts::{IMAGE_EXTENSIONS, MASK_EXTENSIONS, MASK_SUFFIX};
use crate::preprocess::load_pair;
use crate::{Image, Mask, SegError, SegResult};
use std::fs;
use std::path::{Path, PathBuf};

/// 一对图像与标注文件.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlicePair {
    /// 切片标识, 即图像文件名.
    pub id: String,

    /// 图像路径.
    pub image: PathBuf,

    /// 标注路径. 文件不一定存在.
    pub mask: PathBuf,
}

impl SlicePair {
    /// 读取并预处理该对文件.
    #[inline]
    pub fn load(&self) -> SegResult<(Image, Mask)> {
        load_pair(&self.image, &self.mask)
    }
}

/// 切片标识: `path` 的文件名.
pub fn slice_id<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

fn is_mask_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(MASK_SUFFIX))
}

/// 列出 `dir` 下所有切片图像, 按文件名排序. 文件名以 `_mask` 结尾的文件不是图像.
pub fn find_images<P: AsRef<Path>>(dir: P) -> SegResult<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, &IMAGE_EXTENSIONS) && !is_mask_file(&path) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// 计算 `image` 在 `mask_dir` 下对应的标注路径.
pub fn mask_path_for<P: AsRef<Path>, Q: AsRef<Path>>(mask_dir: P, image: Q) -> PathBuf {
    let stem = image
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mask_dir = mask_dir.as_ref();

    MASK_EXTENSIONS
        .iter()
        .map(|ext| mask_dir.join(format!("{stem}{MASK_SUFFIX}.{ext}")))
        .find(|p| p.is_file())
        .unwrap_or_else(|| mask_dir.join(format!("{stem}{MASK_SUFFIX}.{}", MASK_EXTENSIONS[0])))
}

/// 发现 `image_dir` 与 `mask_dir` 下的所有图像/标注对.
///
/// 目录无法读取时返回 [`SegError::Io`], 没有任何图像时返回 [`SegError::EmptyDataset`].
pub fn discover_pairs<P: AsRef<Path>, Q: AsRef<Path>>(
    image_dir: P,
    mask_dir: Q,
) -> SegResult<Vec<SlicePair>> {
    let pairs: Vec<SlicePair> = find_images(image_dir)?
        .into_iter()
        .map(|image| SlicePair {
            id: slice_id(&image),
            mask: mask_path_for(mask_dir.as_ref(), &image),
            image,
        })
        .collect();
    if pairs.is_empty() {
        return Err(SegError::EmptyDataset);
    }
    Ok(pairs)
}

/// 从给定的图像/标注对创建加载器.
pub fn pair_loader<I: IntoIterator<Item = SlicePair>>(pairs: I) -> PairLoader {
    let mut data: Vec<SlicePair> = pairs.into_iter().collect();
    data.reverse();
    PairLoader { data_rev: data }
}

/// 图像/标注对加载器. 按顺序读取并预处理每一对文件.
#[derive(Debug)]
pub struct PairLoader {
    data_rev: Vec<SlicePair>,
}

impl Iterator for PairLoader {
    type Item = (String, SegResult<(Image, Mask)>);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.data_rev.pop()?;
        let data = pair.load();
        Some((pair.id, data))
    }
}

impl ExactSizeIterator for PairLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn touch_png(path: &Path) {
        GrayImage::from_pixel(4, 4, Luma([128])).save(path).unwrap();
    }

    #[test]
    fn test_mask_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        touch_png(&dir.path().join("b_mask.png"));

        assert_eq!(mask_path_for(dir.path(), "x/b.jpg"), dir.path().join("b_mask.png"));
        // 不存在时退回 `.jpg`.
        assert_eq!(mask_path_for(dir.path(), "a.png"), dir.path().join("a_mask.jpg"));
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let images = tempfile::tempdir().unwrap();
        let masks = tempfile::tempdir().unwrap();
        for name in ["c.png", "a.png", "b.PNG", "a_mask.png"] {
            touch_png(&images.path().join(name));
        }
        std::fs::write(images.path().join("notes.txt"), "x").unwrap();

        let pairs = discover_pairs(images.path(), masks.path()).unwrap();
        let ids: Vec<&str> = pairs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a.png", "b.PNG", "c.png"]);
        assert_eq!(pairs[0].mask, masks.path().join("a_mask.jpg"));
    }

    #[test]
    fn test_discover_empty() {
        let images = tempfile::tempdir().unwrap();
        let err = discover_pairs(images.path(), images.path()).unwrap_err();
        assert!(matches!(err, SegError::EmptyDataset));
    }

    #[test]
    fn test_loader_reports_missing_mask() {
        let images = tempfile::tempdir().unwrap();
        let masks = tempfile::tempdir().unwrap();
        touch_png(&images.path().join("a.png"));
        touch_png(&images.path().join("b.png"));
        touch_png(&masks.path().join("b_mask.png"));

        let mut loader = pair_loader(discover_pairs(images.path(), masks.path()).unwrap());
        assert_eq!(loader.len(), 2);

        let (id, a) = loader.next().unwrap();
        assert_eq!(id, "a.png");
        assert!(matches!(a, Err(SegError::MaskNotFound(_))));

        let (id, b) = loader.next().unwrap();
        assert_eq!(id, "b.png");
        let (img, mask) = b.unwrap();
        assert_eq!(img.shape(), mask.shape());
        assert_eq!(mask.count_foreground(), 16);

        assert!(loader.next().is_none());
    }
}
