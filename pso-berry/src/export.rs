//! 结果导出.
//!
//! * `summary.json`: 分组统计 (需要 `serde` feature), 以及处理/跳过计数与 unix 时间戳.
//! * `{group}_metrics.csv`: 每组一张表, 列为 `Image,Dice,IoU,Precision,Recall,Threshold`,
//!   数值保留 6 位小数, 无阈值时写 `N/A`, 按切片标识排序.
//! * 定性样例: 随机挑选若干病灶切片, 保存 "输入 | 标注 | 预测" 三联图,
//!   以及单独的预测标注 `{stem}_pred.png`.

use crate::dataset::{pair_loader, SlicePair};
use crate::slice::{Classification, SliceRecord};
use crate::stats::BatchResult;
use crate::{save_triplet, Image, ImgWriteVis, Mask, SegError, SegResult};
use itertools::Itertools;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// 汇总文件名.
pub const SUMMARY_FILE: &str = "summary.json";

/// CSV 表头.
pub const CSV_HEADER: &str = "Image,Dice,IoU,Precision,Recall,Threshold";

/// `class` 分组的 CSV 文件名.
pub fn group_csv_name(class: Classification) -> String {
    format!("{}_metrics.csv", class.name())
}

fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// 把 `records` 按切片标识排序后写成 CSV.
pub fn write_group_csv<'a, I, W>(records: I, mut w: W) -> std::io::Result<()>
where
    I: IntoIterator<Item = &'a SliceRecord>,
    W: Write,
{
    writeln!(w, "{CSV_HEADER}")?;
    for r in records.into_iter().sorted_by(|a, b| a.id.cmp(&b.id)) {
        let m = &r.metrics;
        let threshold = match r.threshold {
            Some(t) => format!("{t:.6}"),
            None => "N/A".to_string(),
        };
        writeln!(
            w,
            "{},{:.6},{:.6},{:.6},{:.6},{threshold}",
            csv_field(&r.id),
            m.dice,
            m.iou,
            m.precision,
            m.recall
        )?;
    }
    w.flush()
}

#[cfg(feature = "serde")]
mod json {
    use crate::stats::Summary;
    use serde::Serialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// `summary.json` 的内容.
    #[derive(Serialize)]
    pub(super) struct SummaryDocument<'a> {
        pub timestamp: u64,
        pub processed: usize,
        pub skipped: usize,
        #[serde(flatten)]
        pub groups: &'a Summary,
    }

    pub(super) fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

/// 写出 JSON 汇总. `skipped` 为被跳过的切片数.
#[cfg(feature = "serde")]
pub fn write_summary_json<W: Write>(result: &BatchResult, skipped: usize, w: W) -> SegResult<()> {
    let doc = json::SummaryDocument {
        timestamp: json::unix_now(),
        processed: result.records.len(),
        skipped,
        groups: &result.summary,
    };
    serde_json::to_writer_pretty(w, &doc)?;
    Ok(())
}

/// 把全部结果写进目录 `dir` (不存在时自动创建), 返回写出的文件.
///
/// 空分组不产生 CSV 文件. 未启用 `serde` feature 时不写 JSON 汇总.
pub fn export_all<P: AsRef<Path>>(
    dir: P,
    result: &BatchResult,
    skipped: usize,
) -> SegResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(3);

    #[cfg(feature = "serde")]
    {
        let path = dir.join(SUMMARY_FILE);
        write_summary_json(result, skipped, BufWriter::new(File::create(&path)?))?;
        written.push(path);
    }
    #[cfg(not(feature = "serde"))]
    let _ = skipped;

    for class in [Classification::Pathological, Classification::Healthy] {
        if result.summary.group(class).is_none() {
            continue;
        }
        let path = dir.join(group_csv_name(class));
        write_group_csv(result.group(class), BufWriter::new(File::create(&path)?))?;
        written.push(path);
    }

    info!("Wrote {} result files to `{}`", written.len(), dir.display());
    Ok(written)
}

/// 从病灶切片中随机挑选至多 `k` 个定性样例, 按切片标识排序.
pub fn choose_qualitative<'a, R: Rng + ?Sized>(
    records: &'a [SliceRecord],
    k: usize,
    rng: &mut R,
) -> Vec<&'a SliceRecord> {
    let candidates = records.iter().filter(|r| !r.is_healthy()).collect_vec();
    candidates
        .choose_multiple(rng, k)
        .copied()
        .sorted_by(|a, b| a.id.cmp(&b.id))
        .collect()
}

fn save_one(
    dir: &Path,
    record: &SliceRecord,
    image: &Image,
    reference: &Mask,
) -> SegResult<[PathBuf; 2]> {
    let prediction = match record.threshold {
        Some(t) => image.threshold(t),
        None => Mask::zeros(image.shape()),
    };
    let stem = Path::new(&record.id)
        .file_stem()
        .map_or_else(|| record.id.clone(), |s| s.to_string_lossy().into_owned());
    let triplet = dir.join(format!("{stem}_triplet.png"));
    let pred = dir.join(format!("{stem}_pred.png"));

    save_triplet(&triplet, image, reference, &prediction).map_err(|source| {
        SegError::ImageWrite {
            path: triplet.clone(),
            source,
        }
    })?;
    prediction.save(&pred).map_err(|source| SegError::ImageWrite {
        path: pred.clone(),
        source,
    })?;
    Ok([triplet, pred])
}

/// 为 `selected` 中的每条记录重新读取原始文件, 保存三联图与预测标注, 返回写出的文件.
///
/// 预测由记录中的阈值重建. 单个样例失败只记录警告.
pub fn export_triplets<P: AsRef<Path>>(
    dir: P,
    pairs: &[SlicePair],
    selected: &[&SliceRecord],
) -> SegResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let wanted = selected
        .iter()
        .filter(|r| {
            let found = pairs.iter().any(|p| p.id == r.id);
            if !found {
                warn!("No source files for qualitative sample `{}`", r.id);
            }
            found
        })
        .map(|r| (r.id.as_str(), *r))
        .collect::<HashMap<_, _>>();
    let loader = pair_loader(pairs.iter().filter(|p| wanted.contains_key(p.id.as_str())).cloned());

    let mut written = Vec::with_capacity(2 * loader.len());
    for (id, data) in loader {
        let Some(&record) = wanted.get(id.as_str()) else {
            continue;
        };
        match data.and_then(|(image, reference)| save_one(dir, record, &image, &reference)) {
            Ok(paths) => written.extend(paths),
            Err(e) => warn!("Cannot export qualitative sample `{id}`: {e}"),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(id: &str, threshold: Option<f64>) -> SliceRecord {
        SliceRecord {
            id: id.to_string(),
            metrics: Metrics {
                dice: 0.5,
                iou: 1.0 / 3.0,
                precision: 0.25,
                recall: 1.0,
            },
            threshold,
            classification: if threshold.is_some() {
                Classification::Pathological
            } else {
                Classification::Healthy
            },
        }
    }

    #[test]
    fn test_csv_rows() {
        let records = [record("b.png", Some(0.4)), record("a,1.png", None)];
        let mut buf = Vec::new();
        write_group_csv(&records, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "\"a,1.png\",0.500000,0.333333,0.250000,1.000000,N/A");
        assert_eq!(lines[2], "b.png,0.500000,0.333333,0.250000,1.000000,0.400000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_choose_qualitative() {
        let records: Vec<SliceRecord> = (0..10)
            .map(|i| record(&format!("{i}.png"), (i % 2 == 0).then_some(0.5)))
            .collect();

        let mut rng = StdRng::seed_from_u64(0);
        let picked = choose_qualitative(&records, 3, &mut rng);
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|r| !r.is_healthy()));
        assert!(picked.windows(2).all(|w| w[0].id < w[1].id));

        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(choose_qualitative(&records, 3, &mut rng), picked);

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_qualitative(&records, 100, &mut rng).len(), 5);
    }

    #[test]
    fn test_export_all_skips_empty_group() {
        let dir = tempfile::tempdir().unwrap();
        let result = BatchResult::new(vec![record("a.png", Some(0.3))]);
        let written = export_all(dir.path(), &result, 2).unwrap();

        assert!(dir.path().join("pathological_metrics.csv").is_file());
        assert!(!dir.path().join("healthy_metrics.csv").exists());
        assert!(written.iter().all(|p| p.is_file()));
    }

    #[test]
    fn test_export_triplets_and_predictions() {
        use image::{GrayImage, Luma};

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let pair = SlicePair {
            id: "s.png".to_string(),
            image: src.path().join("s.png"),
            mask: src.path().join("s_mask.png"),
        };
        GrayImage::from_fn(6, 4, |x, _| Luma([if x < 3 { 20 } else { 230 }]))
            .save(&pair.image)
            .unwrap();
        GrayImage::from_fn(6, 4, |x, _| Luma([if x < 3 { 0 } else { 255 }]))
            .save(&pair.mask)
            .unwrap();

        let found = record("s.png", Some(0.5));
        let orphan = record("gone.png", Some(0.5));
        let written = export_triplets(out.path(), &[pair], &[&found, &orphan]).unwrap();

        assert_eq!(
            written,
            [out.path().join("s_triplet.png"), out.path().join("s_pred.png")]
        );
        let pred = image::open(&written[1]).unwrap().into_luma8();
        assert_eq!(pred.dimensions(), (6, 4));
        assert_eq!(pred.get_pixel(0, 0).0[0], 0);
        assert_eq!(pred.get_pixel(5, 3).0[0], 255);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_summary_json_document() {
        let result = BatchResult::new(vec![record("a.png", Some(0.3)), record("b.png", None)]);
        let mut buf = Vec::new();
        write_summary_json(&result, 4, &mut buf).unwrap();

        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["processed"], 2);
        assert_eq!(v["skipped"], 4);
        assert!(v["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(v["pathological"]["count"], 1);
        assert!(v["healthy"]["threshold"].is_null());
        assert_eq!(v["healthy"]["dice"]["mean"], 0.5);
    }
}
