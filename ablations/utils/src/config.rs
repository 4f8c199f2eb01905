//! 评估运行的配置.
//!
//! 默认值即数据集评估的标准设置; 若环境变量 `$PSO_CONFIG` 指向一个 JSON 文件,
//! 则以其中出现的字段覆盖默认值, 例如:
//!
//! ```json
//! {
//!     "batch": { "pso": { "particles": 50, "seed": 7 }, "workers": 4 },
//!     "qualitative_samples": 10
//! }
//! ```

use pso_berry::batch::BatchConfig;
use pso_berry::consts::DEFAULT_QUALITATIVE_SAMPLES;
use pso_berry::{SegError, SegResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// 评估运行配置.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// 批处理配置.
    pub batch: BatchConfig,

    /// 导出的定性样例个数.
    pub qualitative_samples: usize,

    /// 是否同时运行固定阈值与 Otsu 基线作为对照.
    pub baselines: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            qualitative_samples: DEFAULT_QUALITATIVE_SAMPLES,
            baselines: true,
        }
    }
}

impl EvalConfig {
    /// 从 JSON 文件读取, 并检查其合法性.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// 若 `$PSO_CONFIG` 非空则从该文件读取, 否则使用默认值.
    pub fn from_env_or_default() -> SegResult<Self> {
        match env::var_os("PSO_CONFIG").filter(|v| !v.is_empty()) {
            Some(path) => {
                log::info!("Loading configuration from `{}`", Path::new(&path).display());
                Self::from_json_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// 检查配置的合法性.
    pub fn validate(&self) -> SegResult<()> {
        self.batch.validate()?;
        if self.qualitative_samples > 1000 {
            return Err(SegError::InvalidConfig(format!(
                "too many qualitative samples: {}",
                self.qualitative_samples
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pso_berry::ThresholdStrategy;
    use std::io::Write;

    #[test]
    fn test_partial_json_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(
            br#"{
                "batch": { "pso": { "particles": 12, "seed": 9 }, "workers": 2 },
                "baselines": false
            }"#,
        )
        .unwrap();

        let c = EvalConfig::from_json_file(f.path()).unwrap();
        assert_eq!(c.batch.pso.particles, 12);
        assert_eq!(c.batch.pso.seed, 9);
        assert_eq!(c.batch.pso.iterations, 40);
        assert_eq!(c.batch.workers, Some(2));
        assert!(!c.baselines);
        assert_eq!(c.qualitative_samples, DEFAULT_QUALITATIVE_SAMPLES);
    }

    #[test]
    fn test_strategy_from_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"batch": {"strategy": "otsu"}}"#).unwrap();
        let c = EvalConfig::from_json_file(f.path()).unwrap();
        assert_eq!(c.batch.strategy, ThresholdStrategy::Otsu);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"batch": {"strategy": {"fixed": 0.3}}}"#).unwrap();
        let c = EvalConfig::from_json_file(f.path()).unwrap();
        assert_eq!(c.batch.strategy, ThresholdStrategy::Fixed(0.3));
    }

    #[test]
    fn test_invalid_json_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"batch": {{"pso": {{"bounds": [0.8, 0.2]}}}}}}"#).unwrap();
        let err = EvalConfig::from_json_file(f.path()).unwrap_err();
        assert!(err.is_fatal());
    }
}
