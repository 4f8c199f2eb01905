//! 在整个数据集上评估粒子群阈值搜索, 并与固定阈值/Otsu 基线对照.
//!
//! 数据位置与配置见 `utils::loader` 和 `utils::config`.

use log::{error, info};
use std::process::ExitCode;

mod logging;
mod result;
mod runner;

fn main() -> ExitCode {
    if let Some(path) = logging::init().unwrap() {
        info!("Logging to `{}`", path.display());
    }

    match runner::run() {
        Ok(result) => {
            result.analyze();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
