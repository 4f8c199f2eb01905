//! 日志初始化.
//!
//! 终端输出交给 `simple_logger` (默认 `Info`, 可由 `RUST_LOG` 覆盖),
//! 同时把同样的记录逐行追加到 `logs/pso_{unix 秒}.log`.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use simple_logger::SimpleLogger;
use std::fs::{self, File};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 日志文件目录.
pub const LOG_DIR: &str = "logs";

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// 终端 + 文件的双路日志.
struct TeeLogger {
    console: SimpleLogger,
    file: Mutex<LineWriter<File>>,
}

impl TeeLogger {
    fn new(console: SimpleLogger, file: File) -> Self {
        Self {
            console,
            file: Mutex::new(LineWriter::new(file)),
        }
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.console.log(record);
        if let Ok(mut f) = self.file.lock() {
            // 写文件失败不应影响运行.
            let _ = writeln!(
                f,
                "{} {:<5} [{}] {}",
                since_epoch().as_millis(),
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Ok(mut f) = self.file.lock() {
            let _ = f.flush();
        }
    }
}

fn open_log_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("pso_{}.log", since_epoch().as_secs()));
    let file = File::options().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// 安装全局日志器, 返回日志文件路径.
///
/// 日志文件无法创建时只输出到终端, 并返回 `None`.
pub fn init() -> Result<Option<PathBuf>, SetLoggerError> {
    let console = SimpleLogger::new().with_level(LevelFilter::Info).env();
    match open_log_file(Path::new(LOG_DIR)) {
        Ok((path, file)) => {
            log::set_max_level(console.max_level());
            log::set_boxed_logger(Box::new(TeeLogger::new(console, file)))?;
            Ok(Some(path))
        }
        Err(e) => {
            console.init()?;
            log::warn!("Cannot open log file in `{LOG_DIR}`: {e}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_records_reach_file() {
        let dir = tempfile::tempdir().unwrap();
        let (path, file) = open_log_file(dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("pso_"));

        let console = SimpleLogger::new().with_level(LevelFilter::Info);
        let logger = TeeLogger::new(console, file);
        logger.log(
            &Record::builder()
                .args(format_args!("processed {} slices", 3))
                .level(Level::Info)
                .target("pso_eval")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("hidden"))
                .level(Level::Debug)
                .target("pso_eval")
                .build(),
        );
        logger.flush();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("INFO  [pso_eval] processed 3 slices"));
        assert!(!text.contains("hidden"));
    }
}
