use crate::config::LogConfig;
use crate::core::errors::{QueueError, Result};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// `<prefix>_<YYYYmmddHHMMSS>.log`
pub fn log_file_name(prefix: &str, started: DateTime<Local>) -> String {
    format!("{}_{}.log", prefix, started.format("%Y%m%d%H%M%S"))
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level`. Returns the log file path when logging
/// to a file, `None` for stdout.
pub fn init(config: &LogConfig, log_dir: &Path) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    if config.stdout {
        builder
            .try_init()
            .map_err(|e| QueueError::internal(format!("failed to install logger: {}", e)))?;
        return Ok(None);
    }

    std::fs::create_dir_all(log_dir)
        .map_err(|e| QueueError::io("create log directory", log_dir, e))?;
    let path = log_dir.join(log_file_name(&config.file_prefix, Local::now()));

    let mut options = OpenOptions::new();
    options.create(true);
    if config.append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    let file = options
        .open(&path)
        .map_err(|e| QueueError::io("open log file", &path, e))?;

    builder
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| QueueError::internal(format!("failed to install logger: {}", e)))?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(log_file_name("queue", started), "queue_20240309070501.log");
    }
}
