use crate::core::errors::{QueueError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Logging setup for the dispatcher process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for log files, relative to the workspace root unless absolute
    pub dir: PathBuf,
    /// Log files are named `<prefix>_<YYYYmmddHHMMSS>.log`
    pub file_prefix: String,
    /// Log to stdout instead of a file
    pub stdout: bool,
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "queue".to_string(),
            stdout: false,
            level: "info".to_string(),
            append: true,
        }
    }
}

/// Queue executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Workspace root. Queue and log directories resolve against it.
    pub root: PathBuf,
    /// Directory holding one subdirectory per queue
    pub queues_dir: PathBuf,
    /// Pause between dispatcher ticks
    pub idle_delay_ms: u64,
    /// Shell used to run commands, invoked as `<shell> -c <command>`
    pub shell: String,
    /// Working directory for commands; the process's own when unset
    pub workdir: Option<PathBuf>,
    pub log: LogConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            queues_dir: PathBuf::from("queues"),
            idle_delay_ms: 2_000,
            shell: "sh".to_string(),
            workdir: None,
            log: LogConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Create a new builder for ExecutorConfig
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::new()
    }

    /// Load from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QueueError::io("read config file", path, e))?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| QueueError::yaml(path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.idle_delay_ms == 0 {
            return Err(QueueError::configuration_field(
                "idle_delay_ms must be greater than 0",
                "idle_delay_ms",
            ));
        }
        if self.shell.trim().is_empty() {
            return Err(QueueError::configuration_field(
                "shell must not be empty",
                "shell",
            ));
        }
        if self.log.file_prefix.is_empty() && !self.log.stdout {
            return Err(QueueError::configuration_field(
                "log.file_prefix must not be empty when logging to a file",
                "log.file_prefix",
            ));
        }
        Ok(())
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Directory containing all queues
    pub fn queues_path(&self) -> PathBuf {
        self.root.join(&self.queues_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.log.dir)
    }
}

/// Builder for ExecutorConfig
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
}

impl ExecutorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
        }
    }

    /// Start from an existing configuration, e.g. one loaded from a file
    pub fn from_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn queues_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.queues_dir = dir.into();
        self
    }

    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.config.idle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.config.shell = shell.into();
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.config.workdir = Some(workdir.into());
        self
    }

    pub fn log_stdout(mut self, stdout: bool) -> Self {
        self.config.log.stdout = stdout;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log.level = level.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ExecutorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ExecutorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
