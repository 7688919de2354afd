use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use tracing::level_filters::LevelFilter;

use crate::utils::dir::{create_application_default_path, create_application_path};

/// Window used to coalesce writes of today's sessions.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Roughly one display frame.
pub const DEFAULT_FRAME: Duration = Duration::from_millis(16);

pub const ENTRIES_DIR: &str = "entries";
pub const LOGS_DIR: &str = "logs";

/// Runtime settings assembled from command line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_dir: PathBuf,
    pub debounce: Duration,
    pub frame: Duration,
    pub log_level: Option<LevelFilter>,
    pub log_console: bool,
}

impl Config {
    pub fn new(app_dir: Option<PathBuf>) -> Result<Self> {
        let app_dir = match app_dir {
            Some(dir) => create_application_path(dir)?,
            None => create_application_default_path()?,
        };
        Ok(Self {
            app_dir,
            debounce: DEFAULT_DEBOUNCE,
            frame: DEFAULT_FRAME,
            log_level: None,
            log_console: false,
        })
    }

    pub fn entries_dir(&self) -> PathBuf {
        self.app_dir.join(ENTRIES_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.app_dir.join(LOGS_DIR)
    }

    pub fn with_debounce(self, debounce: Duration) -> Self {
        Self { debounce, ..self }
    }

    pub fn with_logging(self, log_level: Option<LevelFilter>, log_console: bool) -> Self {
        Self {
            log_level,
            log_console,
            ..self
        }
    }
}
