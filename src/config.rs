use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::storage::{DEFAULT_PAGE_SIZE, DEFAULT_PAGES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid config: {0} must be greater than zero")]
    ZeroValue(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Storage engine settings. Missing fields take their defaults when loaded
/// from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_buffer_pool_pages")]
    pub buffer_pool_pages: usize,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_buffer_pool_pages() -> usize {
    DEFAULT_PAGES
}

fn default_lock_timeout_ms() -> u64 {
    100
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            buffer_pool_pages: default_buffer_pool_pages(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl DbConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: DbConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroValue("page_size"));
        }
        if self.buffer_pool_pages == 0 {
            return Err(ConfigError::ZeroValue("buffer_pool_pages"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("lock_timeout_ms"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
