use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::dev_server::log_buffer::DEFAULT_LOG_CAPACITY;
use crate::dev_server::supervisor::{DEFAULT_DEV_SCRIPT, DEFAULT_STOP_GRACE_PERIOD};
use crate::utils::path_utils::expand_tilde_path_buf;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub projects_file: PathBuf,
    pub dev_script: String,
    pub stop_grace_period: Duration,
    pub log_buffer_lines: usize,
    pub package_manager_bin_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let host = var("DEVSERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = var("DEVSERVER_PORT")
            .unwrap_or_else(|| "4100".to_string())
            .parse::<u16>()
            .context("Invalid DEVSERVER_PORT")?;

        let log_level = var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let projects_file_str = var("PROJECTS_FILE").unwrap_or_else(|| "projects.json".to_string());
        let projects_file = expand_tilde_path_buf(&projects_file_str)
            .with_context(|| format!("Invalid PROJECTS_FILE: {}", projects_file_str))?;

        let dev_script = var("DEV_SCRIPT").unwrap_or_else(|| DEFAULT_DEV_SCRIPT.to_string());

        let stop_grace_period = match var("STOP_GRACE_PERIOD_MS") {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse::<u64>()
                    .context("Invalid STOP_GRACE_PERIOD_MS")?,
            ),
            None => DEFAULT_STOP_GRACE_PERIOD,
        };

        let log_buffer_lines = match var("LOG_BUFFER_LINES") {
            Some(lines) => lines
                .trim()
                .parse::<usize>()
                .context("Invalid LOG_BUFFER_LINES")?,
            None => DEFAULT_LOG_CAPACITY,
        };
        if log_buffer_lines == 0 {
            anyhow::bail!("LOG_BUFFER_LINES must be at least 1");
        }

        let package_manager_bin_dir = var("PACKAGE_MANAGER_BIN_DIR")
            .map(|dir| expand_tilde_path_buf(&dir))
            .transpose()
            .context("Invalid PACKAGE_MANAGER_BIN_DIR")?;
        if let Some(dir) = &package_manager_bin_dir {
            if !dir.is_dir() {
                anyhow::bail!("PACKAGE_MANAGER_BIN_DIR is not a directory: {:?}", dir);
            }
        }

        Ok(Config {
            host,
            port,
            log_level,
            projects_file,
            dev_script,
            stop_grace_period,
            log_buffer_lines,
            package_manager_bin_dir,
        })
    }
}
