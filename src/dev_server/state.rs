use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log_buffer::LogLine;
use super::package_manager::PackageManager;

/// Lifecycle status of a project's dev server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevServerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl DevServerStatus {
    /// A process is attached (or being attached) in this status.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DevServerStatus::Starting | DevServerStatus::Running | DevServerStatus::Stopping
        )
    }

    /// `start()` may spawn a new process from this status.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Externally visible snapshot of one project's dev server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevServerState {
    pub project_id: String,
    pub status: DevServerStatus,
    pub package_manager: Option<PackageManager>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub logs: Vec<LogLine>,
}

impl DevServerState {
    /// Placeholder returned for projects that were never started.
    pub fn stopped(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            status: DevServerStatus::Stopped,
            package_manager: None,
            pid: None,
            started_at: None,
            exit_code: None,
            logs: Vec::new(),
        }
    }
}
