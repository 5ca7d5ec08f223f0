use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::log_buffer::{LogLine, DEFAULT_LOG_CAPACITY};
use super::package_manager::PackageManager;
use super::slot::{SlotHandle, StopTicket};
use super::state::DevServerState;
use crate::config::Config;
use crate::error::AppError;

pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_DEV_SCRIPT: &str = "dev";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Retained log lines per project.
    pub log_capacity: usize,
    /// Time between SIGTERM and SIGKILL on stop.
    pub stop_grace_period: Duration,
    /// package.json script to run.
    pub dev_script: String,
    /// Only look for package manager executables here.
    pub bin_dir: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
            dev_script: DEFAULT_DEV_SCRIPT.to_string(),
            bin_dir: None,
        }
    }
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_capacity: config.log_buffer_lines,
            stop_grace_period: config.stop_grace_period,
            dev_script: config.dev_script.clone(),
            bin_dir: config.package_manager_bin_dir.clone(),
        }
    }
}

/// Process-wide registry of per-project dev servers.
///
/// The registry lock is only held to look up or create a project's slot; all
/// lifecycle work for a project happens in that project's own task, so
/// unrelated projects never wait on each other.
pub struct DevServerSupervisor {
    config: Arc<SupervisorConfig>,
    slots: TokioMutex<HashMap<String, SlotHandle>>,
}

impl DevServerSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config: Arc::new(config),
            slots: TokioMutex::new(HashMap::new()),
        }
    }

    /// Start the project's dev server unless one is already starting or running.
    ///
    /// Returns once the spawn attempt is recorded. Spawn failures are reported
    /// through the returned state (`crashed` plus a log line), not as errors.
    #[instrument(skip(self, repo_path), fields(repo_path = %repo_path.display()))]
    pub async fn start(
        &self,
        project_id: &str,
        repo_path: &Path,
        package_manager_override: Option<PackageManager>,
    ) -> Result<DevServerState, AppError> {
        let slot = self.slot_or_create(project_id).await;
        let state = slot
            .start(repo_path.to_path_buf(), package_manager_override)
            .await?;
        debug!(status = ?state.status, pid = ?state.pid, "Start handled");
        Ok(state)
    }

    /// Current snapshot; a stopped placeholder for projects never started.
    pub async fn status(&self, project_id: &str) -> Result<DevServerState, AppError> {
        match self.existing_slot(project_id).await {
            Some(slot) => slot.status(None).await,
            None => Ok(DevServerState::stopped(project_id)),
        }
    }

    /// Snapshot whose `logs` only holds lines after sequence `cursor`.
    pub async fn status_since(
        &self,
        project_id: &str,
        cursor: u64,
    ) -> Result<DevServerState, AppError> {
        match self.existing_slot(project_id).await {
            Some(slot) => slot.status(Some(cursor)).await,
            None => Ok(DevServerState::stopped(project_id)),
        }
    }

    pub async fn logs_since(&self, project_id: &str, cursor: u64) -> Result<Vec<LogLine>, AppError> {
        Ok(self.status_since(project_id, cursor).await?.logs)
    }

    /// Stop the project's dev server.
    ///
    /// Returns `false` when nothing was attached. Otherwise waits up to the
    /// grace period for a graceful exit, escalates to a kill if needed and
    /// returns `true` without waiting for the kill to be reaped.
    #[instrument(skip(self))]
    pub async fn stop(&self, project_id: &str) -> Result<bool, AppError> {
        let Some(slot) = self.existing_slot(project_id).await else {
            return Ok(false);
        };
        let Some(ticket) = slot.stop().await? else {
            debug!("No dev server process attached");
            return Ok(false);
        };

        let generation = ticket.generation;
        match timeout(self.config.stop_grace_period, ticket.exited).await {
            Ok(_) => debug!(generation, "Dev server exited within grace period"),
            Err(_) => {
                warn!(
                    generation,
                    grace_ms = self.config.stop_grace_period.as_millis() as u64,
                    "Grace period elapsed, escalating to kill"
                );
                slot.force_kill(generation)?;
            }
        }
        Ok(true)
    }

    /// Snapshots of every project that has been started, ordered by id.
    pub async fn list(&self) -> Result<Vec<DevServerState>, AppError> {
        let mut slots: Vec<(String, SlotHandle)> = {
            let slots_guard = self.slots.lock().await;
            slots_guard
                .iter()
                .map(|(id, slot)| (id.clone(), slot.clone()))
                .collect()
        };
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut states = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            states.push(slot.status(None).await?);
        }
        Ok(states)
    }

    /// Stop every attached dev server, sharing a single grace period.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let slots: Vec<SlotHandle> = self.slots.lock().await.values().cloned().collect();

        let mut pending: Vec<(SlotHandle, StopTicket)> = Vec::new();
        for slot in slots {
            match slot.stop().await {
                Ok(Some(ticket)) => pending.push((slot, ticket)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Could not stop dev server during shutdown"),
            }
        }
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "Stopping dev servers");

        let deadline = Instant::now() + self.config.stop_grace_period;
        for (slot, ticket) in pending {
            if timeout_at(deadline, ticket.exited).await.is_err() {
                let _ = slot.force_kill(ticket.generation);
            }
        }
    }

    async fn existing_slot(&self, project_id: &str) -> Option<SlotHandle> {
        self.slots.lock().await.get(project_id).cloned()
    }

    async fn slot_or_create(&self, project_id: &str) -> SlotHandle {
        let mut slots_guard = self.slots.lock().await;
        slots_guard
            .entry(project_id.to_string())
            .or_insert_with(|| SlotHandle::spawn(project_id.to_string(), self.config.clone()))
            .clone()
    }
}

impl Default for DevServerSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}
