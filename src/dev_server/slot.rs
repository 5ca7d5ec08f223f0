//! Per-project owner task.
//!
//! Every project that has ever been started gets one task which exclusively
//! owns its [`DevServerState`]. API calls reach it as [`SlotCommand`]s and the
//! running process reports back as [`ProcessEvent`]s, so all mutations for a
//! project are applied one at a time.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::log_buffer::{LogBuffer, LogStream};
use super::package_manager::PackageManager;
use super::process_handle::{
    DevCommand, ExitOutcome, ProcessEvent, ProcessHandle, EVENT_QUEUE_DEPTH,
};
use super::state::{DevServerState, DevServerStatus};
use super::supervisor::SupervisorConfig;
use crate::error::AppError;

pub(crate) enum SlotCommand {
    Start {
        repo_path: PathBuf,
        package_manager_override: Option<PackageManager>,
        reply: oneshot::Sender<DevServerState>,
    },
    Stop {
        reply: oneshot::Sender<Option<StopTicket>>,
    },
    ForceKill {
        generation: u64,
    },
    Status {
        since: Option<u64>,
        reply: oneshot::Sender<DevServerState>,
    },
}

/// Handed out by a stop request: resolves when that generation has exited.
pub(crate) struct StopTicket {
    pub generation: u64,
    pub exited: oneshot::Receiver<()>,
}

/// Cheap, cloneable address of a project's owner task.
#[derive(Clone)]
pub(crate) struct SlotHandle {
    project_id: String,
    commands: mpsc::UnboundedSender<SlotCommand>,
}

impl SlotHandle {
    pub fn spawn(project_id: String, config: Arc<SupervisorConfig>) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let slot = Slot {
            project_id: project_id.clone(),
            logs: LogBuffer::new(config.log_capacity),
            config,
            status: DevServerStatus::Stopped,
            package_manager: None,
            started_at: None,
            exit_code: None,
            generation: 0,
            process: None,
            exit_waiters: Vec::new(),
            events,
        };
        tokio::spawn(slot.run(commands_rx, events_rx));
        Self {
            project_id,
            commands,
        }
    }

    pub async fn start(
        &self,
        repo_path: PathBuf,
        package_manager_override: Option<PackageManager>,
    ) -> Result<DevServerState, AppError> {
        self.request(|reply| SlotCommand::Start {
            repo_path,
            package_manager_override,
            reply,
        })
        .await
    }

    pub async fn stop(&self) -> Result<Option<StopTicket>, AppError> {
        self.request(|reply| SlotCommand::Stop { reply }).await
    }

    pub async fn status(&self, since: Option<u64>) -> Result<DevServerState, AppError> {
        self.request(|reply| SlotCommand::Status { since, reply }).await
    }

    pub fn force_kill(&self, generation: u64) -> Result<(), AppError> {
        self.commands
            .send(SlotCommand::ForceKill { generation })
            .map_err(|_| self.unavailable())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SlotCommand,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| self.unavailable())?;
        response.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> AppError {
        AppError::SupervisorUnavailable(self.project_id.clone())
    }
}

struct Slot {
    project_id: String,
    config: Arc<SupervisorConfig>,
    status: DevServerStatus,
    package_manager: Option<PackageManager>,
    started_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    logs: LogBuffer,
    /// Generation of the most recent spawn attempt; events from older ones are dropped.
    generation: u64,
    /// Present exactly while status is starting, running or stopping.
    process: Option<ProcessHandle>,
    exit_waiters: Vec<oneshot::Sender<()>>,
    events: mpsc::Sender<ProcessEvent>,
}

impl Slot {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SlotCommand>,
        mut events: mpsc::Receiver<ProcessEvent>,
    ) {
        loop {
            tokio::select! {
                // Commands first: a process flooding its output must not hold up status or stop.
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }
        debug!(project_id = %self.project_id, "Dev server slot closed");
    }

    fn handle_command(&mut self, command: SlotCommand) {
        match command {
            SlotCommand::Start {
                repo_path,
                package_manager_override,
                reply,
            } => {
                let state = self.start(repo_path, package_manager_override);
                let _ = reply.send(state);
            }
            SlotCommand::Stop { reply } => {
                let ticket = self.stop();
                let _ = reply.send(ticket);
            }
            SlotCommand::ForceKill { generation } => self.force_kill(generation),
            SlotCommand::Status { since, reply } => {
                let _ = reply.send(self.snapshot(since));
            }
        }
    }

    fn start(
        &mut self,
        repo_path: PathBuf,
        package_manager_override: Option<PackageManager>,
    ) -> DevServerState {
        if !self.status.can_start() {
            debug!(project_id = %self.project_id, status = ?self.status, "Dev server already active, not spawning");
            return self.snapshot(None);
        }

        let package_manager =
            package_manager_override.unwrap_or_else(|| PackageManager::detect(&repo_path));
        self.generation += 1;
        self.logs.clear();
        self.exit_code = None;
        self.package_manager = Some(package_manager);
        self.status = DevServerStatus::Starting;

        let command = DevCommand::for_package_manager(package_manager, &self.config.dev_script);
        match ProcessHandle::spawn(
            self.generation,
            &command,
            &repo_path,
            self.config.bin_dir.as_deref(),
            self.events.clone(),
        ) {
            Ok(process) => {
                info!(
                    project_id = %self.project_id,
                    generation = self.generation,
                    pid = process.pid(),
                    %package_manager,
                    "Dev server starting"
                );
                self.started_at = Some(Utc::now());
                self.process = Some(process);
            }
            Err(e) => {
                warn!(project_id = %self.project_id, generation = self.generation, error = %e, "Dev server failed to spawn");
                self.logs
                    .push_line(LogStream::Stderr, format!("Failed to start `{}`: {}", command, e));
                self.status = DevServerStatus::Crashed;
            }
        }
        self.snapshot(None)
    }

    fn stop(&mut self) -> Option<StopTicket> {
        let process = self.process.as_ref()?;
        if self.status != DevServerStatus::Stopping {
            info!(project_id = %self.project_id, pid = process.pid(), "Stopping dev server");
            self.status = DevServerStatus::Stopping;
            process.terminate(true);
        }
        let (notify, exited) = oneshot::channel();
        self.exit_waiters.push(notify);
        Some(StopTicket {
            generation: process.generation(),
            exited,
        })
    }

    fn force_kill(&mut self, generation: u64) {
        match &self.process {
            Some(process) if process.generation() == generation => {
                warn!(project_id = %self.project_id, pid = process.pid(), "Dev server ignored graceful stop, killing");
                process.terminate(false);
            }
            _ => debug!(project_id = %self.project_id, generation, "Kill requested for a process that already exited"),
        }
    }

    fn handle_event(&mut self, event: ProcessEvent) {
        if event.generation() != self.generation {
            debug!(project_id = %self.project_id, stale = event.generation(), current = self.generation, "Dropping event from superseded process");
            return;
        }
        match event {
            ProcessEvent::Alive { .. } => self.mark_running(),
            ProcessEvent::Output { stream, chunk, .. } => {
                self.mark_running();
                self.logs.append(stream, &chunk);
            }
            ProcessEvent::Exited { outcome, .. } => self.on_exit(outcome),
            ProcessEvent::Drained { .. } => {
                if self.process.is_none() {
                    self.logs.flush();
                }
            }
        }
    }

    fn mark_running(&mut self) {
        if self.status == DevServerStatus::Starting && self.process.is_some() {
            debug!(project_id = %self.project_id, generation = self.generation, "Dev server running");
            self.status = DevServerStatus::Running;
        }
    }

    fn on_exit(&mut self, outcome: ExitOutcome) {
        let Some(process) = self.process.take() else {
            return;
        };
        if let Some(signal) = outcome.signal {
            self.logs
                .push_line(LogStream::Stderr, format!("Process terminated by signal {}", signal));
        }
        if let Some(error) = &outcome.error {
            self.logs
                .push_line(LogStream::Stderr, format!("Lost track of process: {}", error));
        }

        self.exit_code = outcome.code;
        self.status = if self.status == DevServerStatus::Stopping || outcome.success() {
            DevServerStatus::Stopped
        } else {
            DevServerStatus::Crashed
        };
        info!(
            project_id = %self.project_id,
            pid = process.pid(),
            generation = self.generation,
            exit_code = ?outcome.code,
            signal = ?outcome.signal,
            status = ?self.status,
            "Dev server exited"
        );

        for waiter in self.exit_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn snapshot(&self, since: Option<u64>) -> DevServerState {
        let logs = match since {
            Some(cursor) => self.logs.lines_after(cursor),
            None => self.logs.snapshot(),
        };
        DevServerState {
            project_id: self.project_id.clone(),
            status: self.status,
            package_manager: self.package_manager,
            pid: self.process.as_ref().map(ProcessHandle::pid),
            started_at: self.started_at,
            exit_code: self.exit_code,
            logs,
        }
    }
}
