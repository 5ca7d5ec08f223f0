use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::log_buffer::LogStream;
use super::package_manager::PackageManager;

/// How long output readers may keep draining after the process has exited.
/// Grandchildren holding the pipes open would otherwise delay the exit event forever.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Capacity of a process's event channel. Readers wait once it is full, so a
/// child writing faster than its output is consumed is slowed down instead of
/// queueing without limit.
pub const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("executable `{program}` not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spawned `{0}` but the OS reported no process id")]
    NoPid(String),
}

/// Program plus arguments for a dev server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DevCommand {
    pub fn for_package_manager(package_manager: PackageManager, script: &str) -> Self {
        Self {
            program: package_manager.command().to_string(),
            args: package_manager.run_script_args(script),
        }
    }

    /// Locate the executable, restricted to `bin_dir` when one is given.
    pub fn resolve(&self, bin_dir: Option<&Path>, cwd: &Path) -> Result<PathBuf, SpawnError> {
        let resolved = match bin_dir {
            Some(dir) => which::which_in(&self.program, Some(dir), cwd),
            None => which::which(&self.program),
        };
        resolved.map_err(|source| SpawnError::NotFound {
            program: self.program.clone(),
            source,
        })
    }
}

impl fmt::Display for DevCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM (to the whole process group on unix).
    Graceful,
    /// SIGKILL.
    Forceful,
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// Set when waiting on the child failed and the real status is unknown.
    pub error: Option<String>,
}

impl ExitOutcome {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Event emitted by a supervised process, tagged with its generation.
#[derive(Debug)]
pub enum ProcessEvent {
    /// The child has a pid and had not exited when first checked.
    Alive { generation: u64 },
    Output {
        generation: u64,
        stream: LogStream,
        chunk: Vec<u8>,
    },
    /// The process has been reaped. Output still in flight may follow.
    Exited {
        generation: u64,
        outcome: ExitOutcome,
    },
    /// Output readers are finished. Always the last event of a generation.
    Drained { generation: u64 },
}

impl ProcessEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ProcessEvent::Alive { generation }
            | ProcessEvent::Output { generation, .. }
            | ProcessEvent::Exited { generation, .. }
            | ProcessEvent::Drained { generation } => *generation,
        }
    }
}

/// One spawned dev server process.
///
/// The `Child` itself lives in a background task that reads its output, reaps
/// it and delivers termination signals, so signals are never sent to a pid
/// that has already been reaped.
#[derive(Debug)]
pub struct ProcessHandle {
    generation: u64,
    pid: u32,
    control: mpsc::UnboundedSender<Termination>,
}

impl ProcessHandle {
    /// Spawn `command` in `cwd`; output and exit are reported on `events`.
    pub fn spawn(
        generation: u64,
        command: &DevCommand,
        cwd: &Path,
        bin_dir: Option<&Path>,
        events: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self, SpawnError> {
        let program = command.resolve(bin_dir, cwd)?;

        let mut cmd = TokioCommand::new(&program);
        cmd.args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so a stop reaches the bundler the script started too.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(program = %program.display(), cwd = %cwd.display(), generation, "Spawning dev server");
        let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
            command: command.to_string(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::NoPid(command.to_string()))?;
        info!(pid, generation, command = %command, "Dev server process spawned");

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, LogStream::Stdout, generation, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, LogStream::Stderr, generation, events.clone()));
        }

        let (control, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(generation, pid, child, readers, control_rx, events));

        Ok(Self {
            generation,
            pid,
            control,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the supervising task to signal the process. Returns `false` when the
    /// process has already been reaped.
    pub fn terminate(&self, graceful: bool) -> bool {
        let termination = if graceful {
            Termination::Graceful
        } else {
            Termination::Forceful
        };
        self.control.send(termination).is_ok()
    }
}

fn spawn_reader<R>(
    mut reader: R,
    stream: LogStream,
    generation: u64,
    events: mpsc::Sender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let event = ProcessEvent::Output {
                        generation,
                        stream,
                        chunk: buf[..n].to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(generation, ?stream, error = %e, "Output stream closed with error");
                    break;
                }
            }
        }
    })
}

async fn supervise(
    generation: u64,
    pid: u32,
    mut child: Child,
    mut readers: Vec<JoinHandle<()>>,
    mut control: mpsc::UnboundedReceiver<Termination>,
    events: mpsc::Sender<ProcessEvent>,
) {
    if let Ok(None) = child.try_wait() {
        let _ = events.send(ProcessEvent::Alive { generation }).await;
    }

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(termination) = control.recv() => deliver(&mut child, pid, termination),
        }
    };

    let outcome = match status {
        Ok(status) => ExitOutcome::from_status(status),
        Err(e) => {
            warn!(pid, generation, error = %e, "Failed to wait for dev server process");
            ExitOutcome {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };
    debug!(pid, generation, exit_code = ?outcome.code, signal = ?outcome.signal, "Dev server process exited");
    let _ = events
        .send(ProcessEvent::Exited {
            generation,
            outcome,
        })
        .await;

    let drained = timeout(READER_DRAIN_TIMEOUT, async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(pid, generation, "Output still open after exit, detaching readers");
        for reader in &readers {
            reader.abort();
        }
    }
    let _ = events.send(ProcessEvent::Drained { generation }).await;
}

#[cfg(unix)]
fn deliver(child: &mut Child, pid: u32, termination: Termination) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match termination {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forceful => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => debug!(pid, ?signal, "Sent signal to process group"),
        Err(e) => {
            warn!(pid, ?signal, error = %e, "Failed to signal process group, signalling process only");
            let result = match termination {
                Termination::Graceful => {
                    nix::sys::signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                        .map_err(std::io::Error::from)
                }
                Termination::Forceful => child.start_kill(),
            };
            if let Err(e) = result {
                warn!(pid, error = %e, "Failed to signal dev server process");
            }
        }
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, pid: u32, termination: Termination) {
    // No graceful signal available; both steps end the process.
    debug!(pid, ?termination, "Killing dev server process");
    if let Err(e) = child.start_kill() {
        warn!(pid, error = %e, "Failed to kill dev server process");
    }
}
