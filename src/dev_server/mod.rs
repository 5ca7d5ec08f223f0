//! Dev server process management: package manager detection, bounded log
//! capture, process supervision and the per-project state machine.

pub mod log_buffer;
pub mod package_manager;
pub mod process_handle;
mod slot;
pub mod state;
pub mod supervisor;

pub use log_buffer::{LogBuffer, LogLine, LogStream, MAX_LINE_BYTES};
pub use package_manager::PackageManager;
pub use process_handle::{DevCommand, ExitOutcome, ProcessEvent, ProcessHandle, SpawnError};
pub use state::{DevServerState, DevServerStatus};
pub use supervisor::{DevServerSupervisor, SupervisorConfig};
