//! Supervises per-project development servers (`npm run dev` and friends):
//! one live process per project, serialized start/stop, crash detection and
//! a bounded capture of each server's console output.

pub mod config;
pub mod dev_server;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod projects;
pub mod utils;

pub use config::Config;
pub use dev_server::{DevServerState, DevServerStatus, DevServerSupervisor, PackageManager};
pub use error::AppError;
