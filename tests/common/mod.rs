#![allow(dead_code)]

use devserver_manager::dev_server::{DevServerState, DevServerStatus, DevServerSupervisor, SupervisorConfig};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// A directory of fake package manager executables plus a project repo.
pub struct Sandbox {
    pub bin: TempDir,
    pub repo: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            bin: TempDir::new().unwrap(),
            repo: TempDir::new().unwrap(),
        }
    }

    /// Install `name` as a shell script running `body`.
    #[cfg(unix)]
    pub fn package_manager(&self, name: &str, body: &str) -> &Self {
        use std::os::unix::fs::PermissionsExt;

        let path = self.bin.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        self
    }

    pub fn lockfile(&self, name: &str) -> &Self {
        std::fs::write(self.repo.path().join(name), "").unwrap();
        self
    }

    pub fn repo_path(&self) -> &Path {
        self.repo.path()
    }

    pub fn supervisor(&self) -> DevServerSupervisor {
        self.supervisor_with(|_| {})
    }

    pub fn supervisor_with(&self, tweak: impl FnOnce(&mut SupervisorConfig)) -> DevServerSupervisor {
        let mut config = SupervisorConfig {
            bin_dir: Some(self.bin.path().to_path_buf()),
            ..Default::default()
        };
        tweak(&mut config);
        DevServerSupervisor::new(config)
    }
}

/// Poll until `predicate` holds, panicking after ten seconds.
pub async fn wait_for<F>(supervisor: &DevServerSupervisor, project_id: &str, predicate: F) -> DevServerState
where
    F: Fn(&DevServerState) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let state = supervisor.status(project_id).await.unwrap();
        if predicate(&state) {
            return state;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting on {}: last state {:?}", project_id, state);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn wait_for_status(
    supervisor: &DevServerSupervisor,
    project_id: &str,
    status: DevServerStatus,
) -> DevServerState {
    wait_for(supervisor, project_id, |state| state.status == status).await
}

pub fn log_texts(state: &DevServerState) -> Vec<String> {
    state.logs.iter().map(|line| line.text.clone()).collect()
}
