use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Package manager used to run a project's dev script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

/// Lockfiles checked by [`PackageManager::detect`], highest priority first.
///
/// `package-lock.json` is listed for completeness; npm is also the fallback.
const LOCKFILE_MARKERS: &[(&str, PackageManager)] = &[
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("yarn.lock", PackageManager::Yarn),
    ("bun.lockb", PackageManager::Bun),
    ("bun.lock", PackageManager::Bun),
    ("package-lock.json", PackageManager::Npm),
];

impl PackageManager {
    /// Manager used when no lockfile is present.
    pub const DEFAULT: PackageManager = PackageManager::Npm;

    /// Detect the package manager from lockfiles in `project_dir`.
    ///
    /// Detection order (highest priority first):
    /// 1. `pnpm-lock.yaml` → pnpm
    /// 2. `yarn.lock` → yarn
    /// 3. `bun.lockb` / `bun.lock` → bun
    /// 4. `package-lock.json` → npm
    /// 5. Default to npm
    ///
    /// A missing or unreadable directory simply yields the default.
    pub fn detect(project_dir: &Path) -> Self {
        LOCKFILE_MARKERS
            .iter()
            .find(|(marker, _)| project_dir.join(marker).is_file())
            .map(|(_, manager)| *manager)
            .unwrap_or(Self::DEFAULT)
    }

    /// Executable name for this package manager.
    pub fn command(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    /// Arguments that run the package.json script `script`.
    pub fn run_script_args(&self, script: &str) -> Vec<String> {
        vec!["run".to_string(), script.to_string()]
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

impl FromStr for PackageManager {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "npm" => Ok(PackageManager::Npm),
            "yarn" => Ok(PackageManager::Yarn),
            "pnpm" => Ok(PackageManager::Pnpm),
            "bun" => Ok(PackageManager::Bun),
            _ => Err(anyhow::anyhow!("Unknown package manager: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn detect_defaults_to_npm_without_lockfile() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Npm);
    }

    #[test]
    fn detect_pnpm() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("pnpm-lock.yaml")).unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Pnpm);
    }

    #[test]
    fn detect_yarn() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("yarn.lock")).unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Yarn);
    }

    #[test]
    fn detect_bun_either_lockfile() {
        let binary = TempDir::new().unwrap();
        File::create(binary.path().join("bun.lockb")).unwrap();
        assert_eq!(PackageManager::detect(binary.path()), PackageManager::Bun);

        let text = TempDir::new().unwrap();
        File::create(text.path().join("bun.lock")).unwrap();
        assert_eq!(PackageManager::detect(text.path()), PackageManager::Bun);
    }

    #[test]
    fn pnpm_wins_over_yarn_and_npm() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("package-lock.json")).unwrap();
        File::create(temp_dir.path().join("yarn.lock")).unwrap();
        File::create(temp_dir.path().join("pnpm-lock.yaml")).unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Pnpm);
    }

    #[test]
    fn lockfile_directory_is_not_a_marker() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("yarn.lock")).unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Npm);
    }

    #[test]
    fn detect_missing_directory_does_not_panic() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");
        assert_eq!(PackageManager::detect(&missing), PackageManager::DEFAULT);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("PNPM".parse::<PackageManager>().unwrap(), PackageManager::Pnpm);
        assert_eq!(" yarn ".parse::<PackageManager>().unwrap(), PackageManager::Yarn);
        assert!("cargo".parse::<PackageManager>().is_err());
        assert_eq!(PackageManager::Bun.to_string(), "bun");
        assert_eq!(
            serde_json::to_string(&PackageManager::Pnpm).unwrap(),
            "\"pnpm\""
        );
    }

    #[test]
    fn run_script_args() {
        assert_eq!(PackageManager::Yarn.run_script_args("dev"), vec!["run", "dev"]);
    }
}
