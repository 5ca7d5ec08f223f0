//! Project lookup: where a project's repository lives and which package
//! manager it pins, if any.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dev_server::PackageManager;
use crate::error::AppError;
use crate::utils::path_utils::validate_repo_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repo_path: Option<String>,
    #[serde(default)]
    pub package_manager: Option<PackageManager>,
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find(&self, project_id: &str) -> Result<Option<Project>, AppError>;
}

/// Read-only project catalogue loaded from a JSON array.
#[derive(Debug, Default)]
pub struct JsonProjectRepository {
    projects: HashMap<String, Project>,
}

impl JsonProjectRepository {
    pub fn from_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        Self {
            projects: projects
                .into_iter()
                .map(|project| (project.id.clone(), project))
                .collect(),
        }
    }

    /// Load the catalogue; a missing file is an empty catalogue.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Projects file not found, starting with no projects");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let projects: Vec<Project> = serde_json::from_str(&contents)?;
        info!(path = %path.display(), count = projects.len(), "Loaded projects");
        Ok(Self::from_projects(projects))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[async_trait]
impl ProjectRepository for JsonProjectRepository {
    async fn find(&self, project_id: &str) -> Result<Option<Project>, AppError> {
        Ok(self.projects.get(project_id).cloned())
    }
}

/// Where and how to launch a project's dev server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub repo_path: PathBuf,
    pub package_manager: Option<PackageManager>,
}

/// Look up a project and validate its repository path.
pub async fn resolve_launch(
    projects: &dyn ProjectRepository,
    project_id: &str,
) -> Result<LaunchTarget, AppError> {
    let project = projects
        .find(project_id)
        .await?
        .ok_or_else(|| AppError::ProjectNotFound(project_id.to_string()))?;

    let repo_path = project
        .repo_path
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .ok_or_else(|| AppError::RepoPathNotConfigured(project_id.to_string()))?;

    Ok(LaunchTarget {
        repo_path: validate_repo_path(repo_path).await?,
        package_manager: project.package_manager,
    })
}
