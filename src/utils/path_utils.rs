use crate::error::AppError;
use std::path::PathBuf;
use tracing::debug;

/// Expands tilde (~) in a path string to the user's home directory.
/// Environment variables are not expanded; `$HOME/app` stays literal.
pub fn expand_tilde_path_buf(path_str: &str) -> Result<PathBuf, AppError> {
    if path_str.is_empty() {
        return Err(AppError::InvalidRepoPath("Repository path is empty".to_string()));
    }
    Ok(PathBuf::from(shellexpand::tilde(path_str).as_ref()))
}

/// Resolve a project's repository path to an existing, canonical directory.
pub async fn validate_repo_path(path_str: &str) -> Result<PathBuf, AppError> {
    debug!(repo_path = %path_str, "Validating repository path");
    let expanded = expand_tilde_path_buf(path_str.trim())?;
    if !expanded.is_absolute() {
        return Err(AppError::InvalidRepoPath(format!(
            "Repository path must be absolute: {}",
            expanded.display()
        )));
    }

    let metadata = tokio::fs::metadata(&expanded).await.map_err(|e| {
        AppError::InvalidRepoPath(format!("Cannot access {}: {}", expanded.display(), e))
    })?;
    if !metadata.is_dir() {
        return Err(AppError::InvalidRepoPath(format!(
            "Not a directory: {}",
            expanded.display()
        )));
    }

    // dunce keeps Windows paths free of the \\?\ prefix.
    let canonical = dunce::canonicalize(&expanded).map_err(|e| {
        AppError::InvalidRepoPath(format!("Cannot resolve {}: {}", expanded.display(), e))
    })?;
    debug!(canonical = %canonical.display(), "Repository path resolved");
    Ok(canonical)
}
