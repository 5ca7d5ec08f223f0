use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    StdIoError(#[from] std::io::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project {0} has no repository path configured")]
    RepoPathNotConfigured(String),

    #[error("Invalid repository path: {0}")]
    InvalidRepoPath(String),

    #[error("Invalid input argument: {0}")]
    InvalidInputArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// The task owning a project's dev server state is gone.
    #[error("Dev server supervisor unavailable for project {0}")]
    SupervisorUnavailable(String),
}

impl AppError {
    /// Errors caused by the request rather than by the manager.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AppError::ProjectNotFound(_)
                | AppError::RepoPathNotConfigured(_)
                | AppError::InvalidRepoPath(_)
                | AppError::InvalidInputArgument(_)
        )
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            _ if self.is_caller_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if self.is_caller_error() {
            tracing::debug!(error = %self, "Rejected request");
        } else {
            tracing::error!(error = ?self, "Request failed");
        }
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_classified() {
        assert!(AppError::ProjectNotFound("p".into()).is_caller_error());
        assert!(AppError::RepoPathNotConfigured("p".into()).is_caller_error());
        assert!(!AppError::SupervisorUnavailable("p".into()).is_caller_error());
    }

    #[cfg(feature = "http")]
    #[test]
    fn http_status_mapping() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let cases = [
            (AppError::ProjectNotFound("p".into()), StatusCode::NOT_FOUND),
            (AppError::RepoPathNotConfigured("p".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidRepoPath("/nope".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidInputArgument("since".into()), StatusCode::BAD_REQUEST),
            (
                AppError::SupervisorUnavailable("p".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
