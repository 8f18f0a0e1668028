use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use prcraft_github::{AccessError, CommitError, GitHubError};
use prcraft_storage::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Cannot access repository: {message}")]
    RepoAccess { message: String, user: String },

    #[error("{0}")]
    BranchCreate(String),

    #[error("Failed to apply patch: {0}")]
    PatchParse(String),

    #[error("{0}")]
    Commit(#[from] CommitError),

    #[error("GitHub error: {0}")]
    Remote(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Maps a branch creation failure to a message that tells the user what
    /// to do about it.
    pub fn branch_create(branch: &str, err: &GitHubError) -> Self {
        let lowered = err.to_string().to_lowercase();
        let message = if lowered.contains("resource not accessible") {
            format!(
                "GitHub token lacks permission to create branches. \
                 Please ensure your token has 'repo' scope (not just 'public_repo'). \
                 Error: {err}"
            )
        } else if lowered.contains("already exists") {
            format!("Branch '{branch}' already exists. Please try again or use a different task.")
        } else {
            format!("Failed to create branch '{branch}': {err}")
        };
        ApiError::BranchCreate(message)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Auth(e) => ApiError::Auth(format!("Token validation failed: {e}")),
            AccessError::RepoAccess { user, message } => ApiError::RepoAccess { message, user },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type, user) = match self {
            ApiError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg, "auth_error", None),
            ApiError::RepoAccess { message, user } => (
                StatusCode::FORBIDDEN,
                format!("Cannot access repository: {}", message),
                "repo_access_denied",
                Some(user),
            ),
            ApiError::BranchCreate(msg) => {
                (StatusCode::FORBIDDEN, msg, "branch_create_denied", None)
            }
            ApiError::PatchParse(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to apply patch - {}", msg),
                "patch_parse_error",
                None,
            ),
            ApiError::Commit(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "commit_failed",
                None,
            ),
            ApiError::Remote(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("GitHub error: {}", msg),
                "remote_error",
                None,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found", None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request", None),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", msg),
                "internal_error",
                None,
            ),
        };

        let mut error = json!({
            "message": message,
            "type": error_type
        });
        if let Some(user) = user {
            error["user"] = json!(user);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
