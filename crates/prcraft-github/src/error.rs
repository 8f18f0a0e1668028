use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GitHubError {
    /// The request may or may not have reached GitHub.
    #[error("Network error: {0}")]
    Transport(String),

    #[error("GitHub API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Token contains characters that cannot be sent in a header")]
    InvalidToken,
}

impl GitHubError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitHubError::NotFound(_))
    }

    /// True when a mutating request may have been applied despite the error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GitHubError::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            GitHubError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// The remote's own message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            GitHubError::Transport(message)
            | GitHubError::NotFound(message)
            | GitHubError::Decode(message)
            | GitHubError::InvalidRepoUrl(message) => message,
            GitHubError::Api { message, .. } => message,
            GitHubError::InvalidToken => "invalid token",
        }
    }
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GitHubError::Decode(err.to_string())
        } else {
            GitHubError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;
