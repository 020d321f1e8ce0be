//! Error types for CI provisioning

/// CI provisioning error type
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("GitHub API error: {0}")]
    GitHubError(String),

    #[error("Jenkins API error: {0}")]
    JenkinsError(String),

    #[error("{0} credentials are not configured")]
    NotConfigured(&'static str),

    #[error("Instance path is not configured")]
    MissingInstancePath,
}

/// Result type alias for CI operations
pub type Result<T> = std::result::Result<T, CiError>;

impl CiError {
    pub fn github<S: Into<String>>(msg: S) -> Self {
        CiError::GitHubError(msg.into())
    }

    pub fn jenkins<S: Into<String>>(msg: S) -> Self {
        CiError::JenkinsError(msg.into())
    }
}

impl From<CiError> for berth_core::Error {
    fn from(e: CiError) -> Self {
        berth_core::Error::Integration(e.to_string())
    }
}
