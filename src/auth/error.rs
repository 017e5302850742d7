/// Authentication and account errors.
///
/// Messages are safe to return to clients. Store failures are wrapped in
/// [`AuthError::Internal`] and only their generic text leaves the process.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed or missing required input
    #[error("{0}")]
    BadRequest(String),
    /// Absent, invalid or expired credentials
    #[error("{0}")]
    Unauthorized(String),
    /// Duplicate registration
    #[error("{0}")]
    Conflict(String),
    /// Store or other infrastructure failure
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Generic rejection used when no credential path produced a user.
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }

    /// Uniform rejection for any token verification failure.
    pub fn invalid_token() -> Self {
        Self::Unauthorized("Invalid token".to_string())
    }
}
