use thiserror::Error;

/// Failures reported by a [`UserStore`](super::repo::UserStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique email constraint rejected the write.
    #[error("email already registered")]
    Duplicate,

    #[error("user store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Closed set of outcomes the credential operations can fail with.
///
/// Domain failures carry the message that goes on the wire; `StoreUnavailable`
/// and `Internal` are infrastructure faults and get sanitized at the boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already exists")]
    Conflict,

    /// Unknown email and wrong password both end up here.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("user store unavailable")]
    StoreUnavailable(#[source] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AuthError::Conflict | AuthError::InvalidCredentials | AuthError::InvalidToken
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => AuthError::Conflict,
            StoreError::Unavailable(inner) => AuthError::StoreUnavailable(inner),
        }
    }
}
