//! Authentication errors

use thiserror::Error;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Password rejected: {0}")]
    WeakPassword(String),

    #[error("Password hashing failed")]
    PasswordHashingFailed,

    #[error("Password verification failed")]
    PasswordVerificationFailed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status the API answers with
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::Unauthenticated => 401,
            AuthError::WeakPassword(_) => 400,
            AuthError::PasswordHashingFailed
            | AuthError::PasswordVerificationFailed
            | AuthError::Config(_)
            | AuthError::Internal(_) => 500,
        }
    }

    /// Stable numeric code for error bodies
    pub fn error_code(&self) -> i32 {
        match self {
            AuthError::InvalidCredentials => 2001,
            AuthError::TokenExpired => 2002,
            AuthError::InvalidToken => 2003,
            AuthError::Unauthenticated => 2004,
            AuthError::WeakPassword(_) => 2005,
            AuthError::PasswordHashingFailed | AuthError::PasswordVerificationFailed => 2006,
            AuthError::Config(_) | AuthError::Internal(_) => 2099,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert_eq!(AuthError::TokenExpired.status_code(), 401);
        assert_eq!(AuthError::WeakPassword("short".into()).status_code(), 400);
        assert_eq!(AuthError::PasswordHashingFailed.status_code(), 500);
    }

    #[test]
    fn test_jwt_error_mapping() {
        let expired = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature,
        );
        assert!(matches!(AuthError::from(expired), AuthError::TokenExpired));

        let bad = jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidToken);
        assert!(matches!(AuthError::from(bad), AuthError::InvalidToken));
    }
}
