//! Loyalty Authentication
//!
//! Credentials and bearer tokens for the loyalty HTTP surface:
//!
//! - **Passwords**: Argon2id hashes with a random salt and optional pepper
//! - **Tokens**: HS256 JWTs carrying the user id and login
//!
//! Users themselves are stored by `loyalty-db`; this crate never touches
//! storage.

pub mod config;
pub mod error;
pub mod jwt;
pub mod password;

pub use config::{AuthConfig, JwtConfig, PasswordConfig};
pub use error::{AuthError, AuthResult};
pub use jwt::{JwtService, TokenClaims};
pub use password::PasswordService;
