//! Authentication configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Development signing secret, refused outside dev mode
pub const DEV_JWT_SECRET: &str = "loyalty-dev-secret-change-me";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

/// JWT token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// HMAC signing secret (at least 32 bytes outside dev mode)
    pub secret: String,
    /// Token lifetime, e.g. `"24h"`
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
    /// `iss` claim, checked on validation
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: DEV_JWT_SECRET.to_string(),
            token_lifetime: Duration::from_secs(24 * 60 * 60),
            issuer: "loyalty".to_string(),
        }
    }
}

impl JwtConfig {
    pub fn uses_dev_secret(&self) -> bool {
        self.secret == DEV_JWT_SECRET
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
    /// Output length in bytes
    pub hash_length: u32,
    /// Appended to every password before hashing
    pub pepper: Option<String>,
    pub min_password_length: usize,
    pub max_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            pepper: None,
            min_password_length: 1,
            max_password_length: 128,
        }
    }
}
