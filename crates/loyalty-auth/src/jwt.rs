//! Bearer tokens (HS256 JWT)

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Claims carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id
    pub sub: String,
    pub login: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl TokenClaims {
    pub fn user_id(&self) -> AuthResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
    issuer: String,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::Config("JWT secret is empty".to_string()));
        }
        let lifetime = Duration::from_std(config.token_lifetime)
            .map_err(|e| AuthError::Config(format!("Invalid token lifetime: {}", e)))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            lifetime,
            issuer: config.issuer.clone(),
        })
    }

    /// Issue a token for a freshly registered or logged-in user
    pub fn issue(&self, user_id: Uuid, login: &str) -> AuthResult<String> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            login: login.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))?;
        debug!(user_id = %user_id, "Issued token");
        Ok(token)
    }

    /// Check signature, expiry and issuer
    pub fn validate(&self, token: &str) -> AuthResult<TokenClaims> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
