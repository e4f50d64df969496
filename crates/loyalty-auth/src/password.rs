//! Password hashing with Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

#[derive(Clone)]
pub struct PasswordService {
    config: PasswordConfig,
}

impl PasswordService {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    /// Hash `password` into a PHC string (`$argon2id$...`)
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        self.check_length(password)?;

        let peppered = self.peppered(password);
        let salt = SaltString::generate(&mut OsRng);

        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            Some(self.config.hash_length as usize),
        )
        .map_err(|e| AuthError::Config(format!("Invalid Argon2 params: {}", e)))?;

        let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::PasswordHashingFailed)?;

        Ok(hash.to_string())
    }

    /// `Ok(false)` on a wrong password, `Err` only when `hash` is unusable
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let peppered = self.peppered(password);
        let parsed = PasswordHash::new(hash).map_err(|_| AuthError::PasswordVerificationFailed)?;

        // Parameters are read back from the PHC string
        match Argon2::default().verify_password(peppered.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(AuthError::PasswordVerificationFailed),
        }
    }

    fn check_length(&self, password: &str) -> AuthResult<()> {
        let len = password.chars().count();
        if len < self.config.min_password_length {
            return Err(AuthError::WeakPassword(format!(
                "must be at least {} characters",
                self.config.min_password_length
            )));
        }
        if len > self.config.max_password_length {
            return Err(AuthError::WeakPassword(format!(
                "must be at most {} characters",
                self.config.max_password_length
            )));
        }
        Ok(())
    }

    fn peppered(&self, password: &str) -> Zeroizing<String> {
        match self.config.pepper {
            Some(ref pepper) => Zeroizing::new(format!("{}{}", password, pepper)),
            None => Zeroizing::new(password.to_string()),
        }
    }
}
