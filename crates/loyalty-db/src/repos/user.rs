//! User repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult, DbUser};

/// User repository for registration and login lookups
#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, login: &str, password_hash: &str) -> DbResult<DbUser> {
        let user = sqlx::query_as::<_, DbUser>(
            r#"
            INSERT INTO users (id, login, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, login, password_hash, created_at
            "#
        )
        .bind(Uuid::new_v4())
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::Duplicate(_) => DbError::Duplicate(format!("Login {} already exists", login)),
            other => other,
        })?;

        Ok(user)
    }

    /// Find user by login
    pub async fn find_by_login(&self, login: &str) -> DbResult<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(
            "SELECT id, login, password_hash, created_at FROM users WHERE login = $1"
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
