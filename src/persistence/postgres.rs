//! PostgreSQL implementation of the user store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::UserStore;
use super::models::UserRow;
use crate::config::GatewayConfig;
use crate::domain::{NewUser, User, UserId, UserPatch};
use crate::error::GatewayError;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str =
    "user_id, first_name, last_name, email, phone, age, status, created_at, updated_at";

/// PostgreSQL-backed user store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the database settings in `config` and applies the
    /// embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the pool cannot connect or
    /// a migration fails.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))?;

        tracing::info!("postgres user store ready");
        Ok(Self::new(pool))
    }
}

/// Maps a database error, keeping unique violations distinguishable.
fn map_db_error(err: sqlx::Error) -> GatewayError {
    if let Some(db_err) = err.as_database_error()
        && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    {
        return GatewayError::DuplicateUser;
    }
    GatewayError::Persistence(err.to_string())
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn create(&self, user: NewUser) -> Result<User, GatewayError> {
        let user = user.normalized();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (first_name, last_name, email, phone, age, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.age)
        .bind(&user.status)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn list(&self) -> Result<Vec<User>, GatewayError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY user_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn get(&self, id: UserId) -> Result<User, GatewayError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(User::from).ok_or(GatewayError::UserNotFound(id))
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, GatewayError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
                 first_name = COALESCE($1, first_name), \
                 last_name = COALESCE($2, last_name), \
                 email = COALESCE($3, email), \
                 phone = COALESCE($4, phone), \
                 age = COALESCE($5, age), \
                 status = COALESCE($6, status), \
                 updated_at = NOW() \
             WHERE user_id = $7 RETURNING {USER_COLUMNS}"
        ))
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(patch.age)
        .bind(&patch.status)
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(User::from).ok_or(GatewayError::UserNotFound(id))
    }

    async fn delete(&self, id: UserId) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::UserNotFound(id));
        }
        Ok(())
    }
}
