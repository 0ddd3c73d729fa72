//! PostgreSQL-backed credential store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::rbac::{AccountStatus, Role};
use crate::store::{UserFilter, UserRecord, UserStore, UserUpdate};

const USER_COLUMNS: &str = r#"
    id, email, password_hash, name, role, status, refresh_token_hash,
    last_login, created_at, updated_at
"#;

/// PostgreSQL user store over the `users` table.
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for users.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    status: String,
    refresh_token_hash: Option<String>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord> {
        let role: Role = self
            .role
            .parse()
            .with_context(|| format!("Unknown role '{}' for user {}", self.role, self.id))?;
        let status: AccountStatus = self
            .status
            .parse()
            .with_context(|| format!("Unknown status '{}' for user {}", self.status, self.id))?;

        Ok(UserRecord {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            name: self.name,
            role,
            status,
            refresh_token_hash: self.refresh_token_hash,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresUserStore {
    async fn insert(&self, user: &UserRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, name, role, status, refresh_token_hash,
                last_login, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.refresh_token_hash)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_record).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_record).transpose()
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            USER_COLUMNS
        ))
        .bind(filter.role.map(|r| r.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit.unwrap_or(100) as i64)
        .bind(filter.offset.unwrap_or(0) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_record).collect()
    }

    async fn record_login(&self, id: Uuid, refresh_token_hash: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $2, last_login = $3, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(refresh_token_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn swap_refresh_token(&self, id: Uuid, expected: &str, replacement: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $3, updated_at = NOW()
            WHERE id = $1 AND refresh_token_hash = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(replacement)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, refresh_token_hash = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<Option<UserRecord>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                role = COALESCE($3, role),
                status = COALESCE($4, status),
                refresh_token_hash = CASE
                    WHEN $4::text IS NOT NULL AND $4 <> 'ACTIVE' THEN NULL
                    ELSE refresh_token_hash
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_record).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
