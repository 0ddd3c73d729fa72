//! Database operations for alerts.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Alert;
use crate::Result;

const ALERT_COLUMNS: &str = r#"
    id, user_id, portfolio_id, alert_type, severity, title, message, is_read, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    user_id: Uuid,
    portfolio_id: Option<Uuid>,
    alert_type: String,
    severity: String,
    title: String,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        Ok(Alert {
            id: self.id,
            user_id: self.user_id,
            portfolio_id: self.portfolio_id,
            alert_type: self.alert_type.parse()?,
            severity: self.severity.parse()?,
            title: self.title,
            message: self.message,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

/// Repository for alert data. Every query is scoped to the recipient.
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, user_id, portfolio_id, alert_type, severity, title, message,
                is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(alert.id)
        .bind(alert.user_id)
        .bind(alert.portfolio_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.is_read)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Alerts for a user, newest first.
    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Alert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            ALERT_COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM alerts WHERE user_id = $1 AND is_read = FALSE")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE alerts SET is_read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns the number of alerts that changed.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query("UPDATE alerts SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
