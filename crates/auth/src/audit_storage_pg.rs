//! PostgreSQL storage backend for audit logs.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::audit::{AuditAction, AuditEvent, AuditFilter, AuditStorage};

/// PostgreSQL-backed audit storage over the `audit_log` table.
pub struct PostgresAuditStorage {
    pool: PgPool,
}

impl PostgresAuditStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    timestamp: DateTime<Utc>,
    user_id: Option<String>,
    action: String,
    resource: String,
    details: Option<serde_json::Value>,
    success: bool,
    error: Option<String>,
}

impl AuditRow {
    fn into_event(self) -> AuditEvent {
        AuditEvent {
            id: self.id,
            timestamp: self.timestamp,
            user_id: self.user_id,
            action: AuditAction::parse(&self.action),
            resource: self.resource,
            details: self.details.unwrap_or(serde_json::Value::Null),
            success: self.success,
            error: self.error,
        }
    }
}

#[async_trait::async_trait]
impl AuditStorage for PostgresAuditStorage {
    async fn store(&self, event: &AuditEvent) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO audit_log (timestamp, user_id, action, resource, details, success, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(event.timestamp)
        .bind(&event.user_id)
        .bind(event.action.as_str())
        .bind(&event.resource)
        .bind(&event.details)
        .bind(event.success)
        .bind(&event.error)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let action = filter.action.as_ref().map(|a| a.as_str().to_string());

        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, timestamp, user_id, action, resource, details, success, error
            FROM audit_log
            WHERE ($1::text IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::bool IS NULL OR success = $3)
            ORDER BY timestamp DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.user_id)
        .bind(action)
        .bind(filter.success_only)
        .bind(filter.limit.unwrap_or(100) as i64)
        .bind(filter.offset.unwrap_or(0) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditRow::into_event).collect())
    }
}
