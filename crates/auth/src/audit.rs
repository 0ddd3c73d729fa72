//! Audit logging for authentication and account administration.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Types of auditable actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Authentication
    Register,
    Login,
    LoginFailed,
    Logout,
    TokenRefresh,
    TokenRefreshRejected,
    PasswordChanged,

    // User administration
    UserCreated,
    UserUpdated,
    UserDeleted,

    // Other
    Custom(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::Register => "register",
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::TokenRefresh => "token_refresh",
            AuditAction::TokenRefreshRejected => "token_refresh_rejected",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::UserCreated => "user_created",
            AuditAction::UserUpdated => "user_updated",
            AuditAction::UserDeleted => "user_deleted",
            AuditAction::Custom(name) => name,
        }
    }

    pub fn parse(action: &str) -> Self {
        match action {
            "register" => AuditAction::Register,
            "login" => AuditAction::Login,
            "login_failed" => AuditAction::LoginFailed,
            "logout" => AuditAction::Logout,
            "token_refresh" => AuditAction::TokenRefresh,
            "token_refresh_rejected" => AuditAction::TokenRefreshRejected,
            "password_changed" => AuditAction::PasswordChanged,
            "user_created" => AuditAction::UserCreated,
            "user_updated" => AuditAction::UserUpdated,
            "user_deleted" => AuditAction::UserDeleted,
            other => AuditAction::Custom(other.to_string()),
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// User who performed the action (if known).
    pub user_id: Option<String>,
    pub action: AuditAction,
    /// Resource that was affected, e.g. `user/<id>`.
    pub resource: String,
    pub details: serde_json::Value,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn builder(action: AuditAction, resource: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder {
            action,
            resource: resource.into(),
            user_id: None,
            details: serde_json::Value::Null,
            success: true,
            error: None,
        }
    }
}

/// Builder for audit events.
pub struct AuditEventBuilder {
    action: AuditAction,
    resource: String,
    user_id: Option<String>,
    details: serde_json::Value,
    success: bool,
    error: Option<String>,
}

impl AuditEventBuilder {
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: 0, // Set by storage
            timestamp: Utc::now(),
            user_id: self.user_id,
            action: self.action,
            resource: self.resource,
            details: self.details,
            success: self.success,
            error: self.error,
        }
    }
}

/// Storage backend for audit logs.
#[async_trait::async_trait]
pub trait AuditStorage: Send + Sync {
    async fn store(&self, event: &AuditEvent) -> Result<i64>;

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub success_only: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// In-memory audit storage for testing.
#[derive(Default)]
pub struct MemoryAuditStorage {
    events: tokio::sync::RwLock<Vec<AuditEvent>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl MemoryAuditStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuditStorage for MemoryAuditStorage {
    async fn store(&self, event: &AuditEvent) -> Result<i64> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        let mut stored = event.clone();
        stored.id = id;
        self.events.write().await.push(stored);
        Ok(id)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;

        let filtered = events
            .iter()
            .filter(|e| {
                filter
                    .user_id
                    .as_ref()
                    .is_none_or(|user| e.user_id.as_ref() == Some(user))
            })
            .filter(|e| filter.action.as_ref().is_none_or(|a| &e.action == a))
            .filter(|e| filter.success_only.is_none_or(|s| e.success == s))
            .skip(filter.offset.unwrap_or(0) as usize)
            .take(filter.limit.unwrap_or(100) as usize)
            .cloned()
            .collect();

        Ok(filtered)
    }
}

/// Audit logger service. Writes go through a bounded channel so request
/// handlers never wait on audit storage.
pub struct AuditLogger {
    storage: Arc<dyn AuditStorage>,
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditLogger {
    /// Create a new audit logger. Must be called inside a Tokio runtime.
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(10000);

        let storage_clone = storage.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = storage_clone.store(&event).await {
                    tracing::error!(error = %e, action = event.action.as_str(), "Failed to store audit event");
                }
            }
        });

        Self { storage, tx }
    }

    /// Log an audit event (non-blocking).
    pub fn log(&self, event: AuditEvent) {
        if self.tx.try_send(event).is_err() {
            tracing::warn!("Audit log channel full, event dropped");
        }
    }

    /// Log an audit event and wait for it to be stored.
    pub async fn log_sync(&self, event: AuditEvent) -> Result<i64> {
        self.storage.store(&event).await
    }

    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        self.storage.query(filter).await
    }

    /// Log a login attempt. `subject` is the user ID when known,
    /// otherwise the email that was tried.
    pub fn log_login(&self, subject: &str, success: bool) {
        let action = if success {
            AuditAction::Login
        } else {
            AuditAction::LoginFailed
        };
        let mut builder = AuditEvent::builder(action, format!("user/{}", subject)).user(subject);
        if !success {
            builder = builder.failure("Invalid credentials");
        }
        self.log(builder.build());
    }

    /// Log an action one user performed against a user record.
    pub fn log_user_action(
        &self,
        actor_id: &str,
        action: AuditAction,
        target_id: &str,
        details: serde_json::Value,
    ) {
        let event = AuditEvent::builder(action, format!("user/{}", target_id))
            .user(actor_id)
            .details(details)
            .build();
        self.log(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_builder() {
        let event = AuditEvent::builder(AuditAction::Login, "user/123")
            .user("user123")
            .details(serde_json::json!({"method": "password"}))
            .build();

        assert_eq!(event.action, AuditAction::Login);
        assert_eq!(event.resource, "user/123");
        assert_eq!(event.user_id, Some("user123".to_string()));
        assert!(event.success);
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in [
            AuditAction::Register,
            AuditAction::LoginFailed,
            AuditAction::TokenRefreshRejected,
            AuditAction::UserDeleted,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), action);
        }
        assert_eq!(
            AuditAction::parse("export"),
            AuditAction::Custom("export".to_string())
        );
    }

    #[tokio::test]
    async fn test_filter_by_user_and_action() {
        let storage = MemoryAuditStorage::new();
        storage
            .store(&AuditEvent::builder(AuditAction::Login, "user/1").user("user1").build())
            .await
            .unwrap();
        storage
            .store(&AuditEvent::builder(AuditAction::Logout, "user/1").user("user1").build())
            .await
            .unwrap();
        storage
            .store(&AuditEvent::builder(AuditAction::Login, "user/2").user("user2").build())
            .await
            .unwrap();

        let by_user = storage.query(&AuditFilter::new().user("user1")).await.unwrap();
        assert_eq!(by_user.len(), 2);

        let logins = storage
            .query(&AuditFilter::new().action(AuditAction::Login))
            .await
            .unwrap();
        assert_eq!(logins.len(), 2);
        assert!(logins.iter().all(|e| e.id > 0));
    }

    #[tokio::test]
    async fn test_audit_logger() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let logger = AuditLogger::new(storage.clone());

        logger.log_login("user1", false);

        // Give async task time to process
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let events = storage.query(&AuditFilter::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::LoginFailed);
        assert!(!events[0].success);
    }
}
