//! Credential store contract and an in-memory implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rbac::{AccountStatus, Role};

/// Persisted user record. Never serialized directly to clients.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub status: AccountStatus,
    /// Digest of the single live refresh token, if any.
    pub refresh_token_hash: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(email: String, password_hash: String, name: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            name,
            role,
            status: AccountStatus::Active,
            refresh_token_hash: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn view(&self) -> UserView {
        UserView::from(self)
    }
}

/// Sanitized user information returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    /// User ID.
    pub id: Uuid,
    /// Email address (normalized).
    pub email: String,
    /// Display name.
    pub name: String,
    /// Platform role.
    pub role: Role,
    /// Account status.
    pub status: AccountStatus,
    /// Last successful login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserView {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email.clone(),
            name: record.name.clone(),
            role: record.role,
            status: record.status,
            last_login: record.last_login,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Partial update applied by administrators.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

/// Filter for listing users.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Persistence contract for user credentials and session state.
///
/// Emails passed in are already normalized. Each method is a single
/// storage round trip; the store is responsible for serializing writes.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Returns `false` if the email is already taken.
    async fn insert(&self, user: &UserRecord) -> Result<bool>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;

    /// Newest first.
    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserRecord>>;

    /// Overwrite the refresh digest and stamp `last_login`.
    async fn record_login(&self, id: Uuid, refresh_token_hash: &str, at: DateTime<Utc>) -> Result<()>;

    /// Replace the refresh digest only if it still equals `expected`.
    /// Returns whether the swap happened.
    async fn swap_refresh_token(&self, id: Uuid, expected: &str, replacement: &str) -> Result<bool>;

    async fn clear_refresh_token(&self, id: Uuid) -> Result<()>;

    /// Store a new password hash and drop the refresh digest.
    /// Returns `false` if the user does not exist.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool>;

    /// Apply an admin update. A non-active status also drops the refresh digest.
    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<Option<UserRecord>>;

    /// Returns `false` if the user did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// In-memory user store for tests and local development.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, UserRecord>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &UserRecord) -> Result<bool> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Ok(false);
        }
        users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let users = self.users.read().await;
        let mut matched: Vec<UserRecord> = users
            .values()
            .filter(|u| filter.role.is_none_or(|r| u.role == r))
            .filter(|u| filter.status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(100) as usize;
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn record_login(&self, id: Uuid, refresh_token_hash: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.refresh_token_hash = Some(refresh_token_hash.to_string());
            user.last_login = Some(at);
            user.updated_at = at;
        }
        Ok(())
    }

    async fn swap_refresh_token(&self, id: Uuid, expected: &str, replacement: &str) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.refresh_token_hash.as_deref() == Some(expected) => {
                user.refresh_token_hash = Some(replacement.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.refresh_token_hash = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.refresh_token_hash = None;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<Option<UserRecord>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(status) = update.status {
            user.status = status;
            if !status.is_active() {
                user.refresh_token_hash = None;
            }
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
