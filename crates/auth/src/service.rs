//! The authentication core: registration, login, token rotation and
//! account-status enforcement.
//!
//! All state lives behind the injected [`UserStore`]. Refresh tokens are
//! single-use: each rotation compare-and-swaps the stored digest, so an
//! older token stops working the moment a newer one is issued.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::error::{AuthError, AuthResult};
use crate::jwt::{refresh_token_digest, Claims, JwtAuth, TokenPair};
use crate::password::PasswordHasher;
use crate::rbac::{AccountStatus, Role};
use crate::store::{UserFilter, UserRecord, UserStore, UserUpdate, UserView};

const MIN_PASSWORD_LEN: usize = 8;

/// Input for self-registration and admin user creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<Role>,
}

/// Tokens plus the sanitized user they belong to.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserView,
}

impl AuthSession {
    fn new(tokens: TokenPair, user: UserView) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer",
            expires_in: tokens.expires_in,
            user,
        }
    }
}

/// Lowercase and trim an email for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AuthResult<()> {
    let valid = email.len() >= 5
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(AuthError::Validation("Invalid email address".into()))
    }
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> AuthResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("Name is required".into()));
    }
    Ok(name.to_string())
}

/// Authentication service.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: JwtAuth,
    passwords: PasswordHasher,
    audit: Option<Arc<AuditLogger>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: JwtAuth, passwords: PasswordHasher) -> Self {
        Self {
            store,
            tokens,
            passwords,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn tokens(&self) -> &JwtAuth {
        &self.tokens
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.log(event);
        }
    }

    async fn create_record(&self, input: NewUser) -> AuthResult<UserRecord> {
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        validate_password(&input.password)?;
        let name = validate_name(&input.name)?;

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = self.passwords.hash(&input.password).await?;
        Ok(UserRecord::new(
            email,
            password_hash,
            name,
            input.role.unwrap_or_default(),
        ))
    }

    /// Register a new account and open its first session.
    pub async fn register(&self, input: NewUser) -> AuthResult<AuthSession> {
        let mut record = self.create_record(input).await?;

        let tokens = self
            .tokens
            .issue_pair(record.id, &record.email, record.role)?;
        record.refresh_token_hash = Some(refresh_token_digest(&tokens.refresh_token));

        // The up-front check can race; the store's insert is authoritative.
        if !self.store.insert(&record).await? {
            return Err(AuthError::AlreadyExists);
        }

        info!(user_id = %record.id, role = %record.role, "User registered");
        self.audit(
            AuditEvent::builder(AuditAction::Register, format!("user/{}", record.id))
                .user(record.id.to_string())
                .details(serde_json::json!({
                    "email": &record.email,
                    "role": record.role.as_str(),
                }))
                .build(),
        );

        Ok(AuthSession::new(tokens, record.view()))
    }

    /// Authenticate with email and password.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let email = normalize_email(email);

        let Some(mut user) = self.store.find_by_email(&email).await? else {
            debug!("Login attempt for unknown email");
            self.passwords.verify_decoy(password).await?;
            if let Some(audit) = &self.audit {
                audit.log_login(&email, false);
            }
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(password, &user.password_hash).await? {
            if let Some(audit) = &self.audit {
                audit.log_login(&user.id.to_string(), false);
            }
            return Err(AuthError::InvalidCredentials);
        }

        if !user.status.is_active() {
            warn!(user_id = %user.id, status = %user.status, "Login refused for inactive account");
            return Err(AuthError::AccountNotActive);
        }

        let tokens = self.tokens.issue_pair(user.id, &user.email, user.role)?;
        let now = Utc::now();
        let digest = refresh_token_digest(&tokens.refresh_token);
        self.store.record_login(user.id, &digest, now).await?;

        user.refresh_token_hash = Some(digest);
        user.last_login = Some(now);
        user.updated_at = now;

        if let Some(audit) = &self.audit {
            audit.log_login(&user.id.to_string(), true);
        }
        debug!(user_id = %user.id, "Login succeeded");

        Ok(AuthSession::new(tokens, user.view()))
    }

    /// Stateless signature and expiry check.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<Claims> {
        self.tokens.verify_access_token(token)
    }

    /// Load the user and require an active account.
    pub async fn verify_user(&self, id: Uuid) -> AuthResult<UserView> {
        let user = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.status.is_active() {
            return Err(AuthError::AccountNotActive);
        }
        Ok(user.view())
    }

    /// Full per-request check: token first, then the user's current status.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<UserView> {
        let claims = self.verify_access_token(access_token)?;
        let user_id = claims.user_id()?;
        self.verify_user(user_id).await
    }

    /// Exchange a refresh token for a new pair, invalidating the old one.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;
        let user_id = claims
            .user_id()
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let Some(user) = self.store.find_by_id(user_id).await? else {
            return Err(AuthError::InvalidRefreshToken);
        };

        // Suspension clears the digest, so status must be checked first.
        if !user.status.is_active() {
            return Err(AuthError::AccountNotActive);
        }

        let presented = refresh_token_digest(refresh_token);
        if user.refresh_token_hash.as_deref() != Some(presented.as_str()) {
            warn!(user_id = %user.id, "Refresh token does not match the stored session");
            self.audit(
                AuditEvent::builder(AuditAction::TokenRefreshRejected, format!("user/{}", user.id))
                    .user(user.id.to_string())
                    .failure("Stale or revoked refresh token")
                    .build(),
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        let tokens = self.tokens.issue_pair(user.id, &user.email, user.role)?;
        let replacement = refresh_token_digest(&tokens.refresh_token);

        if !self
            .store
            .swap_refresh_token(user.id, &presented, &replacement)
            .await?
        {
            // Another rotation won the race for this token.
            warn!(user_id = %user.id, "Concurrent refresh lost the swap");
            return Err(AuthError::InvalidRefreshToken);
        }

        self.audit(
            AuditEvent::builder(AuditAction::TokenRefresh, format!("user/{}", user.id))
                .user(user.id.to_string())
                .build(),
        );

        Ok(AuthSession::new(tokens, user.view()))
    }

    /// Drop the stored refresh token. Idempotent.
    pub async fn logout(&self, user_id: Uuid) -> AuthResult<()> {
        self.store.clear_refresh_token(user_id).await?;
        self.audit(
            AuditEvent::builder(AuditAction::Logout, format!("user/{}", user_id))
                .user(user_id.to_string())
                .build(),
        );
        Ok(())
    }

    /// Replace the password after verifying the current one. Revokes the
    /// refresh lineage.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .passwords
            .verify(current_password, &user.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }
        validate_password(new_password)?;

        let password_hash = self.passwords.hash(new_password).await?;
        if !self.store.update_password(user_id, &password_hash).await? {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id = %user_id, "Password changed, refresh session revoked");
        self.audit(
            AuditEvent::builder(AuditAction::PasswordChanged, format!("user/{}", user_id))
                .user(user_id.to_string())
                .build(),
        );
        Ok(())
    }

    // Administration

    pub async fn list_users(&self, filter: &UserFilter) -> AuthResult<Vec<UserView>> {
        let users = self.store.list(filter).await?;
        Ok(users.iter().map(UserView::from).collect())
    }

    pub async fn get_user(&self, id: Uuid) -> AuthResult<UserView> {
        self.store
            .find_by_id(id)
            .await?
            .map(|u| u.view())
            .ok_or(AuthError::UserNotFound)
    }

    /// Create an account on someone's behalf. No session is opened.
    pub async fn create_user(&self, actor_id: Uuid, input: NewUser) -> AuthResult<UserView> {
        let record = self.create_record(input).await?;
        if !self.store.insert(&record).await? {
            return Err(AuthError::AlreadyExists);
        }

        if let Some(audit) = &self.audit {
            audit.log_user_action(
                &actor_id.to_string(),
                AuditAction::UserCreated,
                &record.id.to_string(),
                serde_json::json!({ "email": &record.email, "role": record.role.as_str() }),
            );
        }
        Ok(record.view())
    }

    pub async fn update_user(
        &self,
        actor_id: Uuid,
        id: Uuid,
        mut update: UserUpdate,
    ) -> AuthResult<UserView> {
        if let Some(name) = update.name.take() {
            update.name = Some(validate_name(&name)?);
        }
        if actor_id == id && update.status.is_some_and(|s| s != AccountStatus::Active) {
            return Err(AuthError::Validation(
                "Administrators cannot deactivate their own account".into(),
            ));
        }

        let user = self
            .store
            .update(id, &update)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(audit) = &self.audit {
            audit.log_user_action(
                &actor_id.to_string(),
                AuditAction::UserUpdated,
                &id.to_string(),
                serde_json::json!({
                    "name": update.name,
                    "role": update.role.map(|r| r.as_str()),
                    "status": update.status.map(|s| s.as_str()),
                }),
            );
        }
        Ok(user.view())
    }

    pub async fn delete_user(&self, actor_id: Uuid, id: Uuid) -> AuthResult<()> {
        if actor_id == id {
            return Err(AuthError::Validation(
                "Administrators cannot delete their own account".into(),
            ));
        }
        if !self.store.delete(id).await? {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id = %id, deleted_by = %actor_id, "User deleted");
        if let Some(audit) = &self.audit {
            audit.log_user_action(
                &actor_id.to_string(),
                AuditAction::UserDeleted,
                &id.to_string(),
                serde_json::Value::Null,
            );
        }
        Ok(())
    }
}
