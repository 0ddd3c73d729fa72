//! Role-based access control.
//!
//! Roles and account statuses are closed enumerations. Every decision goes
//! through an exhaustive `match`, so adding a role forces each gate to be
//! revisited at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::{AuthError, AuthResult};

/// Platform role assigned to every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Manages their own portfolios, positions and trades.
    #[default]
    Trader,
    /// Read-mostly access to analytics.
    Analyst,
    /// Runs desk-wide risk tooling (batch scoring, alert broadcast).
    RiskManager,
    /// Full access including user management.
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Trader, Role::Analyst, Role::RiskManager, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trader => "TRADER",
            Role::Analyst => "ANALYST",
            Role::RiskManager => "RISK_MANAGER",
            Role::Admin => "ADMIN",
        }
    }

    /// Whether this role may read records owned by other users.
    pub fn can_read_all(&self) -> bool {
        match self {
            Role::Admin => true,
            Role::Trader | Role::Analyst | Role::RiskManager => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRADER" => Ok(Role::Trader),
            "ANALYST" => Ok(Role::Analyst),
            "RISK_MANAGER" => Ok(Role::RiskManager),
            "ADMIN" => Ok(Role::Admin),
            other => Err(AuthError::Validation(format!(
                "Invalid role '{}'. Must be one of TRADER, ANALYST, RISK_MANAGER, ADMIN",
                other
            ))),
        }
    }
}

/// Account lifecycle state. Only `Active` accounts can authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            AccountStatus::Active => true,
            AccountStatus::Inactive | AccountStatus::Suspended => false,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "INACTIVE" => Ok(AccountStatus::Inactive),
            "SUSPENDED" => Ok(AccountStatus::Suspended),
            other => Err(AuthError::Validation(format!(
                "Invalid status '{}'. Must be one of ACTIVE, INACTIVE, SUSPENDED",
                other
            ))),
        }
    }
}

/// Static access classes attached to route groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Any authenticated user; ownership is enforced by the handler.
    Authenticated,
    /// Desk-wide risk tooling.
    RiskDesk,
    /// User administration.
    Admin,
}

impl RouteAccess {
    /// Roles allowed through this class of route.
    pub fn required_roles(&self) -> &'static [Role] {
        match self {
            RouteAccess::Authenticated => &Role::ALL,
            RouteAccess::RiskDesk => &[Role::RiskManager, Role::Admin],
            RouteAccess::Admin => &[Role::Admin],
        }
    }

    pub fn authorize(&self, role: Role) -> AuthResult<()> {
        authorize(role, self.required_roles())
    }
}

/// Allow iff `role` is one of `required`.
pub fn authorize(role: Role, required: &[Role]) -> AuthResult<()> {
    if required.contains(&role) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}
