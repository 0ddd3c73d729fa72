//! Authentication and Authorization
//!
//! Credential storage, JWT access/refresh tokens, the role gate and audit logging.

pub mod audit;
pub mod audit_storage_pg;
pub mod error;
pub mod jwt;
pub mod password;
pub mod rbac;
pub mod service;
pub mod store;
pub mod store_pg;

pub use audit::{AuditAction, AuditEvent, AuditFilter, AuditLogger, AuditStorage, MemoryAuditStorage};
pub use audit_storage_pg::PostgresAuditStorage;
pub use error::{AuthError, AuthResult};
pub use jwt::{refresh_token_digest, Claims, JwtAuth, JwtConfig, TokenConfig, TokenKind, TokenPair};
pub use password::{PasswordConfig, PasswordHasher};
pub use rbac::{authorize, AccountStatus, Role, RouteAccess};
pub use service::{normalize_email, AuthService, AuthSession, NewUser};
pub use store::{MemoryUserStore, UserFilter, UserRecord, UserStore, UserUpdate, UserView};
pub use store_pg::PostgresUserStore;
