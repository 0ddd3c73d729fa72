//! JWT access and refresh tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::rbac::Role;

/// Which of the two token classes a JWT belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// User's email.
    pub email: String,
    /// User's role at issuance.
    pub role: Role,
    /// Token class.
    pub kind: TokenKind,
    /// Issuer claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
    /// JWT ID, makes every minted token unique.
    pub jti: String,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        email: impl Into<String>,
        role: Role,
        kind: TokenKind,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email: email.into(),
            role,
            kind,
            iss: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.iss = issuer;
        self
    }

    /// Parse the subject as a user ID.
    pub fn user_id(&self) -> AuthResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Signing settings for one token class.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl: Duration,
}

/// Configuration for both token classes.
#[derive(Clone)]
pub struct JwtConfig {
    pub access: TokenConfig,
    pub refresh: TokenConfig,
    pub issuer: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            access: TokenConfig {
                secret: "access-secret-change-in-production".to_string(),
                ttl: Duration::minutes(15),
            },
            refresh: TokenConfig {
                secret: "refresh-secret-change-in-production".to_string(),
                ttl: Duration::days(7),
            },
            issuer: Some("hedgeai-api".to_string()),
        }
    }
}

/// Longest lifetime accepted from configuration.
const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// Parse a token lifetime setting. Values that are not positive, overflow
/// `unit`, or exceed ten years fall back to `default`.
fn ttl_setting(
    name: &str,
    raw: Option<&str>,
    unit: fn(i64) -> Option<Duration>,
    default: Duration,
) -> Duration {
    let Some(raw) = raw else {
        return default;
    };
    let parsed = raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|v| *v > 0)
        .and_then(unit)
        .filter(|ttl| *ttl <= Duration::days(MAX_TOKEN_TTL_DAYS));

    parsed.unwrap_or_else(|| {
        tracing::warn!(setting = name, value = raw, "Invalid token lifetime, using default");
        default
    })
}

impl JwtConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let access_ttl = ttl_setting(
            "JWT_ACCESS_EXPIRY_MINUTES",
            std::env::var("JWT_ACCESS_EXPIRY_MINUTES").ok().as_deref(),
            Duration::try_minutes,
            defaults.access.ttl,
        );
        let refresh_ttl = ttl_setting(
            "JWT_REFRESH_EXPIRY_DAYS",
            std::env::var("JWT_REFRESH_EXPIRY_DAYS").ok().as_deref(),
            Duration::try_days,
            defaults.refresh.ttl,
        );

        let access_secret = std::env::var("JWT_ACCESS_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_ACCESS_SECRET not set, using development secret");
            defaults.access.secret.clone()
        });
        let refresh_secret = std::env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_REFRESH_SECRET not set, using development secret");
            defaults.refresh.secret.clone()
        });

        Self {
            access: TokenConfig {
                secret: access_secret,
                ttl: access_ttl,
            },
            refresh: TokenConfig {
                secret: refresh_secret,
                ttl: refresh_ttl,
            },
            issuer: std::env::var("JWT_ISSUER").ok().or(defaults.issuer),
        }
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

struct TokenCodec {
    kind: TokenKind,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    fn new(kind: TokenKind, config: &TokenConfig, issuer: Option<&str>) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 5;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Self {
            kind,
            ttl: config.ttl,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    fn decode(&self, token: &str) -> AuthResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, kind = ?self.kind, "Token decode failed");
                    AuthError::InvalidToken
                }
            })?;

        if claims.kind != self.kind {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

/// JWT authentication handler for both token classes.
pub struct JwtAuth {
    access: TokenCodec,
    refresh: TokenCodec,
    issuer: Option<String>,
}

impl JwtAuth {
    pub fn new(config: JwtConfig) -> Self {
        let issuer = config.issuer.as_deref();
        Self {
            access: TokenCodec::new(TokenKind::Access, &config.access, issuer),
            refresh: TokenCodec::new(TokenKind::Refresh, &config.refresh, issuer),
            issuer: config.issuer.clone(),
        }
    }

    /// Mint an access/refresh pair bound to `{id, email, role}`.
    pub fn issue_pair(&self, user_id: Uuid, email: &str, role: Role) -> AuthResult<TokenPair> {
        let access_token = self.create_token(TokenKind::Access, user_id, email, role)?;
        let refresh_token = self.create_token(TokenKind::Refresh, user_id, email, role)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access.ttl.num_seconds(),
        })
    }

    pub fn create_token(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> AuthResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.access.ttl,
            TokenKind::Refresh => self.refresh.ttl,
        };
        let claims = Claims::new(user_id, email, role, kind, ttl).with_issuer(self.issuer.clone());
        self.encode_claims(&claims)
    }

    /// Sign arbitrary claims with the key matching their kind.
    pub fn encode_claims(&self, claims: &Claims) -> AuthResult<String> {
        let key = match claims.kind {
            TokenKind::Access => &self.access.encoding_key,
            TokenKind::Refresh => &self.refresh.encoding_key,
        };
        encode(&Header::default(), claims, key)
            .map_err(|e| AuthError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Stateless access-token check: `TokenExpired` or `InvalidToken`.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<Claims> {
        self.access.decode(token)
    }

    /// Any refresh-token failure collapses into `InvalidRefreshToken`.
    pub fn verify_refresh_token(&self, token: &str) -> AuthResult<Claims> {
        self.refresh
            .decode(token)
            .map_err(|_| AuthError::InvalidRefreshToken)
    }
}

/// Hex SHA-256 digest under which a refresh token is stored.
pub fn refresh_token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_setting_falls_back_on_bad_values() {
        fn minutes(raw: Option<&str>) -> Duration {
            ttl_setting("JWT_ACCESS_EXPIRY_MINUTES", raw, Duration::try_minutes, Duration::minutes(15))
        }
        let default = Duration::minutes(15);

        assert_eq!(minutes(None), default);
        assert_eq!(minutes(Some("30")), Duration::minutes(30));
        assert_eq!(minutes(Some(" 45 ")), Duration::minutes(45));
        assert_eq!(minutes(Some("abc")), default);
        assert_eq!(minutes(Some("0")), default);
        assert_eq!(minutes(Some("-5")), default);
        assert_eq!(minutes(Some("9223372036854775807")), default);

        let days = ttl_setting("JWT_REFRESH_EXPIRY_DAYS", Some("9223372036854775807"), Duration::try_days, Duration::days(7));
        assert_eq!(days, Duration::days(7));
        let days = ttl_setting("JWT_REFRESH_EXPIRY_DAYS", Some("100000"), Duration::try_days, Duration::days(7));
        assert_eq!(days, Duration::days(7));
        let days = ttl_setting("JWT_REFRESH_EXPIRY_DAYS", Some("30"), Duration::try_days, Duration::days(7));
        assert_eq!(days, Duration::days(30));
    }

    fn create_test_auth() -> JwtAuth {
        JwtAuth::new(JwtConfig {
            access: TokenConfig {
                secret: "test-access-secret".to_string(),
                ttl: Duration::minutes(5),
            },
            refresh: TokenConfig {
                secret: "test-refresh-secret".to_string(),
                ttl: Duration::days(1),
            },
            issuer: Some("hedgeai-test".to_string()),
        })
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let auth = create_test_auth();
        let user_id = Uuid::new_v4();

        let pair = auth.issue_pair(user_id, "alice@x.com", Role::Trader).unwrap();
        assert_eq!(pair.expires_in, 300);

        let access = auth.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(access.user_id().unwrap(), user_id);
        assert_eq!(access.email, "alice@x.com");
        assert_eq!(access.role, Role::Trader);
        assert_eq!(access.kind, TokenKind::Access);
        assert!(!access.is_expired());

        let refresh = auth.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(refresh.sub, access.sub);
    }

    #[test]
    fn test_token_classes_are_not_interchangeable() {
        let auth = create_test_auth();
        let pair = auth.issue_pair(Uuid::new_v4(), "a@x.com", Role::Analyst).unwrap();

        assert!(matches!(
            auth.verify_access_token(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.verify_refresh_token(&pair.access_token),
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[test]
    fn test_expired_access_token() {
        let auth = create_test_auth();
        let claims = Claims::new(
            Uuid::new_v4(),
            "a@x.com",
            Role::Trader,
            TokenKind::Access,
            Duration::minutes(-10),
        )
        .with_issuer(Some("hedgeai-test".to_string()));
        let token = auth.encode_claims(&claims).unwrap();

        assert!(matches!(
            auth.verify_access_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_expired_refresh_token_is_invalid_refresh() {
        let auth = create_test_auth();
        let claims = Claims::new(
            Uuid::new_v4(),
            "a@x.com",
            Role::Trader,
            TokenKind::Refresh,
            Duration::minutes(-10),
        )
        .with_issuer(Some("hedgeai-test".to_string()));
        let token = auth.encode_claims(&claims).unwrap();

        assert!(matches!(
            auth.verify_refresh_token(&token),
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[test]
    fn test_invalid_and_foreign_tokens() {
        let auth = create_test_auth();
        assert!(matches!(
            auth.verify_access_token("invalid-token"),
            Err(AuthError::InvalidToken)
        ));

        let other = JwtAuth::new(JwtConfig::default());
        let pair = other.issue_pair(Uuid::new_v4(), "a@x.com", Role::Admin).unwrap();
        assert!(matches!(
            auth.verify_access_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_every_refresh_token_is_unique() {
        let auth = create_test_auth();
        let user_id = Uuid::new_v4();
        let first = auth.issue_pair(user_id, "a@x.com", Role::Trader).unwrap();
        let second = auth.issue_pair(user_id, "a@x.com", Role::Trader).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(
            refresh_token_digest(&first.refresh_token),
            refresh_token_digest(&second.refresh_token)
        );
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = refresh_token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, refresh_token_digest("abc"));
    }
}
