//! Argon2id password hashing with a configurable work factor.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{AuthError, AuthResult};

/// Plaintext behind the decoy hash used for unknown accounts.
const DECOY_PASSWORD: &str = "decoy-password-never-issued";

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct PasswordConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl PasswordConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |name: &str, fallback: u32| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            memory_kib: read("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib),
            iterations: read("PASSWORD_HASH_ITERATIONS", defaults.iterations),
            parallelism: read("PASSWORD_HASH_PARALLELISM", defaults.parallelism),
        }
    }

    /// Cheapest parameters Argon2 accepts. Tests only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST.max(8),
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies passwords off the async executor.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    decoy: Arc<OnceCell<String>>,
}

impl PasswordHasher {
    pub fn new(config: PasswordConfig) -> AuthResult<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AuthError::Internal(format!("Invalid password hash parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: Arc::new(OnceCell::new()),
        })
    }

    /// Produce a salted PHC hash string.
    pub async fn hash(&self, password: &str) -> AuthResult<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// Check a password against a stored hash. The stored hash's own
    /// parameters are used, so hashes survive cost changes.
    pub async fn verify(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|_| AuthError::Internal("Invalid password hash in storage".into()))?;
            Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Verification task failed: {}", e)))?
    }

    /// Run a full verification against a decoy hash made with the current
    /// parameters. Login calls this for unknown emails so both paths cost
    /// the same.
    pub async fn verify_decoy(&self, password: &str) -> AuthResult<()> {
        let decoy = self
            .decoy
            .get_or_try_init(|| self.hash(DECOY_PASSWORD))
            .await?;
        self.verify(password, decoy).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn decoy_ready(&self) -> bool {
        self.decoy.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(PasswordConfig::minimal()).unwrap()
    }

    #[tokio::test]
    async fn test_password_hashing() {
        let hasher = hasher();
        let hash = hasher.hash("testpassword123").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("testpassword123", &hash).await.unwrap());
        assert!(!hasher.verify("wrongpassword", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let hasher = hasher();
        let a = hasher.hash("same-password").await.unwrap();
        let b = hasher.hash("same-password").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_hash_from_other_cost_still_verifies() {
        let cheap = hasher();
        let hash = cheap.hash("portable-secret").await.unwrap();

        let costlier = PasswordHasher::new(PasswordConfig {
            memory_kib: 16,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(costlier.verify("portable-secret", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_hash_is_internal_error() {
        let result = hasher().verify("whatever", "not-a-phc-string").await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[tokio::test]
    async fn test_decoy_verification_is_built_once() {
        let hasher = hasher();
        assert!(!hasher.decoy_ready());

        hasher.verify_decoy("guess-1").await.unwrap();
        assert!(hasher.decoy_ready());
        let first = hasher.decoy.get().cloned();

        hasher.clone().verify_decoy("guess-2").await.unwrap();
        assert_eq!(hasher.decoy.get().cloned(), first);
        assert!(first.unwrap().starts_with("$argon2id$"));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let result = PasswordHasher::new(PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        });
        assert!(result.is_err());
    }
}
