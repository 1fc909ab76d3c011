use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::error;

use crate::auth::errors::AuthError;
use crate::config::PasswordConfig;

/// Argon2id hasher bound to the configured cost parameters.
///
/// Hashes are self-describing PHC strings, so verification keeps working for
/// hashes produced under older parameters.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
    /// Hash under the same params, checked when no account matches so both
    /// login failures cost one verification.
    dummy_hash: Arc<str>,
    #[cfg(test)]
    verifications: Arc<std::sync::atomic::AtomicUsize>,
}

impl CredentialHasher {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        let mut hasher = Self {
            params,
            dummy_hash: Arc::from(""),
            #[cfg(test)]
            verifications: Arc::default(),
        };
        hasher.dummy_hash = Arc::from(hasher.hash("auth-ms-dummy-credential")?);
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        #[cfg(test)]
        self.verifications
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(&self, plain: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_blocking(&self, plain: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("verify task failed: {e}")))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Spends one verification against the dummy hash; the result is always a miss.
    pub async fn verify_dummy_blocking(&self, plain: String) -> Result<(), AuthError> {
        self.verify_blocking(plain, self.dummy_hash.to_string())
            .await
            .map(|_| ())
    }

    #[cfg(test)]
    pub(crate) fn verification_count(&self) -> usize {
        self.verifications.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) fn fast_hasher() -> CredentialHasher {
    CredentialHasher::new(&PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test params are valid")
}
