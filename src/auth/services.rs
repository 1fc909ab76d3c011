//! Credential operations: register, login, verify-and-refresh.
//!
//! Each call does at most one lookup, one write and one token operation.
//! Password work runs on the blocking pool; nothing is cached between calls.

use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{AuthResponse, PublicUser},
        errors::AuthError,
        jwt::JwtKeys,
        password::CredentialHasher,
        repo::UserStore,
        repo_types::NewUser,
    },
    state::AppState,
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    hasher: CredentialHasher,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.users.clone(),
            JwtKeys::from_ref(state),
            state.hasher.clone(),
        )
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys, hasher: CredentialHasher) -> Self {
        Self {
            users,
            keys,
            hasher,
        }
    }

    /// Creates an account and returns it with a token.
    ///
    /// A duplicate email is `Conflict` whether the pre-check sees it or the
    /// store's unique constraint rejects the insert.
    pub async fn register_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        if self.users.find_by_email(email).await.map_err(store_fault)?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::Conflict);
        }

        let password_hash = self.hasher.hash_blocking(password.to_owned()).await?;

        let user = self
            .users
            .create(NewUser {
                email: email.to_owned(),
                name: name.to_owned(),
                password_hash,
            })
            .await
            .map_err(|e| {
                let e = AuthError::from(e);
                if e.is_domain() {
                    warn!(email = %email, "email registered concurrently");
                } else {
                    error!(error = %e, "create user failed");
                }
                e
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        self.respond(user.into())
    }

    /// Unknown email and wrong password fail identically, and both pay for
    /// one password verification.
    pub async fn login_user(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let Some(user) = self.users.find_by_email(email).await.map_err(store_fault)? else {
            self.hasher.verify_dummy_blocking(password.to_owned()).await?;
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let ok = self
            .hasher
            .verify_blocking(password.to_owned(), user.password_hash.clone())
            .await?;
        if !ok {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, email = %user.email, "user logged in");
        self.respond(user.into())
    }

    /// Validates `token` and answers with a freshly signed one for the same
    /// user (sliding expiry).
    pub async fn verify_token(&self, token: &str) -> Result<AuthResponse, AuthError> {
        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AuthError::InvalidToken
        })?;

        let user = claims.into_user();
        info!(user_id = %user.id, "token verified, reissuing");
        self.respond(user)
    }

    fn respond(&self, user: PublicUser) -> Result<AuthResponse, AuthError> {
        let token = self.keys.sign(&user).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AuthError::Internal(e.to_string())
        })?;
        Ok(AuthResponse { user, token })
    }
}

fn store_fault(e: crate::auth::errors::StoreError) -> AuthError {
    let e = AuthError::from(e);
    error!(error = %e, "user store lookup failed");
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::memory::{MemoryUserStore, UnavailableUserStore};
    use jsonwebtoken::{decode, Validation};

    fn service_with(store: Arc<dyn UserStore>) -> AuthService {
        AuthService::from_ref(&AppState::with_store(store))
    }

    fn setup() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::default());
        (service_with(store.clone()), store)
    }

    fn decode_unchecked(token: &str) -> serde_json::Value {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        decode::<serde_json::Value>(token, &jsonwebtoken::DecodingKey::from_secret(b""), &validation)
            .expect("decodable")
            .claims
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_without_writing() {
        let (svc, store) = setup();
        svc.register_user("a@x.com", "A", "secret1").await.expect("first");
        assert_eq!(store.len().await, 1);

        let err = svc
            .register_user("a@x.com", "Other", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_registrations_yield_one_conflict() {
        let (svc, store) = setup();
        let (a, b) = tokio::join!(
            svc.register_user("race@x.com", "A", "secret1"),
            svc.register_user("race@x.com", "B", "secret1"),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::Conflict))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn register_then_login_subject_matches_user() {
        let (svc, _) = setup();
        let registered = svc.register_user("a@x.com", "A", "secret1").await.unwrap();
        let logged_in = svc.login_user("a@x.com", "secret1").await.unwrap();

        assert_eq!(logged_in.user, registered.user);
        let claims = svc.keys.verify(&logged_in.token).unwrap();
        assert_eq!(claims.sub, registered.user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let (svc, _) = setup();
        svc.register_user("a@x.com", "A", "secret1").await.unwrap();

        let wrong = svc.login_user("a@x.com", "wrong").await.unwrap_err();
        let unknown = svc.login_user("ghost@x.com", "secret1").await.unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn unknown_email_costs_a_verification_like_wrong_password() {
        let (svc, _) = setup();
        svc.register_user("a@x.com", "A", "secret1").await.unwrap();

        let before = svc.hasher.verification_count();
        svc.login_user("a@x.com", "wrong").await.unwrap_err();
        let after_wrong = svc.hasher.verification_count();
        svc.login_user("ghost@x.com", "wrong").await.unwrap_err();
        let after_unknown = svc.hasher.verification_count();

        assert_eq!(after_wrong - before, 1);
        assert_eq!(after_unknown - after_wrong, 1);
    }

    #[tokio::test]
    async fn verify_reissues_token_for_same_user() {
        let (svc, _) = setup();
        let issued = svc.register_user("a@x.com", "A", "secret1").await.unwrap();

        let refreshed = svc.verify_token(&issued.token).await.unwrap();
        assert_eq!(refreshed.user, issued.user);
        assert_ne!(refreshed.token, issued.token);

        let again = svc.keys.verify(&refreshed.token).unwrap();
        assert_eq!(again.into_user(), issued.user);
    }

    #[tokio::test]
    async fn tampered_token_is_invalid() {
        let (svc, _) = setup();
        let issued = svc.register_user("a@x.com", "A", "secret1").await.unwrap();

        let mut parts: Vec<String> = issued.token.split('.').map(str::to_owned).collect();
        let sig = parts[2].clone();
        let flipped = if sig.starts_with('A') { 'B' } else { 'A' };
        parts[2] = format!("{flipped}{}", &sig[1..]);
        let tampered = parts.join(".");

        let err = svc.verify_token(&tampered).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        let err = svc.verify_token("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let (svc, _) = setup();
        let issued = svc.register_user("a@x.com", "A", "secret1").await.unwrap();
        let mut claims = svc.keys.verify(&issued.token).unwrap();
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        let stale = svc.keys.sign_claims(&claims).unwrap();

        let err = svc.verify_token(&stale).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn token_payload_never_contains_hash() {
        let (svc, store) = setup();
        let reg = svc.register_user("a@x.com", "A", "secret1").await.unwrap();
        let login = svc.login_user("a@x.com", "secret1").await.unwrap();
        let verify = svc.verify_token(&login.token).await.unwrap();

        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        for resp in [&reg, &login, &verify] {
            let payload = decode_unchecked(&resp.token);
            assert!(payload.get("password_hash").is_none());
            assert!(payload.get("passwordHash").is_none());
            assert!(!payload.to_string().contains(&stored.password_hash));
            let body = serde_json::to_string(resp).unwrap();
            assert!(!body.contains(&stored.password_hash));
        }
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_store_unavailable() {
        let svc = service_with(Arc::new(UnavailableUserStore));
        let err = svc.register_user("a@x.com", "A", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
        let err = svc.login_user("a@x.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn worked_example() {
        let (svc, _) = setup();
        svc.register_user("a@x.com", "A", "secret1").await.unwrap();
        assert!(matches!(
            svc.register_user("a@x.com", "A", "secret1").await,
            Err(AuthError::Conflict)
        ));
        assert!(matches!(
            svc.login_user("a@x.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        let t = svc.login_user("a@x.com", "secret1").await.unwrap().token;
        let t2 = svc.verify_token(&t).await.unwrap().token;
        assert_ne!(t, t2);
    }
}
