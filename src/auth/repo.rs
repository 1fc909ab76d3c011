use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::errors::StoreError;
use crate::auth::repo_types::{NewUser, User};

/// Persistence for user records, keyed by email.
///
/// `create` must enforce email uniqueness atomically and report a clash as
/// [`StoreError::Duplicate`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, password_hash, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    use super::UserStore;
    use crate::auth::errors::StoreError;
    use crate::auth::repo_types::{NewUser, User};

    /// Map-backed store; check and insert happen under one write lock.
    #[derive(Default)]
    pub struct MemoryUserStore {
        users: RwLock<HashMap<String, User>>,
    }

    impl MemoryUserStore {
        pub async fn len(&self) -> usize {
            self.users.read().await.len()
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            Ok(self.users.read().await.get(email).cloned())
        }

        async fn create(&self, user: NewUser) -> Result<User, StoreError> {
            let mut users = self.users.write().await;
            if users.contains_key(&user.email) {
                return Err(StoreError::Duplicate);
            }
            let row = User {
                id: Uuid::new_v4(),
                email: user.email,
                name: user.name,
                password_hash: user.password_hash,
                created_at: OffsetDateTime::now_utc(),
            };
            users.insert(row.email.clone(), row.clone());
            Ok(row)
        }
    }

    /// Store whose backend is always down.
    pub struct UnavailableUserStore;

    #[async_trait]
    impl UserStore for UnavailableUserStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }

        async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_email() {
        let store = MemoryUserStore::default();
        let new = NewUser {
            email: "a@x.com".into(),
            name: "A".into(),
            password_hash: "h".into(),
        };
        store.create(new.clone()).await.expect("first insert");
        let err = store.create(new).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
        assert_eq!(store.len().await, 1);
        assert!(store.find_by_email("a@x.com").await.unwrap().is_some());
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
    }
}
