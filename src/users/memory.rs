use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::users::{
    repo::{StoreError, StoreResult, UserStore},
    repo_types::{NewUser, StoredChanges, User, UserCredentials},
};

#[derive(Default)]
struct Rows {
    next_id: i64,
    by_id: BTreeMap<i64, UserCredentials>,
}

impl Rows {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.by_id
            .values()
            .any(|r| r.user.email == email && Some(r.user.id) != except)
    }
}

/// Process-local store for `USER_STORE=memory` and tests.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: RwLock<Rows>,
    #[cfg(test)]
    missing_collection: bool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    /// Makes `find_all` report no collection at all instead of a list.
    pub fn reporting_missing_collection(mut self) -> Self {
        self.missing_collection = true;
        self
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .find_by_email_with_hash(email)
            .await?
            .map(UserCredentials::into_user))
    }

    async fn find_by_email_with_hash(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let rows = self.rows.read().await;
        Ok(rows.by_id.values().find(|r| r.user.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let rows = self.rows.read().await;
        Ok(rows.by_id.get(&id).map(|r| r.user.clone()))
    }

    async fn find_all(&self) -> StoreResult<Option<Vec<User>>> {
        #[cfg(test)]
        if self.missing_collection {
            return Ok(None);
        }
        let rows = self.rows.read().await;
        Ok(Some(rows.by_id.values().map(|r| r.user.clone()).collect()))
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let mut rows = self.rows.write().await;
        if rows.email_taken(&user.email, None) {
            return Err(StoreError::Conflict("email already in use".into()));
        }
        rows.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let stored = User {
            id: rows.next_id,
            username: user.username,
            email: user.email,
            created_at: now,
            updated_at: now,
        };
        rows.by_id.insert(
            stored.id,
            UserCredentials {
                user: stored.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(stored)
    }

    async fn update_fields(&self, id: i64, changes: StoredChanges) -> StoreResult<u64> {
        let mut rows = self.rows.write().await;
        if let Some(email) = &changes.email {
            if rows.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict("email already in use".into()));
            }
        }
        let Some(row) = rows.by_id.get_mut(&id) else {
            return Ok(0);
        };
        if let Some(username) = changes.username {
            row.user.username = username;
        }
        if let Some(email) = changes.email {
            row.user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            row.password_hash = hash;
        }
        row.user.updated_at = OffsetDateTime::now_utc();
        Ok(1)
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<u64> {
        let mut rows = self.rows.write().await;
        Ok(u64::from(rows.by_id.remove(&id).is_some()))
    }
}
