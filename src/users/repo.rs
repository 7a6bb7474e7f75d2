use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::users::repo_types::{NewUser, StoredChanges, User, UserCredentials};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Conflict(_) => Some(409),
            StoreError::Database(_) => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract the credential service runs against.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_email_with_hash(&self, email: &str) -> StoreResult<Option<UserCredentials>>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    /// `None` means the store had no collection to report, which is not the
    /// same as an empty one.
    async fn find_all(&self) -> StoreResult<Option<Vec<User>>>;
    async fn insert(&self, user: NewUser) -> StoreResult<User>;
    /// Returns the number of affected rows.
    async fn update_fields(&self, id: i64, changes: StoredChanges) -> StoreResult<u64>;
    /// Returns the number of affected rows.
    async fn delete_by_id(&self, id: i64) -> StoreResult<u64>;
}

const USER_COLUMNS: &str = "id, username, email, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict("email already in use".into())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email_with_hash(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let user = sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    // A query always yields a (possibly empty) row set.
    async fn find_all(&self) -> StoreResult<Option<Vec<User>>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(Some(users))
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let stored = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)?;
        Ok(stored)
    }

    async fn update_fields(&self, id: i64, changes: StoredChanges) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET username      = COALESCE($2, username),
                   email         = COALESCE($3, email),
                   password_hash = COALESCE($4, password_hash),
                   updated_at    = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .execute(&self.db)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
