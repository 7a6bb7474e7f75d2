use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::{
    auth::{jwt::TokenIssuer, password::PasswordHasher},
    envelope::Envelope,
    errors::{ServiceError, INVALID_CREDENTIALS, USER_ALREADY_EXISTS, USER_NOT_FOUND},
    users::{
        dto::{AuthPayload, UpdateUserRequest},
        repo::UserStore,
        repo_types::{NewUser, StoredChanges, User},
    },
};

/// Credential operations over an injected store, hasher and token issuer.
///
/// Every public operation returns an [`Envelope`]; failures never escape as
/// errors. The service keeps no state of its own, so one instance is shared
/// across all requests.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    #[instrument(skip(self, email, password))]
    pub async fn register(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> Envelope<AuthPayload> {
        Envelope::from_result(
            self.try_register(username, email, password).await,
            "User created successfully",
        )
    }

    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: String, password: String) -> Envelope<AuthPayload> {
        Envelope::from_result(
            self.try_authenticate(email, password).await,
            "User logged in successfully",
        )
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Envelope<Vec<User>> {
        Envelope::from_result(self.try_list_all().await, "Users fetched successfully")
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Envelope<User> {
        Envelope::from_result(self.try_get_by_id(id).await, "User fetched successfully")
    }

    #[instrument(skip(self, changes))]
    pub async fn update_by_id(&self, id: i64, changes: UpdateUserRequest) -> Envelope<User> {
        Envelope::from_result(
            self.try_update_by_id(id, changes).await,
            "User updated successfully",
        )
    }

    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: i64) -> Envelope<User> {
        Envelope::from_result(self.try_delete_by_id(id).await, "User deleted successfully")
    }

    async fn try_register(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> Result<AuthPayload, ServiceError> {
        if self.store.find_by_email(&email).await?.is_some() {
            warn!("register rejected: email already registered");
            return Err(ServiceError::NotFound(USER_ALREADY_EXISTS));
        }

        let password_hash = self.hash(password).await?;
        let user = self
            .store
            .insert(NewUser {
                username,
                email,
                password_hash,
            })
            .await?;
        let jwt = self.tokens.issue(&user).context("sign token")?;

        info!(user_id = user.id, "user registered");
        Ok(AuthPayload { user, jwt })
    }

    async fn try_authenticate(
        &self,
        email: String,
        password: String,
    ) -> Result<AuthPayload, ServiceError> {
        let Some(creds) = self.store.find_by_email_with_hash(&email).await? else {
            warn!("login unknown email");
            return Err(ServiceError::NotFound(USER_NOT_FOUND));
        };

        if !self.verify(password, creds.password_hash.clone()).await? {
            warn!(user_id = creds.user.id, "login invalid password");
            return Err(ServiceError::NotFound(INVALID_CREDENTIALS));
        }

        let user = creds.into_user();
        let jwt = self.tokens.issue(&user).context("sign token")?;

        info!(user_id = user.id, "user logged in");
        Ok(AuthPayload { user, jwt })
    }

    async fn try_list_all(&self) -> Result<Vec<User>, ServiceError> {
        self.store
            .find_all()
            .await?
            .ok_or(ServiceError::NotFound(USER_NOT_FOUND))
    }

    async fn try_get_by_id(&self, id: i64) -> Result<User, ServiceError> {
        self.existing(id).await
    }

    async fn try_update_by_id(
        &self,
        id: i64,
        changes: UpdateUserRequest,
    ) -> Result<User, ServiceError> {
        self.existing(id).await?;

        let password_hash = match changes.password {
            Some(password) => Some(self.hash(password).await?),
            None => None,
        };
        let stored = StoredChanges {
            username: changes.username,
            email: changes.email,
            password_hash,
        };

        let affected = self.store.update_fields(id, stored).await?;
        if affected == 0 {
            warn!(user_id = id, "user vanished before update");
            return Err(ServiceError::NotFound(USER_NOT_FOUND));
        }

        let user = self.existing(id).await?;
        info!(user_id = id, "user updated");
        Ok(user)
    }

    async fn try_delete_by_id(&self, id: i64) -> Result<User, ServiceError> {
        let snapshot = self.existing(id).await?;

        let affected = self.store.delete_by_id(id).await?;
        if affected == 0 {
            warn!(user_id = id, "user vanished before delete");
            return Err(ServiceError::NotFound(USER_NOT_FOUND));
        }

        info!(user_id = id, "user deleted");
        Ok(snapshot)
    }

    async fn existing(&self, id: i64) -> Result<User, ServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(USER_NOT_FOUND))
    }

    // Hashing is CPU-bound, so it runs off the async workers.
    async fn hash(&self, password: String) -> Result<String, ServiceError> {
        let hasher = Arc::clone(&self.hasher);
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("hash task")??;
        Ok(hash)
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, ServiceError> {
        let hasher = Arc::clone(&self.hasher);
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .context("verify task")??;
        Ok(ok)
    }
}
