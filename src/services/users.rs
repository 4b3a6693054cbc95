//! User administration guarded by account policies

use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::User;
use crate::services::crud::CrudService;
use crate::store::{CrudStore, PageRequest, StoreError};
use crate::{BakeryError, Result};

pub const MODIFY_LOCKED_USER_NOT_PERMITTED: &str = "User has been locked and cannot be modified or deleted";
pub const DELETING_SELF_NOT_PERMITTED: &str = "You cannot delete your own account";
pub const DUPLICATE_EMAIL: &str = "There is already a user with that email. Please select a unique email.";

/// Wraps the generic CRUD service; guards run before anything reaches the store.
#[derive(Clone)]
pub struct UserService {
    crud: CrudService<User>,
}

impl UserService {
    pub fn new(store: Arc<dyn CrudStore<User>>) -> Self {
        Self { crud: CrudService::new(store) }
    }

    pub async fn load(&self, id: Uuid) -> Result<User> { self.crud.load(id).await }

    pub async fn find_any_matching(&self, filter: Option<&str>, page: PageRequest) -> Result<Vec<User>> {
        self.crud.find_any_matching(filter, page).await
    }

    pub async fn count_any_matching(&self, filter: Option<&str>) -> Result<u64> {
        self.crud.count_any_matching(filter).await
    }

    #[instrument(skip_all, fields(actor = ?current_user.id, target = ?user.id))]
    pub async fn save(&self, current_user: &User, user: User) -> Result<User> {
        self.ensure_unlocked(&user).await?;
        match self.crud.save(user).await {
            Err(BakeryError::Store(StoreError::UniqueViolation(_))) => Err(BakeryError::denied(DUPLICATE_EMAIL)),
            other => other,
        }
    }

    #[instrument(skip_all, fields(actor = ?current_user.id, target = ?user.id))]
    pub async fn delete(&self, current_user: &User, user: &User) -> Result<()> {
        if current_user.is_same_account(user) {
            warn!("self deletion denied");
            return Err(BakeryError::denied(DELETING_SELF_NOT_PERMITTED));
        }
        self.ensure_unlocked(user).await?;
        self.crud.delete(user).await
    }

    /// Checks both the submitted copy and the stored account.
    async fn ensure_unlocked(&self, user: &User) -> Result<()> {
        let stored_locked = match user.id {
            Some(id) => self.crud.find(id).await?.is_some_and(|stored| stored.locked),
            None => false,
        };
        if user.locked || stored_locked {
            warn!("locked account change denied");
            return Err(BakeryError::denied(MODIFY_LOCKED_USER_NOT_PERMITTED));
        }
        Ok(())
    }
}
