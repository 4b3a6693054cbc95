//! Generic create/read/update/delete with an optional text filter

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::Entity;
use crate::store::{CrudStore, PageRequest};
use crate::{BakeryError, Result};

/// Blank filters mean "no filter".
pub fn normalize_filter(filter: Option<&str>) -> Option<&str> {
    filter.map(str::trim).filter(|f| !f.is_empty())
}

pub struct CrudService<T: Entity> {
    store: Arc<dyn CrudStore<T>>,
}

impl<T: Entity> Clone for CrudService<T> {
    fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<T: Entity + Validate> CrudService<T> {
    pub fn new(store: Arc<dyn CrudStore<T>>) -> Self { Self { store } }

    pub async fn find(&self, id: Uuid) -> Result<Option<T>> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn load(&self, id: Uuid) -> Result<T> {
        self.find(id).await?.ok_or(BakeryError::NotFound { entity: T::NAME, id })
    }

    #[instrument(skip(self, entity), fields(entity = T::NAME, id = ?entity.id()))]
    pub async fn save(&self, entity: T) -> Result<T> {
        entity.validate()?;
        let saved = self.store.save(entity).await?;
        info!(id = ?saved.id(), version = saved.version(), "saved");
        Ok(saved)
    }

    /// Unsaved entities have nothing to delete.
    #[instrument(skip(self, entity), fields(entity = T::NAME, id = ?entity.id()))]
    pub async fn delete(&self, entity: &T) -> Result<()> {
        if let Some(id) = entity.id() {
            self.store.delete(id).await?;
            info!("deleted");
        }
        Ok(())
    }

    pub async fn delete_by_id(&self, id: Uuid) -> Result<()> {
        let entity = self.load(id).await?;
        self.delete(&entity).await
    }

    pub async fn find_any_matching(&self, filter: Option<&str>, page: PageRequest) -> Result<Vec<T>> {
        Ok(self.store.find_matching(normalize_filter(filter), page).await?)
    }

    pub async fn count_any_matching(&self, filter: Option<&str>) -> Result<u64> {
        Ok(self.store.count_matching(normalize_filter(filter)).await?)
    }
}
