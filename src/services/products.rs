//! Product catalog

use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Product, User};
use crate::services::crud::CrudService;
use crate::store::{CrudStore, PageRequest, StoreError};
use crate::{BakeryError, Result};

pub const DUPLICATE_PRODUCT_NAME: &str =
    "There is already a product with that name. Please select a unique name for the product.";

#[derive(Clone)]
pub struct ProductService {
    crud: CrudService<Product>,
}

impl ProductService {
    pub fn new(store: Arc<dyn CrudStore<Product>>) -> Self {
        Self { crud: CrudService::new(store) }
    }

    pub async fn load(&self, id: Uuid) -> Result<Product> { self.crud.load(id).await }

    pub async fn find_any_matching(&self, filter: Option<&str>, page: PageRequest) -> Result<Vec<Product>> {
        self.crud.find_any_matching(filter, page).await
    }

    pub async fn count_any_matching(&self, filter: Option<&str>) -> Result<u64> {
        self.crud.count_any_matching(filter).await
    }

    /// Name collisions come back as a user-facing denial; the constraint detail is dropped.
    #[instrument(skip_all, fields(actor = ?current_user.id, product = %product.name))]
    pub async fn save(&self, current_user: &User, product: Product) -> Result<Product> {
        match self.crud.save(product).await {
            Err(BakeryError::Store(StoreError::UniqueViolation(constraint))) => {
                warn!(%constraint, "duplicate product name");
                Err(BakeryError::denied(DUPLICATE_PRODUCT_NAME))
            }
            other => other,
        }
    }

    pub async fn delete(&self, product: &Product) -> Result<()> { self.crud.delete(product).await }
}
