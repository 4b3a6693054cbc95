//! Product Aggregate

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::Entity;

/// Something the bakery sells. Names are unique across the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Product {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub version: i64,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Unit price in cents.
    #[validate(range(min = 0, max = 100_000))]
    pub price: i64,
}

impl Product {
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        Self { id: None, version: 0, name: name.into(), price }
    }
}

impl Entity for Product {
    const NAME: &'static str = "Product";
    fn id(&self) -> Option<Uuid> { self.id }
    fn version(&self) -> i64 { self.version }
    fn stamp(&mut self, id: Uuid, version: i64) { self.id = Some(id); self.version = version; }
}
