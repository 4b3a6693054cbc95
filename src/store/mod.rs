//! Store traits: the persistence and query seam of the service
//!
//! Services only ever talk to `dyn OrderStore` and `dyn CrudStore<T>`, so the
//! in-memory and PostgreSQL backends are interchangeable.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderSummary, Product};
use crate::domain::value_objects::OrderState;
use crate::domain::Entity;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One page of a listing. `page` starts at 1; only `new` builds one, so the clamps always hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page: page.max(1), per_page: per_page.clamp(1, Self::MAX_PER_PAGE) }
    }

    pub fn page(&self) -> u32 { self.page }
    pub fn per_page(&self) -> u32 { self.per_page }
    pub fn offset(&self) -> u64 { u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page) }
    pub fn limit(&self) -> u64 { u64::from(self.per_page) }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(1, 20) }
}

/// The four order listing query forms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderFilter {
    All,
    CustomerName(String),
    DueAfter(NaiveDate),
    CustomerNameDueAfter(String, NaiveDate),
}

impl OrderFilter {
    /// Blank customer filters are treated as absent.
    pub fn from_parts(customer: Option<&str>, due_after: Option<NaiveDate>) -> Self {
        let customer = customer.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
        match (customer, due_after) {
            (Some(name), Some(date)) => Self::CustomerNameDueAfter(name, date),
            (Some(name), None) => Self::CustomerName(name),
            (None, Some(date)) => Self::DueAfter(date),
            (None, None) => Self::All,
        }
    }
}

/// `(year, month, total)` row of the three-year sales query. Totals are in cents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthlySales {
    pub year: i32,
    pub month: u32,
    pub total: i64,
}

/// `(product, quantity)` row of the per-product delivery query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductQuantity {
    pub product: Product,
    pub quantity: u64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Persists the order with its items and history atomically, assigning id and version.
    async fn save(&self, order: Order) -> StoreResult<Order>;

    /// Matching orders sorted by due date, then due time.
    async fn find_orders(&self, filter: &OrderFilter, page: PageRequest) -> StoreResult<Vec<Order>>;
    async fn count_orders(&self, filter: &OrderFilter) -> StoreResult<u64>;
    async fn find_summaries_due_from(&self, date: NaiveDate) -> StoreResult<Vec<OrderSummary>>;

    async fn count_by_due_date(&self, date: NaiveDate) -> StoreResult<u64>;
    async fn count_by_due_date_and_states(&self, date: NaiveDate, states: &[OrderState]) -> StoreResult<u64>;
    async fn count_by_state(&self, state: OrderState) -> StoreResult<u64>;

    /// `(day_of_month, count)` ascending by day; days without orders are absent.
    async fn count_per_day(&self, state: OrderState, year: i32, month: u32) -> StoreResult<Vec<(u32, u64)>>;
    /// `(month, count)` ascending by month; months without orders are absent.
    async fn count_per_month(&self, state: OrderState, year: i32) -> StoreResult<Vec<(u32, u64)>>;
    /// Sales for `year - 2 ..= year`, year descending then month ascending.
    async fn sum_per_month_last_three_years(&self, state: OrderState, year: i32) -> StoreResult<Vec<MonthlySales>>;
    /// Delivered quantity per product, highest first.
    async fn count_per_product(&self, state: OrderState, year: i32, month: u32) -> StoreResult<Vec<ProductQuantity>>;
}

/// Generic persistence for simple entities (products, users).
#[async_trait]
pub trait CrudStore<T: Entity>: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<T>>;
    async fn save(&self, entity: T) -> StoreResult<T>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// `filter` is a case-insensitive substring; `None` lists everything.
    async fn find_matching(&self, filter: Option<&str>, page: PageRequest) -> StoreResult<Vec<T>>;
    async fn count_matching(&self, filter: Option<&str>) -> StoreResult<u64>;
}
