//! Application services

pub mod crud;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod users;

use chrono::{Local, NaiveDate};
use std::sync::Arc;

pub use crud::CrudService;
pub use dashboard::DashboardService;
pub use orders::{OrderChanges, OrderFiller, OrderService};
pub use products::ProductService;
pub use users::UserService;

/// Source of "today" for date windows; swapped out in tests.
pub type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub fn local_today() -> Today {
    Arc::new(|| Local::now().date_naive())
}
