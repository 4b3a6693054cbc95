//! Aggregates module
pub mod order;
pub mod product;
pub mod user;

pub use order::{Author, Customer, HistoryItem, Order, OrderItem, OrderSummary};
pub use product::Product;
pub use user::User;
