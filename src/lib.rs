//! Bakery order management
//!
//! Order lifecycle and delivery reporting backend for a small bakery.
//!
//! ## Features
//! - Order lifecycle with an append-only history trail
//! - Delivery statistics and dashboard aggregation
//! - Product catalog and user administration with policy guards
//! - In-memory and PostgreSQL stores behind one trait seam

pub mod api;
pub mod config;
pub mod domain;
pub mod messaging;
pub mod services;
pub mod store;

use thiserror::Error;
use uuid::Uuid;

pub use domain::aggregates::{Customer, HistoryItem, Order, OrderItem, OrderSummary, Product, User};
pub use domain::reports::{DashboardData, DeliveryStats, SalesMatrix};
pub use domain::value_objects::{OrderState, Role};
pub use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum BakeryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Denial meant to be shown to the user as-is.
    #[error("{0}")]
    PolicyDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BakeryError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PolicyDenied(reason.into())
    }
}

impl From<validator::ValidationErrors> for BakeryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidInput(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BakeryError>;
