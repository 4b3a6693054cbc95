//! HTTP surface

mod catalog;
mod orders;

use axum::{
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use uuid::Uuid;

use crate::domain::aggregates::{Product, User};
use crate::messaging::EventPublisher;
use crate::services::{DashboardService, OrderService, ProductService, UserService};
use crate::store::{CrudStore, OrderStore, PageRequest, StoreError};
use crate::BakeryError;

pub const USER_HEADER: &str = "x-user-id";

pub type ApiResult<T> = Result<T, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub dashboard: DashboardService,
    pub products: ProductService,
    pub users: UserService,
}

impl AppState {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn CrudStore<Product>>,
        users: Arc<dyn CrudStore<User>>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            orders: OrderService::new(orders.clone()).with_publisher(publisher),
            dashboard: DashboardService::new(orders),
            products: ProductService::new(products),
            users: UserService::new(users),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "bakery-orders"})) }))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/v1/orders/upcoming", get(orders::upcoming_orders))
        .route("/api/v1/orders/:id", get(orders::get_order).put(orders::update_order))
        .route("/api/v1/orders/:id/comments", post(orders::add_comment))
        .route("/api/v1/dashboard", get(orders::dashboard))
        .route("/api/v1/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/api/v1/products/:id",
            get(catalog::get_product).put(catalog::update_product).delete(catalog::delete_product),
        )
        .route("/api/v1/users", get(catalog::list_users).post(catalog::create_user))
        .route("/api/v1/users/:id", get(catalog::get_user).put(catalog::update_user).delete(catalog::delete_user))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub filter: Option<String>,
    pub due_after: Option<NaiveDate>,
}

impl ListParams {
    pub fn page_request(&self) -> PageRequest {
        let default = PageRequest::default();
        PageRequest::new(self.page.unwrap_or(default.page()), self.per_page.unwrap_or(default.per_page()))
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
}

/// Maps service errors to a status and a message safe to show the caller.
pub fn reject(err: BakeryError) -> (StatusCode, String) {
    let status = match &err {
        BakeryError::NotFound { .. } => StatusCode::NOT_FOUND,
        BakeryError::PolicyDenied(_) => StatusCode::FORBIDDEN,
        BakeryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BakeryError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        BakeryError::Store(e) => {
            error!(error = %e, "store failure");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string());
        }
    };
    (status, err.to_string())
}

/// The acting user named by the `x-user-id` header.
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let unauthorized = |msg: &str| (StatusCode::UNAUTHORIZED, msg.to_string());
    let id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing x-user-id header"))?;
    let id = Uuid::parse_str(id.trim()).map_err(|_| unauthorized("Malformed x-user-id header"))?;
    match state.users.load(id).await {
        Ok(user) => Ok(user),
        Err(BakeryError::NotFound { .. }) => Err(unauthorized("Unknown user")),
        Err(e) => Err(reject(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_status_mapping() {
        let id = Uuid::now_v7();
        assert_eq!(reject(BakeryError::NotFound { entity: "Order", id }).0, StatusCode::NOT_FOUND);
        assert_eq!(reject(BakeryError::denied("no")).0, StatusCode::FORBIDDEN);
        assert_eq!(reject(BakeryError::InvalidInput("bad".into())).0, StatusCode::BAD_REQUEST);
        assert_eq!(reject(StoreError::Conflict { entity: "Order", id }.into()).0, StatusCode::CONFLICT);

        let (status, body) = reject(StoreError::StorageError("disk on fire".into()).into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("disk"));
    }

    #[test]
    fn test_list_params_clamp() {
        let params = ListParams { page: Some(0), per_page: Some(1000), ..Default::default() };
        assert_eq!(params.page_request(), PageRequest::new(1, 100));
        assert_eq!(ListParams::default().page_request(), PageRequest::default());
    }
}
