use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use super::{current_user, reject, ApiResult, AppState, ListParams, PaginatedResponse};
use crate::domain::aggregates::{Customer, Order, OrderItem, OrderSummary};
use crate::domain::reports::DashboardData;
use crate::domain::value_objects::OrderState;
use crate::services::OrderChanges;

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderRequest {
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub pickup_location: Option<String>,
    pub customer: Option<Customer>,
    pub items: Option<Vec<OrderItemRequest>>,
    pub state: Option<OrderState>,
}

impl OrderRequest {
    /// Resolves product references against the catalog.
    async fn into_changes(self, state: &AppState) -> ApiResult<OrderChanges> {
        let items = match self.items {
            None => None,
            Some(requested) => {
                let mut items = Vec::with_capacity(requested.len());
                for item in requested {
                    let product = state.products.load(item.product_id).await.map_err(reject)?;
                    items.push(OrderItem { product, quantity: item.quantity, comment: item.comment });
                }
                Some(items)
            }
        };
        Ok(OrderChanges {
            due_date: self.due_date,
            due_time: self.due_time,
            pickup_location: self.pickup_location,
            customer: self.customer,
            items,
            state: self.state,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

pub async fn list_orders(State(s): State<AppState>, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<Order>>> {
    let page = p.page_request();
    let filter = p.filter.as_deref();
    let data = s.orders.find_any_matching_after_due_date(filter, p.due_after, page).await.map_err(reject)?;
    let total = s.orders.count_any_matching_after_due_date(filter, p.due_after).await.map_err(reject)?;
    Ok(Json(PaginatedResponse { data, total, page: page.page() }))
}

pub async fn upcoming_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<OrderSummary>>> {
    s.orders.find_any_matching_starting_today().await.map(Json).map_err(reject)
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    s.orders.load(id).await.map(Json).map_err(reject)
}

pub async fn create_order(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<OrderRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let user = current_user(&s, &headers).await?;
    let changes = r.into_changes(&s).await?;
    let order = s.orders.save_order_with(&user, None, &changes).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn update_order(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(r): Json<OrderRequest>,
) -> ApiResult<Json<Order>> {
    let user = current_user(&s, &headers).await?;
    let changes = r.into_changes(&s).await?;
    s.orders.save_order_with(&user, Some(id), &changes).await.map(Json).map_err(reject)
}

pub async fn add_comment(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(r): Json<CommentRequest>,
) -> ApiResult<Json<Order>> {
    let user = current_user(&s, &headers).await?;
    let order = s.orders.load(id).await.map_err(reject)?;
    s.orders.add_comment(&user, order, &r.message).await.map(Json).map_err(reject)
}

/// Defaults to the current month.
pub async fn dashboard(State(s): State<AppState>, Query(p): Query<DashboardParams>) -> ApiResult<Json<DashboardData>> {
    let today = s.dashboard.today();
    let month = p.month.unwrap_or_else(|| today.month());
    let year = p.year.unwrap_or_else(|| today.year());
    s.dashboard.dashboard_data_on(today, month, year).await.map(Json).map_err(reject)
}
