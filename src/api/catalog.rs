use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{current_user, reject, ApiResult, AppState, ListParams, PaginatedResponse};
use crate::domain::aggregates::{Product, User};
use crate::domain::value_objects::Role;

/// `version` is echoed back on updates so stale edits are rejected.
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub price: i64,
    pub version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub locked: bool,
    pub version: Option<i64>,
}

impl UserRequest {
    fn apply(self, user: &mut User) {
        user.email = self.email;
        user.first_name = self.first_name;
        user.last_name = self.last_name;
        user.role = self.role;
        user.locked = self.locked;
        if let Some(version) = self.version {
            user.version = version;
        }
    }
}

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<Product>>> {
    let page = p.page_request();
    let data = s.products.find_any_matching(p.filter.as_deref(), page).await.map_err(reject)?;
    let total = s.products.count_any_matching(p.filter.as_deref()).await.map_err(reject)?;
    Ok(Json(PaginatedResponse { data, total, page: page.page() }))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    s.products.load(id).await.map(Json).map_err(reject)
}

pub async fn create_product(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<ProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let user = current_user(&s, &headers).await?;
    let product = s.products.save(&user, Product::new(r.name, r.price)).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(r): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    let user = current_user(&s, &headers).await?;
    let mut product = s.products.load(id).await.map_err(reject)?;
    product.name = r.name;
    product.price = r.price;
    if let Some(version) = r.version {
        product.version = version;
    }
    s.products.save(&user, product).await.map(Json).map_err(reject)
}

pub async fn delete_product(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    current_user(&s, &headers).await?;
    let product = s.products.load(id).await.map_err(reject)?;
    s.products.delete(&product).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(State(s): State<AppState>, Query(p): Query<ListParams>) -> ApiResult<Json<PaginatedResponse<User>>> {
    let page = p.page_request();
    let data = s.users.find_any_matching(p.filter.as_deref(), page).await.map_err(reject)?;
    let total = s.users.count_any_matching(p.filter.as_deref()).await.map_err(reject)?;
    Ok(Json(PaginatedResponse { data, total, page: page.page() }))
}

pub async fn get_user(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    s.users.load(id).await.map(Json).map_err(reject)
}

pub async fn create_user(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<UserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let actor = current_user(&s, &headers).await?;
    let mut user = User::new("", "", "", r.role);
    r.apply(&mut user);
    let user = s.users.save(&actor, user).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(r): Json<UserRequest>,
) -> ApiResult<Json<User>> {
    let actor = current_user(&s, &headers).await?;
    let mut user = s.users.load(id).await.map_err(reject)?;
    r.apply(&mut user);
    s.users.save(&actor, user).await.map(Json).map_err(reject)
}

pub async fn delete_user(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let actor = current_user(&s, &headers).await?;
    let user = s.users.load(id).await.map_err(reject)?;
    s.users.delete(&actor, &user).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}
