//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgConnection, Postgres};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::{Customer, HistoryItem, Order, OrderItem, OrderSummary, Product, User};
use crate::domain::value_objects::{OrderState, Role};
use crate::domain::Entity;
use crate::store::{
    CrudStore, MonthlySales, OrderFilter, OrderStore, PageRequest, ProductQuantity, StoreError, StoreResult,
};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(sqlx::Error::from)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

fn db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(db.constraint().unwrap_or("unique").to_string());
        }
    }
    StoreError::Database(e)
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::StorageError(format!("Corrupt row: {}", e))
}

fn like_pattern(filter: &str) -> String {
    let escaped = filter.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Half-open `[first day, first day of next period)` range.
fn month_bounds(year: i32, month: u32) -> StoreResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| corrupt(format!("month {}-{}", year, month)))?;
    let end = if month == 12 { NaiveDate::from_ymd_opt(year + 1, 1, 1) } else { NaiveDate::from_ymd_opt(year, month + 1, 1) };
    Ok((start, end.ok_or_else(|| corrupt(format!("month {}-{}", year, month)))?))
}

fn year_bounds(first_year: i32, last_year: i32) -> StoreResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(first_year, 1, 1);
    let end = NaiveDate::from_ymd_opt(last_year + 1, 1, 1);
    start.zip(end).ok_or_else(|| corrupt(format!("years {}..={}", first_year, last_year)))
}

/// Runs the optimistic UPDATE and falls back to INSERT for rows that do not exist yet.
///
/// Both statements bind `$1 = id`, `$2 = version`; returns the version now stored.
async fn upsert_row(
    conn: &mut PgConnection,
    entity: &'static str,
    table: &'static str,
    id: Uuid,
    expected_version: Option<i64>,
    update: PgQuery<'_>,
    insert: PgQuery<'_>,
) -> StoreResult<i64> {
    if let Some(version) = expected_version {
        if update.execute(&mut *conn).await.map_err(db_error)?.rows_affected() == 1 {
            return Ok(version + 1);
        }
        let exists: Option<(Uuid,)> = sqlx::query_as(&format!("SELECT id FROM {} WHERE id = $1", table))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;
        if exists.is_some() {
            return Err(StoreError::Conflict { entity, id });
        }
    }
    insert.execute(&mut *conn).await.map_err(db_error)?;
    Ok(0)
}

// =============================================================================
// Generic CRUD records
// =============================================================================

trait PgRecord: Entity {
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin;

    const TABLE: &'static str;
    const COLUMNS: &'static str;
    const UPDATE: &'static str;
    const INSERT: &'static str;
    /// Predicate over `$1`, an ILIKE pattern.
    const SEARCH: &'static str;
    const ORDER_BY: &'static str;

    fn from_row(row: Self::Row) -> StoreResult<Self>;
    fn bind_columns<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q>;
}

#[derive(FromRow)]
struct ProductRow { id: Uuid, version: i64, name: String, price: i64 }

impl PgRecord for Product {
    type Row = ProductRow;

    const TABLE: &'static str = "products";
    const COLUMNS: &'static str = "id, version, name, price";
    const UPDATE: &'static str = "UPDATE products SET version = $2 + 1, name = $3, price = $4 WHERE id = $1 AND version = $2";
    const INSERT: &'static str = "INSERT INTO products (id, version, name, price) VALUES ($1, $2, $3, $4)";
    const SEARCH: &'static str = "name ILIKE $1";
    const ORDER_BY: &'static str = "name";

    fn from_row(r: ProductRow) -> StoreResult<Self> {
        Ok(Product { id: Some(r.id), version: r.version, name: r.name, price: r.price })
    }

    fn bind_columns<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query.bind(self.name.as_str()).bind(self.price)
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    version: i64,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    role: String,
    locked: bool,
}

impl PgRecord for User {
    type Row = UserRow;

    const TABLE: &'static str = "users";
    const COLUMNS: &'static str = "id, version, email, first_name, last_name, password_hash, role, locked";
    const UPDATE: &'static str = "UPDATE users SET version = $2 + 1, email = $3, first_name = $4, last_name = $5, \
        password_hash = $6, role = $7, locked = $8 WHERE id = $1 AND version = $2";
    const INSERT: &'static str = "INSERT INTO users (id, version, email, first_name, last_name, password_hash, role, locked) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";
    const SEARCH: &'static str = "(email ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1 OR role ILIKE $1)";
    const ORDER_BY: &'static str = "email";

    fn from_row(r: UserRow) -> StoreResult<Self> {
        Ok(User {
            id: Some(r.id),
            version: r.version,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            password_hash: r.password_hash,
            role: r.role.parse::<Role>().map_err(corrupt)?,
            locked: r.locked,
        })
    }

    fn bind_columns<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.email.as_str())
            .bind(self.first_name.as_str())
            .bind(self.last_name.as_str())
            .bind(self.password_hash.as_str())
            .bind(self.role.as_str())
            .bind(self.locked)
    }
}

impl PgStore {
    async fn record_by_id<T: PgRecord>(&self, id: Uuid) -> StoreResult<Option<T>> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", T::COLUMNS, T::TABLE);
        let row = sqlx::query_as::<_, T::Row>(&sql).bind(id).fetch_optional(&self.pool).await.map_err(db_error)?;
        row.map(T::from_row).transpose()
    }

    async fn save_record<T: PgRecord>(&self, mut entity: T) -> StoreResult<T> {
        let id = entity.id().unwrap_or_else(Uuid::now_v7);
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let version = upsert_row(
            &mut tx,
            T::NAME,
            T::TABLE,
            id,
            entity.id().map(|_| entity.version()),
            entity.bind_columns(sqlx::query(T::UPDATE).bind(id).bind(entity.version())),
            entity.bind_columns(sqlx::query(T::INSERT).bind(id).bind(0_i64)),
        )
        .await?;
        tx.commit().await.map_err(db_error)?;
        entity.stamp(id, version);
        Ok(entity)
    }

    async fn delete_record<T: PgRecord>(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", T::TABLE))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn records_matching<T: PgRecord>(&self, filter: Option<&str>, page: PageRequest) -> StoreResult<Vec<T>> {
        let predicate = if filter.is_some() { T::SEARCH } else { "TRUE" };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            T::COLUMNS, T::TABLE, predicate, T::ORDER_BY, page.limit(), page.offset()
        );
        let mut query = sqlx::query_as::<_, T::Row>(&sql);
        if let Some(filter) = filter {
            query = query.bind(like_pattern(filter));
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_error)?;
        rows.into_iter().map(T::from_row).collect()
    }

    async fn count_records<T: PgRecord>(&self, filter: Option<&str>) -> StoreResult<u64> {
        let predicate = if filter.is_some() { T::SEARCH } else { "TRUE" };
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", T::TABLE, predicate);
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(filter) = filter {
            query = query.bind(like_pattern(filter));
        }
        let (count,) = query.fetch_one(&self.pool).await.map_err(db_error)?;
        Ok(count as u64)
    }
}

macro_rules! impl_crud_store {
    ($entity:ty) => {
        #[async_trait]
        impl CrudStore<$entity> for PgStore {
            async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<$entity>> {
                self.record_by_id(id).await
            }

            async fn save(&self, entity: $entity) -> StoreResult<$entity> {
                self.save_record(entity).await
            }

            async fn delete(&self, id: Uuid) -> StoreResult<()> {
                self.delete_record::<$entity>(id).await
            }

            async fn find_matching(&self, filter: Option<&str>, page: PageRequest) -> StoreResult<Vec<$entity>> {
                self.records_matching(filter, page).await
            }

            async fn count_matching(&self, filter: Option<&str>) -> StoreResult<u64> {
                self.count_records::<$entity>(filter).await
            }
        }
    };
}

impl_crud_store!(Product);
impl_crud_store!(User);

// =============================================================================
// Orders
// =============================================================================

const ORDER_COLUMNS: &str = "id, version, created_by, due_date, due_time, pickup_location, \
    customer_full_name, customer_phone_number, customer_details, state";
const UPDATE_ORDER: &str = "UPDATE orders SET version = $2 + 1, created_by = $3, due_date = $4, due_time = $5, \
    pickup_location = $6, customer_full_name = $7, customer_phone_number = $8, customer_details = $9, state = $10 \
    WHERE id = $1 AND version = $2";
const INSERT_ORDER: &str = "INSERT INTO orders (id, version, created_by, due_date, due_time, pickup_location, \
    customer_full_name, customer_phone_number, customer_details, state) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    version: i64,
    created_by: Uuid,
    due_date: NaiveDate,
    due_time: NaiveTime,
    pickup_location: Option<String>,
    customer_full_name: String,
    customer_phone_number: String,
    customer_details: Option<String>,
    state: String,
}

#[derive(FromRow)]
struct ItemRow {
    order_id: Uuid,
    product_id: Uuid,
    product_version: i64,
    product_name: String,
    product_price: i64,
    quantity: i32,
    comment: Option<String>,
}

#[derive(FromRow)]
struct HistoryRow {
    order_id: Uuid,
    author_id: Uuid,
    author_name: String,
    created_at: DateTime<Utc>,
    new_state: Option<String>,
    message: String,
}

fn bind_order<'q>(query: PgQuery<'q>, order: &'q Order) -> PgQuery<'q> {
    query
        .bind(order.created_by)
        .bind(order.due_date)
        .bind(order.due_time)
        .bind(order.pickup_location.as_deref())
        .bind(order.customer.full_name.as_str())
        .bind(order.customer.phone_number.as_str())
        .bind(order.customer.details.as_deref())
        .bind(order.state.as_str())
}

/// SQL predicate and binds for each listing form. Customer names bind before dates.
fn filter_predicate(filter: &OrderFilter) -> (&'static str, Option<String>, Option<NaiveDate>) {
    match filter {
        OrderFilter::All => ("TRUE", None, None),
        OrderFilter::CustomerName(name) => ("customer_full_name ILIKE $1", Some(like_pattern(name)), None),
        OrderFilter::DueAfter(date) => ("due_date > $1", None, Some(*date)),
        OrderFilter::CustomerNameDueAfter(name, date) => {
            ("customer_full_name ILIKE $1 AND due_date > $2", Some(like_pattern(name)), Some(*date))
        }
    }
}

impl PgStore {
    /// Loads items and history for `rows` and assembles full orders, keeping row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let items: Vec<ItemRow> = sqlx::query_as(
            "SELECT oi.order_id, p.id AS product_id, p.version AS product_version, p.name AS product_name, \
             p.price AS product_price, oi.quantity, oi.comment \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             WHERE oi.order_id = ANY($1) ORDER BY oi.order_id, oi.position",
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let history: Vec<HistoryRow> = sqlx::query_as(
            "SELECT order_id, author_id, author_name, created_at, new_state, message \
             FROM order_history WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for r in items {
            items_by_order.entry(r.order_id).or_default().push(OrderItem {
                product: Product { id: Some(r.product_id), version: r.product_version, name: r.product_name, price: r.product_price },
                quantity: r.quantity,
                comment: r.comment,
            });
        }

        let mut history_by_order: HashMap<Uuid, Vec<HistoryItem>> = HashMap::new();
        for r in history {
            let new_state = r.new_state.map(|s| s.parse::<OrderState>()).transpose().map_err(corrupt)?;
            history_by_order.entry(r.order_id).or_default().push(HistoryItem {
                author_id: r.author_id,
                author_name: r.author_name,
                timestamp: r.created_at,
                new_state,
                message: r.message,
            });
        }

        rows.into_iter()
            .map(|r| {
                Ok(Order {
                    id: Some(r.id),
                    version: r.version,
                    created_by: r.created_by,
                    due_date: r.due_date,
                    due_time: r.due_time,
                    pickup_location: r.pickup_location,
                    customer: Customer {
                        full_name: r.customer_full_name,
                        phone_number: r.customer_phone_number,
                        details: r.customer_details,
                    },
                    items: items_by_order.remove(&r.id).unwrap_or_default(),
                    state: r.state.parse::<OrderState>().map_err(corrupt)?,
                    history: history_by_order.remove(&r.id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn count(&self, sql: &str, date: NaiveDate, states: Option<Vec<String>>) -> StoreResult<u64> {
        let mut query = sqlx::query_as::<_, (i64,)>(sql).bind(date);
        if let Some(states) = states {
            query = query.bind(states);
        }
        let (count,) = query.fetch_one(&self.pool).await.map_err(db_error)?;
        Ok(count as u64)
    }

    async fn grouped_counts(&self, sql: &str, state: OrderState, from: NaiveDate, until: NaiveDate) -> StoreResult<Vec<(u32, u64)>> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(sql)
            .bind(state.as_str())
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(|(key, count)| (key as u32, count as u64)).collect())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    async fn save(&self, mut order: Order) -> StoreResult<Order> {
        let id = order.id.unwrap_or_else(Uuid::now_v7);
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let version = upsert_row(
            &mut tx,
            Order::NAME,
            "orders",
            id,
            order.id.map(|_| order.version),
            bind_order(sqlx::query(UPDATE_ORDER).bind(id).bind(order.version), &order),
            bind_order(sqlx::query(INSERT_ORDER).bind(id).bind(0_i64), &order),
        )
        .await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1").bind(id).execute(&mut *tx).await.map_err(db_error)?;
        for (position, item) in order.items.iter().enumerate() {
            let product_id = item
                .product
                .id
                .ok_or_else(|| StoreError::StorageError(format!("Order item '{}' has no saved product", item.product.name)))?;
            sqlx::query("INSERT INTO order_items (order_id, position, product_id, quantity, comment) VALUES ($1, $2, $3, $4, $5)")
                .bind(id)
                .bind(position as i32)
                .bind(product_id)
                .bind(item.quantity)
                .bind(item.comment.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        // History is append-only: only entries past the persisted tail are written.
        let (persisted,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_history WHERE order_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        for (position, entry) in order.history.iter().enumerate().skip(persisted as usize) {
            sqlx::query(
                "INSERT INTO order_history (order_id, position, author_id, author_name, created_at, new_state, message) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(id)
            .bind(position as i32)
            .bind(entry.author_id)
            .bind(entry.author_name.as_str())
            .bind(entry.timestamp)
            .bind(entry.new_state.map(OrderState::as_str))
            .bind(entry.message.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        debug!(order_id = %id, version, "order committed");
        order.stamp(id, version);
        Ok(order)
    }

    async fn find_orders(&self, filter: &OrderFilter, page: PageRequest) -> StoreResult<Vec<Order>> {
        let (predicate, name, date) = filter_predicate(filter);
        let sql = format!(
            "SELECT {} FROM orders WHERE {} ORDER BY due_date, due_time, id LIMIT {} OFFSET {}",
            ORDER_COLUMNS, predicate, page.limit(), page.offset()
        );
        let mut query = sqlx::query_as::<_, OrderRow>(&sql);
        if let Some(name) = name {
            query = query.bind(name);
        }
        if let Some(date) = date {
            query = query.bind(date);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_error)?;
        self.hydrate(rows).await
    }

    async fn count_orders(&self, filter: &OrderFilter) -> StoreResult<u64> {
        let (predicate, name, date) = filter_predicate(filter);
        let sql = format!("SELECT COUNT(*) FROM orders WHERE {}", predicate);
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(name) = name {
            query = query.bind(name);
        }
        if let Some(date) = date {
            query = query.bind(date);
        }
        let (count,) = query.fetch_one(&self.pool).await.map_err(db_error)?;
        Ok(count as u64)
    }

    async fn find_summaries_due_from(&self, date: NaiveDate) -> StoreResult<Vec<OrderSummary>> {
        let rows: Vec<(Uuid, NaiveDate, NaiveTime, String, String, Option<String>, i64)> = sqlx::query_as(
            "SELECT o.id, o.due_date, o.due_time, o.state, o.customer_full_name, o.pickup_location, \
             COALESCE(SUM(oi.quantity * p.price), 0)::BIGINT \
             FROM orders o \
             LEFT JOIN order_items oi ON oi.order_id = o.id \
             LEFT JOIN products p ON p.id = oi.product_id \
             WHERE o.due_date >= $1 \
             GROUP BY o.id ORDER BY o.due_date, o.due_time, o.id",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|(id, due_date, due_time, state, customer_name, pickup_location, total_price)| {
                Ok(OrderSummary {
                    id,
                    due_date,
                    due_time,
                    state: state.parse::<OrderState>().map_err(corrupt)?,
                    customer_name,
                    pickup_location,
                    total_price,
                })
            })
            .collect()
    }

    async fn count_by_due_date(&self, date: NaiveDate) -> StoreResult<u64> {
        self.count("SELECT COUNT(*) FROM orders WHERE due_date = $1", date, None).await
    }

    async fn count_by_due_date_and_states(&self, date: NaiveDate, states: &[OrderState]) -> StoreResult<u64> {
        let states = states.iter().map(|s| s.as_str().to_string()).collect();
        self.count("SELECT COUNT(*) FROM orders WHERE due_date = $1 AND state = ANY($2)", date, Some(states)).await
    }

    async fn count_by_state(&self, state: OrderState) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE state = $1")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    async fn count_per_day(&self, state: OrderState, year: i32, month: u32) -> StoreResult<Vec<(u32, u64)>> {
        let (from, until) = month_bounds(year, month)?;
        self.grouped_counts(
            "SELECT EXTRACT(DAY FROM due_date)::INT4 AS day, COUNT(*) FROM orders \
             WHERE state = $1 AND due_date >= $2 AND due_date < $3 GROUP BY day ORDER BY day",
            state,
            from,
            until,
        )
        .await
    }

    async fn count_per_month(&self, state: OrderState, year: i32) -> StoreResult<Vec<(u32, u64)>> {
        let (from, until) = year_bounds(year, year)?;
        self.grouped_counts(
            "SELECT EXTRACT(MONTH FROM due_date)::INT4 AS month, COUNT(*) FROM orders \
             WHERE state = $1 AND due_date >= $2 AND due_date < $3 GROUP BY month ORDER BY month",
            state,
            from,
            until,
        )
        .await
    }

    async fn sum_per_month_last_three_years(&self, state: OrderState, year: i32) -> StoreResult<Vec<MonthlySales>> {
        let (from, until) = year_bounds(year - 2, year)?;
        let rows: Vec<(i32, i32, i64)> = sqlx::query_as(
            "SELECT EXTRACT(YEAR FROM o.due_date)::INT4 AS y, EXTRACT(MONTH FROM o.due_date)::INT4 AS m, \
             SUM(oi.quantity * p.price)::BIGINT \
             FROM orders o JOIN order_items oi ON oi.order_id = o.id JOIN products p ON p.id = oi.product_id \
             WHERE o.state = $1 AND o.due_date >= $2 AND o.due_date < $3 \
             GROUP BY y, m ORDER BY y DESC, m",
        )
        .bind(state.as_str())
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(|(year, month, total)| MonthlySales { year, month: month as u32, total }).collect())
    }

    async fn count_per_product(&self, state: OrderState, year: i32, month: u32) -> StoreResult<Vec<ProductQuantity>> {
        let (from, until) = month_bounds(year, month)?;
        let rows: Vec<(Uuid, i64, String, i64, i64)> = sqlx::query_as(
            "SELECT p.id, p.version, p.name, p.price, SUM(oi.quantity)::BIGINT AS quantity \
             FROM orders o JOIN order_items oi ON oi.order_id = o.id JOIN products p ON p.id = oi.product_id \
             WHERE o.state = $1 AND o.due_date >= $2 AND o.due_date < $3 \
             GROUP BY p.id, p.version, p.name, p.price ORDER BY quantity DESC, p.name",
        )
        .bind(state.as_str())
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, version, name, price, quantity)| ProductQuantity {
                product: Product { id: Some(id), version, name, price },
                quantity: quantity as u64,
            })
            .collect())
    }
}
