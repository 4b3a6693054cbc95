//! In-memory store for development and tests

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderItem, OrderSummary, Product, User};
use crate::domain::value_objects::OrderState;
use crate::domain::Entity;
use crate::store::{
    CrudStore, MonthlySales, OrderFilter, OrderStore, PageRequest, ProductQuantity, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    products: HashMap<Uuid, Product>,
    users: HashMap<Uuid, User>,
}

/// Store backed by hash maps behind one lock.
///
/// Every write happens under a single write guard, which gives the same
/// all-or-nothing visibility as a database transaction.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|e| StoreError::StorageError(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|e| StoreError::StorageError(format!("Failed to acquire write lock: {}", e)))
    }
}

/// Assigns identity and bumps the version, rejecting stale writes.
fn upsert<T: Entity>(table: &mut HashMap<Uuid, T>, mut entity: T) -> StoreResult<T> {
    let id = entity.id().unwrap_or_else(Uuid::now_v7);
    let version = match table.get(&id).map(Entity::version) {
        Some(current) if current != entity.version() => return Err(StoreError::Conflict { entity: T::NAME, id }),
        Some(current) => current + 1,
        None => 0,
    };
    entity.stamp(id, version);
    table.insert(id, entity.clone());
    Ok(entity)
}

fn paginate<T>(rows: Vec<T>, page: PageRequest) -> Vec<T> {
    rows.into_iter().skip(page.offset() as usize).take(page.limit() as usize).collect()
}

fn in_month(date: NaiveDate, year: i32, month: u32) -> bool {
    date.year() == year && date.month() == month
}

// =============================================================================
// Generic CRUD tables
// =============================================================================

trait Table: Entity {
    const UNIQUE_CONSTRAINT: &'static str;

    fn table(tables: &Tables) -> &HashMap<Uuid, Self>;
    fn table_mut(tables: &mut Tables) -> &mut HashMap<Uuid, Self>;
    fn unique_key(&self) -> &str;
    /// `needle` is already lowercase.
    fn matches(&self, needle: &str) -> bool;
}

impl Table for Product {
    const UNIQUE_CONSTRAINT: &'static str = "products_name_key";

    fn table(tables: &Tables) -> &HashMap<Uuid, Self> { &tables.products }
    fn table_mut(tables: &mut Tables) -> &mut HashMap<Uuid, Self> { &mut tables.products }
    fn unique_key(&self) -> &str { &self.name }
    fn matches(&self, needle: &str) -> bool { self.name.to_lowercase().contains(needle) }
}

impl Table for User {
    const UNIQUE_CONSTRAINT: &'static str = "users_email_key";

    fn table(tables: &Tables) -> &HashMap<Uuid, Self> { &tables.users }
    fn table_mut(tables: &mut Tables) -> &mut HashMap<Uuid, Self> { &mut tables.users }
    fn unique_key(&self) -> &str { &self.email }
    fn matches(&self, needle: &str) -> bool {
        [self.email.as_str(), self.first_name.as_str(), self.last_name.as_str(), self.role.as_str()]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

impl MemoryStore {
    fn crud_find<T: Table>(&self, id: Uuid) -> StoreResult<Option<T>> {
        Ok(T::table(&*self.read()?).get(&id).cloned())
    }

    fn crud_save<T: Table>(&self, entity: T) -> StoreResult<T> {
        let mut tables = self.write()?;
        let table = T::table_mut(&mut tables);
        let duplicate = table
            .values()
            .any(|other| other.id() != entity.id() && other.unique_key() == entity.unique_key());
        if duplicate {
            return Err(StoreError::UniqueViolation(T::UNIQUE_CONSTRAINT.to_string()));
        }
        upsert(table, entity)
    }

    fn crud_delete<T: Table>(&self, id: Uuid) -> StoreResult<()> {
        T::table_mut(&mut *self.write()?).remove(&id);
        Ok(())
    }

    fn crud_matching<T: Table>(&self, filter: Option<&str>) -> StoreResult<Vec<T>> {
        let tables = self.read()?;
        let needle = filter.map(str::to_lowercase);
        let mut rows: Vec<T> = T::table(&tables)
            .values()
            .filter(|row| needle.as_deref().map_or(true, |n| row.matches(n)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.unique_key().cmp(b.unique_key()));
        Ok(rows)
    }
}

macro_rules! impl_crud_store {
    ($entity:ty) => {
        #[async_trait]
        impl CrudStore<$entity> for MemoryStore {
            async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<$entity>> {
                self.crud_find(id)
            }

            async fn save(&self, entity: $entity) -> StoreResult<$entity> {
                self.crud_save(entity)
            }

            async fn delete(&self, id: Uuid) -> StoreResult<()> {
                self.crud_delete::<$entity>(id)
            }

            async fn find_matching(&self, filter: Option<&str>, page: PageRequest) -> StoreResult<Vec<$entity>> {
                Ok(paginate(self.crud_matching(filter)?, page))
            }

            async fn count_matching(&self, filter: Option<&str>) -> StoreResult<u64> {
                Ok(self.crud_matching::<$entity>(filter)?.len() as u64)
            }
        }
    };
}

impl_crud_store!(Product);
impl_crud_store!(User);

// =============================================================================
// Orders
// =============================================================================

fn order_matches(order: &Order, filter: &OrderFilter) -> bool {
    let name_matches = |needle: &str| order.customer.full_name.to_lowercase().contains(&needle.to_lowercase());
    match filter {
        OrderFilter::All => true,
        OrderFilter::CustomerName(name) => name_matches(name),
        OrderFilter::DueAfter(date) => order.due_date > *date,
        OrderFilter::CustomerNameDueAfter(name, date) => name_matches(name) && order.due_date > *date,
    }
}

impl MemoryStore {
    fn orders_where(&self, predicate: impl Fn(&Order) -> bool) -> StoreResult<Vec<Order>> {
        let tables = self.read()?;
        let mut rows: Vec<Order> = tables.orders.values().filter(|o| predicate(o)).cloned().collect();
        rows.sort_by_key(|o| (o.due_date, o.due_time, o.id));
        Ok(rows)
    }

    fn count_where(&self, predicate: impl Fn(&Order) -> bool) -> StoreResult<u64> {
        Ok(self.read()?.orders.values().filter(|o| predicate(o)).count() as u64)
    }

    /// Line items resolved against the current catalog, as a join would.
    fn delivered_items<'a>(tables: &'a Tables, order: &'a Order) -> impl Iterator<Item = (Product, &'a OrderItem)> + 'a {
        order.items.iter().map(move |item| {
            let product = item
                .product
                .id
                .and_then(|id| tables.products.get(&id).cloned())
                .unwrap_or_else(|| item.product.clone());
            (product, item)
        })
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    /// Items must point at saved products, matching the foreign key in SQL.
    async fn save(&self, order: Order) -> StoreResult<Order> {
        if let Some(item) = order.items.iter().find(|item| item.product.id.is_none()) {
            return Err(StoreError::StorageError(format!("Order item '{}' has no saved product", item.product.name)));
        }
        upsert(&mut self.write()?.orders, order)
    }

    async fn find_orders(&self, filter: &OrderFilter, page: PageRequest) -> StoreResult<Vec<Order>> {
        Ok(paginate(self.orders_where(|o| order_matches(o, filter))?, page))
    }

    async fn count_orders(&self, filter: &OrderFilter) -> StoreResult<u64> {
        self.count_where(|o| order_matches(o, filter))
    }

    async fn find_summaries_due_from(&self, date: NaiveDate) -> StoreResult<Vec<OrderSummary>> {
        Ok(self.orders_where(|o| o.due_date >= date)?.iter().filter_map(Order::summary).collect())
    }

    async fn count_by_due_date(&self, date: NaiveDate) -> StoreResult<u64> {
        self.count_where(|o| o.due_date == date)
    }

    async fn count_by_due_date_and_states(&self, date: NaiveDate, states: &[OrderState]) -> StoreResult<u64> {
        self.count_where(|o| o.due_date == date && states.contains(&o.state()))
    }

    async fn count_by_state(&self, state: OrderState) -> StoreResult<u64> {
        self.count_where(|o| o.state() == state)
    }

    async fn count_per_day(&self, state: OrderState, year: i32, month: u32) -> StoreResult<Vec<(u32, u64)>> {
        let tables = self.read()?;
        let mut days: BTreeMap<u32, u64> = BTreeMap::new();
        for order in tables.orders.values().filter(|o| o.state() == state && in_month(o.due_date, year, month)) {
            *days.entry(order.due_date.day()).or_default() += 1;
        }
        Ok(days.into_iter().collect())
    }

    async fn count_per_month(&self, state: OrderState, year: i32) -> StoreResult<Vec<(u32, u64)>> {
        let tables = self.read()?;
        let mut months: BTreeMap<u32, u64> = BTreeMap::new();
        for order in tables.orders.values().filter(|o| o.state() == state && o.due_date.year() == year) {
            *months.entry(order.due_date.month()).or_default() += 1;
        }
        Ok(months.into_iter().collect())
    }

    async fn sum_per_month_last_three_years(&self, state: OrderState, year: i32) -> StoreResult<Vec<MonthlySales>> {
        let tables = self.read()?;
        let mut buckets: BTreeMap<(Reverse<i32>, u32), i64> = BTreeMap::new();
        let orders = tables
            .orders
            .values()
            .filter(|o| o.state() == state && (year - 2..=year).contains(&o.due_date.year()));
        for order in orders {
            let key = (Reverse(order.due_date.year()), order.due_date.month());
            for (product, item) in Self::delivered_items(&tables, order) {
                *buckets.entry(key).or_default() += product.price * i64::from(item.quantity);
            }
        }
        Ok(buckets
            .into_iter()
            .map(|((Reverse(year), month), total)| MonthlySales { year, month, total })
            .collect())
    }

    async fn count_per_product(&self, state: OrderState, year: i32, month: u32) -> StoreResult<Vec<ProductQuantity>> {
        let tables = self.read()?;
        let mut per_product: HashMap<Uuid, ProductQuantity> = HashMap::new();
        for order in tables.orders.values().filter(|o| o.state() == state && in_month(o.due_date, year, month)) {
            for (product, item) in Self::delivered_items(&tables, order) {
                let Some(id) = product.id else { continue };
                per_product
                    .entry(id)
                    .or_insert_with(|| ProductQuantity { product, quantity: 0 })
                    .quantity += item.quantity.max(0) as u64;
            }
        }
        let mut rows: Vec<ProductQuantity> = per_product.into_values().collect();
        rows.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.product.name.cmp(&b.product.name)));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Customer;
    use crate::domain::value_objects::Role;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    fn owner() -> User {
        let mut u = User::new("owner@bakery.test", "Olga", "Owner", Role::Admin);
        u.id = Some(Uuid::now_v7());
        u
    }

    async fn place(store: &MemoryStore, due: NaiveDate, state: OrderState, customer: &str, items: &[(&Product, i32)]) -> Order {
        let user = owner().author().unwrap();
        let mut order = Order::new(&user, due, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        order.customer = Customer { full_name: customer.into(), phone_number: "555".into(), details: None };
        order.items = items.iter().map(|(p, q)| OrderItem { product: (*p).clone(), quantity: *q, comment: None }).collect();
        order.change_state(&user, state);
        OrderStore::save(store, order).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_identity_and_detects_stale_versions() {
        let store = MemoryStore::new();
        let order = place(&store, date(2024, 6, 1), OrderState::New, "Ann", &[]).await;
        assert_eq!(order.version, 0);

        let updated = OrderStore::save(&store, order.clone()).await.unwrap();
        assert_eq!(updated.id, order.id);
        assert_eq!(updated.version, 1);

        let stale = OrderStore::save(&store, order).await;
        assert!(matches!(stale, Err(StoreError::Conflict { entity: "Order", .. })));
    }

    #[tokio::test]
    async fn test_order_items_need_saved_products() {
        let store = MemoryStore::new();
        let croissant = CrudStore::save(&store, Product::new("Croissant", 200)).await.unwrap();
        let user = owner().author().unwrap();
        let mut order = Order::new(&user, date(2024, 6, 3), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        order.customer = Customer { full_name: "Ann".into(), phone_number: "555".into(), details: None };
        order.items = vec![
            OrderItem { product: croissant, quantity: 2, comment: None },
            OrderItem { product: Product::new("Bagel", 100), quantity: 5, comment: None },
        ];
        order.change_state(&user, OrderState::Delivered);

        let err = OrderStore::save(&store, order).await.unwrap_err();
        assert!(matches!(&err, StoreError::StorageError(msg) if msg.contains("Bagel")));
        assert_eq!(store.count_orders(&OrderFilter::All).await.unwrap(), 0);
        assert!(store.count_per_product(OrderState::Delivered, 2024, 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unique_product_name() {
        let store = MemoryStore::new();
        CrudStore::save(&store, Product::new("Croissant", 250)).await.unwrap();
        let dup = CrudStore::save(&store, Product::new("Croissant", 300)).await;
        assert!(matches!(dup, Err(StoreError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_user_filter_spans_fields() {
        let store = MemoryStore::new();
        CrudStore::save(&store, User::new("ann@bakery.test", "Ann", "Smith", Role::Baker)).await.unwrap();
        CrudStore::save(&store, User::new("bob@bakery.test", "Bob", "Jones", Role::Barista)).await.unwrap();
        assert_eq!(CrudStore::<User>::count_matching(&store, Some("smith")).await.unwrap(), 1);
        assert_eq!(CrudStore::<User>::count_matching(&store, Some("barista")).await.unwrap(), 1);
        assert_eq!(CrudStore::<User>::count_matching(&store, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_order_filters_and_order() {
        let store = MemoryStore::new();
        place(&store, date(2024, 6, 3), OrderState::New, "Ann Smith", &[]).await;
        place(&store, date(2024, 6, 1), OrderState::New, "annie hall", &[]).await;
        place(&store, date(2024, 6, 2), OrderState::New, "Bob", &[]).await;

        let all = store.find_orders(&OrderFilter::All, PageRequest::default()).await.unwrap();
        let dates: Vec<_> = all.iter().map(|o| o.due_date.day()).collect();
        assert_eq!(dates, vec![1, 2, 3]);

        assert_eq!(store.count_orders(&OrderFilter::CustomerName("ANN".into())).await.unwrap(), 2);
        assert_eq!(store.count_orders(&OrderFilter::DueAfter(date(2024, 6, 2))).await.unwrap(), 1);
        assert_eq!(
            store.count_orders(&OrderFilter::CustomerNameDueAfter("ann".into(), date(2024, 6, 1))).await.unwrap(),
            1
        );
        let second_page = store.find_orders(&OrderFilter::All, PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(second_page.len(), 1);
    }

    #[tokio::test]
    async fn test_grouped_aggregates() {
        let store = MemoryStore::new();
        let croissant = CrudStore::save(&store, Product::new("Croissant", 200)).await.unwrap();
        let bagel = CrudStore::save(&store, Product::new("Bagel", 100)).await.unwrap();

        place(&store, date(2024, 6, 3), OrderState::Delivered, "A", &[(&croissant, 2)]).await;
        place(&store, date(2024, 6, 3), OrderState::Delivered, "B", &[(&bagel, 5)]).await;
        place(&store, date(2024, 6, 10), OrderState::Delivered, "C", &[(&croissant, 1), (&bagel, 1)]).await;
        place(&store, date(2024, 6, 10), OrderState::Ready, "D", &[(&croissant, 9)]).await;
        place(&store, date(2023, 3, 1), OrderState::Delivered, "E", &[(&bagel, 2)]).await;
        place(&store, date(2021, 3, 1), OrderState::Delivered, "F", &[(&bagel, 2)]).await;

        let per_day = store.count_per_day(OrderState::Delivered, 2024, 6).await.unwrap();
        assert_eq!(per_day, vec![(3, 2), (10, 1)]);

        let per_month = store.count_per_month(OrderState::Delivered, 2024).await.unwrap();
        assert_eq!(per_month, vec![(6, 3)]);

        let sales = store.sum_per_month_last_three_years(OrderState::Delivered, 2024).await.unwrap();
        assert_eq!(
            sales,
            vec![MonthlySales { year: 2024, month: 6, total: 1200 }, MonthlySales { year: 2023, month: 3, total: 200 }]
        );

        let products = store.count_per_product(OrderState::Delivered, 2024, 6).await.unwrap();
        let ranking: Vec<_> = products.iter().map(|p| (p.product.name.as_str(), p.quantity)).collect();
        assert_eq!(ranking, vec![("Bagel", 6), ("Croissant", 3)]);
    }
}
