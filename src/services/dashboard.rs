//! Delivery statistics and dashboard aggregation
//!
//! Turns the sparse grouped rows coming back from the store into the fixed-shape
//! series the dashboard renders. Buckets without rows stay `None`; they are never
//! filled with zero.

use chrono::{Datelike, Duration, NaiveDate};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::domain::reports::{DashboardData, DeliveryStats, SalesMatrix};
use crate::domain::value_objects::{OrderState, NOT_AVAILABLE_STATES};
use crate::services::{local_today, Today};
use crate::store::{MonthlySales, OrderStore, ProductQuantity};
use crate::{BakeryError, Result};

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn OrderStore>,
    today: Today,
}

impl DashboardService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store, today: local_today() }
    }

    pub fn with_today(mut self, today: Today) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    /// Five independent counts; they are not read from one snapshot.
    #[instrument(skip(self))]
    pub async fn delivery_stats(&self, today: NaiveDate) -> Result<DeliveryStats> {
        let tomorrow = today + Duration::days(1);
        Ok(DeliveryStats {
            due_today: self.store.count_by_due_date(today).await?,
            due_tomorrow: self.store.count_by_due_date(tomorrow).await?,
            delivered_today: self.store.count_by_due_date_and_states(today, &[OrderState::Delivered]).await?,
            not_available_today: self.store.count_by_due_date_and_states(today, NOT_AVAILABLE_STATES).await?,
            new_orders: self.store.count_by_state(OrderState::New).await?,
        })
    }

    pub async fn dashboard_data(&self, month: u32, year: i32) -> Result<DashboardData> {
        self.dashboard_data_on(self.today(), month, year).await
    }

    #[instrument(skip(self))]
    pub async fn dashboard_data_on(&self, today: NaiveDate, month: u32, year: i32) -> Result<DashboardData> {
        let days = days_in_month(year, month)
            .ok_or_else(|| BakeryError::InvalidInput(format!("no such month: {year}-{month}")))?;

        let delivery_stats = self.delivery_stats(today).await?;
        let per_day = self.store.count_per_day(OrderState::Delivered, year, month).await?;
        let per_month = self.store.count_per_month(OrderState::Delivered, year).await?;
        let sales = self.store.sum_per_month_last_three_years(OrderState::Delivered, year).await?;
        let per_product = self.store.count_per_product(OrderState::Delivered, year, month).await?;
        debug!(days = per_day.len(), months = per_month.len(), sales = sales.len(), products = per_product.len(), "grouped rows loaded");

        Ok(DashboardData {
            delivery_stats,
            deliveries_this_month: dense_series(days as usize, &per_day),
            deliveries_this_year: dense_series(12, &per_month),
            sales_per_month: sales_matrix(year, month, &sales),
            product_deliveries: rank_products(per_product),
        })
    }
}

/// `None` for a month outside 1..=12 or a year outside the calendar range.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from((next - first).num_days()).ok()
}

/// Spreads 1-based `(ordinal, count)` rows over a series of `len` slots.
pub fn dense_series(len: usize, rows: &[(u32, u64)]) -> Vec<Option<u64>> {
    let mut series = vec![None; len];
    for &(ordinal, count) in rows {
        match (ordinal as usize).checked_sub(1).and_then(|index| series.get_mut(index)) {
            Some(slot) => *slot = Some(count),
            None => warn!(ordinal, len, "grouped row outside series, dropped"),
        }
    }
    series
}

/// Row 0 is `year`, row 2 is `year - 2`. The still-open month (`year`, `month`) is left empty.
pub fn sales_matrix(year: i32, month: u32, rows: &[MonthlySales]) -> SalesMatrix {
    let mut matrix: SalesMatrix = [[None; 12]; 3];
    for row in rows {
        let age = year - row.year;
        if age == 0 && row.month == month {
            continue;
        }
        let cell = usize::try_from(age)
            .ok()
            .zip((row.month as usize).checked_sub(1))
            .and_then(|(r, c)| matrix.get_mut(r)?.get_mut(c));
        match cell {
            Some(cell) => *cell = Some(row.total),
            None => warn!(year = row.year, month = row.month, "sales row outside window, dropped"),
        }
    }
    matrix
}

/// Keeps the store's ranking order.
pub fn rank_products(rows: Vec<ProductQuantity>) -> IndexMap<String, u64> {
    rows.into_iter().map(|row| (row.product.name, row.quantity)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Order, OrderSummary, Product};
    use crate::store::{MemoryStore, OrderFilter, PageRequest, StoreResult};
    use async_trait::async_trait;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Returns canned grouped rows regardless of arguments.
    #[derive(Default)]
    struct CannedStore {
        per_day: Vec<(u32, u64)>,
        per_month: Vec<(u32, u64)>,
        sales: Vec<MonthlySales>,
        products: Vec<ProductQuantity>,
    }

    #[async_trait]
    impl OrderStore for CannedStore {
        async fn find_by_id(&self, _id: Uuid) -> StoreResult<Option<Order>> { Ok(None) }
        async fn save(&self, order: Order) -> StoreResult<Order> { Ok(order) }
        async fn find_orders(&self, _filter: &OrderFilter, _page: PageRequest) -> StoreResult<Vec<Order>> { Ok(vec![]) }
        async fn count_orders(&self, _filter: &OrderFilter) -> StoreResult<u64> { Ok(0) }
        async fn find_summaries_due_from(&self, _date: NaiveDate) -> StoreResult<Vec<OrderSummary>> { Ok(vec![]) }
        async fn count_by_due_date(&self, date: NaiveDate) -> StoreResult<u64> { Ok(date.day().into()) }
        async fn count_by_due_date_and_states(&self, _date: NaiveDate, states: &[OrderState]) -> StoreResult<u64> {
            Ok(states.len() as u64)
        }
        async fn count_by_state(&self, _state: OrderState) -> StoreResult<u64> { Ok(7) }
        async fn count_per_day(&self, _state: OrderState, _year: i32, _month: u32) -> StoreResult<Vec<(u32, u64)>> {
            Ok(self.per_day.clone())
        }
        async fn count_per_month(&self, _state: OrderState, _year: i32) -> StoreResult<Vec<(u32, u64)>> {
            Ok(self.per_month.clone())
        }
        async fn sum_per_month_last_three_years(&self, _state: OrderState, _year: i32) -> StoreResult<Vec<MonthlySales>> {
            Ok(self.sales.clone())
        }
        async fn count_per_product(&self, _state: OrderState, _year: i32, _month: u32) -> StoreResult<Vec<ProductQuantity>> {
            Ok(self.products.clone())
        }
    }

    #[test]
    fn test_dense_series_keeps_gaps_empty() {
        let series = dense_series(31, &[(3, 5), (10, 2)]);
        assert_eq!(series.len(), 31);
        assert_eq!(series[2], Some(5));
        assert_eq!(series[9], Some(2));
        assert_eq!(series.iter().filter(|s| s.is_none()).count(), 29);
        assert_eq!(dense_series(12, &[]), vec![None; 12]);
    }

    #[test]
    fn test_dense_series_drops_rows_outside_range() {
        let series = dense_series(31, &[(0, 4), (1, 2), (32, 9)]);
        assert_eq!(series.len(), 31);
        assert_eq!(series[0], Some(2));
        assert_eq!(series.iter().flatten().count(), 1);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 4), Some(30));
        assert_eq!(days_in_month(2024, 0), None);
        assert_eq!(days_in_month(2024, 13), None);
    }

    #[test]
    fn test_sales_matrix_skips_open_month() {
        let rows = [
            MonthlySales { year: 2024, month: 6, total: 999 },
            MonthlySales { year: 2024, month: 5, total: 40 },
            MonthlySales { year: 2023, month: 3, total: 17 },
            MonthlySales { year: 2022, month: 12, total: 8 },
        ];
        let matrix = sales_matrix(2024, 6, &rows);
        assert_eq!(matrix[0][5], None);
        assert_eq!(matrix[0][4], Some(40));
        assert_eq!(matrix[1][2], Some(17));
        assert_eq!(matrix[2][11], Some(8));
        assert_eq!(matrix.iter().flatten().filter(|c| c.is_some()).count(), 3);
    }

    #[test]
    fn test_rank_products_preserves_store_order() {
        let rows = vec![
            ProductQuantity { product: Product::new("Croissant", 250), quantity: 9 },
            ProductQuantity { product: Product::new("Bagel", 180), quantity: 4 },
        ];
        let ranking = rank_products(rows);
        assert_eq!(ranking.keys().collect::<Vec<_>>(), ["Croissant", "Bagel"]);
        assert_eq!(ranking["Bagel"], 4);
    }

    #[test]
    fn test_rank_products_ignores_quantity() {
        let rows = vec![
            ProductQuantity { product: Product::new("Bagel", 180), quantity: 4 },
            ProductQuantity { product: Product::new("Croissant", 250), quantity: 12 },
        ];
        let ranking = rank_products(rows);
        assert_eq!(ranking.keys().collect::<Vec<_>>(), ["Bagel", "Croissant"]);
        assert_eq!(ranking["Croissant"], 12);
    }

    #[tokio::test]
    async fn test_empty_store_gives_zero_stats() {
        let dashboard = DashboardService::new(Arc::new(MemoryStore::new()));
        let stats = dashboard.delivery_stats(date(2024, 6, 15)).await.unwrap();
        assert_eq!(stats, DeliveryStats::default());

        let data = dashboard.dashboard_data_on(date(2024, 6, 15), 2, 2024).await.unwrap();
        assert_eq!(data.deliveries_this_month, vec![None; 29]);
        assert_eq!(data.deliveries_this_year, vec![None; 12]);
        assert!(data.product_deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_stats_query_each_window() {
        let dashboard = DashboardService::new(Arc::new(CannedStore::default()));
        let stats = dashboard.delivery_stats(date(2024, 6, 30)).await.unwrap();
        assert_eq!(stats.due_today, 30);
        assert_eq!(stats.due_tomorrow, 1);
        assert_eq!(stats.delivered_today, 1);
        assert_eq!(stats.not_available_today, 3);
        assert_eq!(stats.new_orders, 7);
    }

    #[tokio::test]
    async fn test_dashboard_from_canned_rows() {
        let store = CannedStore {
            per_day: vec![(3, 5), (10, 2)],
            per_month: vec![(1, 4), (6, 7)],
            sales: vec![MonthlySales { year: 2023, month: 3, total: 17 }],
            products: vec![
                ProductQuantity { product: Product::new("Croissant", 250), quantity: 5 },
                ProductQuantity { product: Product::new("Bagel", 180), quantity: 5 },
            ],
        };
        let dashboard = DashboardService::new(Arc::new(store)).with_today(Arc::new(|| date(2024, 5, 1)));
        let data = dashboard.dashboard_data(5, 2024).await.unwrap();

        assert_eq!(data.deliveries_this_month.len(), 31);
        assert_eq!(data.deliveries_this_month[2], Some(5));
        assert_eq!(data.deliveries_this_year[5], Some(7));
        assert_eq!(data.deliveries_this_year[1], None);
        assert_eq!(data.sales_per_month[1][2], Some(17));
        assert_eq!(data.product_deliveries.keys().collect::<Vec<_>>(), ["Croissant", "Bagel"]);
    }

    #[tokio::test]
    async fn test_invalid_month_is_rejected() {
        let dashboard = DashboardService::new(Arc::new(MemoryStore::new()));
        let err = dashboard.dashboard_data_on(date(2024, 6, 15), 13, 2024).await.unwrap_err();
        assert!(matches!(err, BakeryError::InvalidInput(_)));

        let err = dashboard.dashboard_data_on(date(2024, 6, 15), 6, 300_000).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: no such month: 300000-6");
    }
}
