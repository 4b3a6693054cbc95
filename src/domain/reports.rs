//! Report envelopes produced by the dashboard aggregation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sales totals in cents: row 0 is the requested year, row 1 the year before, row 2 two years before.
pub type SalesMatrix = [[Option<i64>; 12]; 3];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub delivered_today: u64,
    pub due_today: u64,
    pub due_tomorrow: u64,
    pub not_available_today: u64,
    pub new_orders: u64,
}

/// `None` entries mean "no data for this bucket", which is not the same as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardData {
    pub delivery_stats: DeliveryStats,
    /// Index 0 is the first day of the requested month.
    pub deliveries_this_month: Vec<Option<u64>>,
    /// Index 0 is January.
    pub deliveries_this_year: Vec<Option<u64>>,
    pub sales_per_month: SalesMatrix,
    /// Product name to delivered quantity, in the order the store ranked them.
    pub product_deliveries: IndexMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_zero_serialize_differently() {
        let data = DashboardData {
            deliveries_this_month: vec![None, Some(0), Some(3)],
            ..Default::default()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["deliveries_this_month"], serde_json::json!([null, 0, 3]));
        assert_eq!(json["sales_per_month"][0][0], serde_json::Value::Null);
    }
}
