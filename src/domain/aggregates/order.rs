//! Order Aggregate

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::OrderState;
use crate::domain::Entity;

pub const ORDER_PLACED: &str = "Order placed";

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Order {
    pub id: Option<Uuid>,
    pub version: i64,
    pub created_by: Uuid,
    pub due_date: NaiveDate,
    pub due_time: NaiveTime,
    #[validate(length(max = 255))]
    pub pickup_location: Option<String>,
    #[validate]
    pub customer: Customer,
    #[validate]
    pub items: Vec<OrderItem>,
    pub(crate) state: OrderState,
    pub(crate) history: Vec<HistoryItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Customer {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(length(min = 1, max = 20))]
    pub phone_number: String,
    #[validate(length(max = 255))]
    pub details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OrderItem {
    pub product: Product,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
    #[validate(length(max = 255))]
    pub comment: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 { self.product.price * i64::from(self.quantity) }
}

/// The saved user behind an order change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
}

/// One entry of the append-only order trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub author_id: Uuid,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
    pub new_state: Option<OrderState>,
    pub message: String,
}

/// Projection used for the "due from today" list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub due_date: NaiveDate,
    pub due_time: NaiveTime,
    pub state: OrderState,
    pub customer_name: String,
    pub pickup_location: Option<String>,
    pub total_price: i64,
}

impl Order {
    /// A fresh NEW order whose trail starts with an "Order placed" entry by `created_by`.
    pub fn new(created_by: &Author, due_date: NaiveDate, due_time: NaiveTime) -> Self {
        let mut order = Self {
            id: None,
            version: 0,
            created_by: created_by.id,
            due_date,
            due_time,
            pickup_location: None,
            customer: Customer::default(),
            items: vec![],
            state: OrderState::New,
            history: vec![],
        };
        order.push_history(created_by, None, ORDER_PLACED);
        order
    }

    pub fn state(&self) -> OrderState { self.state }
    pub fn history(&self) -> &[HistoryItem] { &self.history }
    pub fn total_price(&self) -> i64 { self.items.iter().map(OrderItem::line_total).sum() }

    /// Moves the order to `state`, recording the transition when it actually changes.
    pub fn change_state(&mut self, by: &Author, state: OrderState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.push_history(by, Some(state), format!("Order {}", state.display_name()));
    }

    /// Appends a free-text comment; the state is left untouched.
    pub fn add_history_item(&mut self, by: &Author, message: impl Into<String>) {
        self.push_history(by, None, message);
    }

    pub fn summary(&self) -> Option<OrderSummary> {
        Some(OrderSummary {
            id: self.id?,
            due_date: self.due_date,
            due_time: self.due_time,
            state: self.state,
            customer_name: self.customer.full_name.clone(),
            pickup_location: self.pickup_location.clone(),
            total_price: self.total_price(),
        })
    }

    fn push_history(&mut self, by: &Author, new_state: Option<OrderState>, message: impl Into<String>) {
        self.history.push(HistoryItem {
            author_id: by.id,
            author_name: by.name.clone(),
            timestamp: Utc::now(),
            new_state,
            message: message.into(),
        });
    }
}

impl Entity for Order {
    const NAME: &'static str = "Order";
    fn id(&self) -> Option<Uuid> { self.id }
    fn version(&self) -> i64 { self.version }
    fn stamp(&mut self, id: Uuid, version: i64) { self.id = Some(id); self.version = version; }
}
