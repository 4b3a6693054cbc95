//! Domain events
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::OrderState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, created_by: Uuid },
    StateChanged { order_id: Uuid, state: OrderState },
    CommentAdded { order_id: Uuid, author_id: Uuid, message: String },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. } | Self::StateChanged { order_id, .. } | Self::CommentAdded { order_id, .. } => *order_id,
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "bakery.orders.created",
            Self::StateChanged { .. } => "bakery.orders.state_changed",
            Self::CommentAdded { .. } => "bakery.orders.comment_added",
        }
    }
}
