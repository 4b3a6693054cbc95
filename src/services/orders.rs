//! Order lifecycle service

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Author, Customer, Order, OrderItem, OrderSummary, User};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::OrderState;
use crate::messaging::{publish_all, EventPublisher, NoopPublisher};
use crate::services::{local_today, Today};
use crate::store::{OrderFilter, OrderStore, PageRequest};
use crate::{BakeryError, Result};

/// Orders created without an explicit time are due at 16:00.
pub fn default_due_time() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default()
}

pub const UNSAVED_ACTOR: &str = "only saved users can change orders";
pub const UNSAVED_PRODUCT: &str = "order items must reference saved products";

fn author_of(user: &User) -> Result<Author> {
    user.author().ok_or_else(|| BakeryError::InvalidInput(UNSAVED_ACTOR.to_string()))
}

/// Applies caller-side changes to an order inside `save_order_with`.
pub trait OrderFiller: Send + Sync {
    fn fill(&self, current_user: &User, order: &mut Order) -> Result<()>;
}

impl<F> OrderFiller for F
where
    F: Fn(&User, &mut Order) -> Result<()> + Send + Sync,
{
    fn fill(&self, current_user: &User, order: &mut Order) -> Result<()> {
        self(current_user, order)
    }
}

/// Partial order update. Absent fields are left alone.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderChanges {
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    /// An empty string clears the location.
    pub pickup_location: Option<String>,
    pub customer: Option<Customer>,
    pub items: Option<Vec<OrderItem>>,
    pub state: Option<OrderState>,
}

impl OrderFiller for OrderChanges {
    fn fill(&self, current_user: &User, order: &mut Order) -> Result<()> {
        if let Some(date) = self.due_date {
            order.due_date = date;
        }
        if let Some(time) = self.due_time {
            order.due_time = time;
        }
        if let Some(location) = &self.pickup_location {
            let location = location.trim();
            order.pickup_location = (!location.is_empty()).then(|| location.to_string());
        }
        if let Some(customer) = &self.customer {
            order.customer = customer.clone();
        }
        if let Some(items) = &self.items {
            order.items = items.clone();
        }
        if let Some(state) = self.state {
            order.change_state(&author_of(current_user)?, state);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    today: Today,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store, publisher: Arc::new(NoopPublisher), today: local_today() }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_today(mut self, today: Today) -> Self {
        self.today = today;
        self
    }

    /// Unsaved order due today at 16:00.
    pub fn create_default(&self, current_user: &User) -> Result<Order> {
        Ok(Order::new(&author_of(current_user)?, (self.today)(), default_due_time()))
    }

    pub async fn load(&self, id: Uuid) -> Result<Order> {
        self.store.find_by_id(id).await?.ok_or(BakeryError::NotFound { entity: "Order", id })
    }

    /// Loads (or creates) an order, lets `filler` mutate it, then validates and saves.
    #[instrument(skip(self, current_user, filler), fields(actor = ?current_user.id))]
    pub async fn save_order_with(&self, current_user: &User, id: Option<Uuid>, filler: &dyn OrderFiller) -> Result<Order> {
        let mut order = match id {
            Some(id) => self.load(id).await?,
            None => self.create_default(current_user)?,
        };
        let previous = order.id.map(|_| order.state());
        filler.fill(current_user, &mut order)?;
        self.persist(order, previous).await
    }

    #[instrument(skip_all, fields(id = ?order.id))]
    pub async fn save_order(&self, order: Order) -> Result<Order> {
        self.persist(order, None).await
    }

    /// Appends a comment to the trail without touching the state.
    #[instrument(skip(self, current_user, order, comment), fields(actor = ?current_user.id, id = ?order.id))]
    pub async fn add_comment(&self, current_user: &User, mut order: Order, comment: &str) -> Result<Order> {
        let author = author_of(current_user)?;
        order.add_history_item(&author, comment);
        let saved = self.persist(order, None).await?;
        if let Some(order_id) = saved.id {
            let event = OrderEvent::CommentAdded {
                order_id,
                author_id: author.id,
                message: comment.to_string(),
            };
            publish_all(self.publisher.as_ref(), &[event]).await;
        }
        Ok(saved)
    }

    pub async fn find_any_matching_after_due_date(
        &self,
        filter: Option<&str>,
        due_after: Option<NaiveDate>,
        page: PageRequest,
    ) -> Result<Vec<Order>> {
        let filter = OrderFilter::from_parts(filter, due_after);
        Ok(self.store.find_orders(&filter, page).await?)
    }

    pub async fn count_any_matching_after_due_date(&self, filter: Option<&str>, due_after: Option<NaiveDate>) -> Result<u64> {
        let filter = OrderFilter::from_parts(filter, due_after);
        Ok(self.store.count_orders(&filter).await?)
    }

    /// Summaries of everything due today or later.
    pub async fn find_any_matching_starting_today(&self) -> Result<Vec<OrderSummary>> {
        Ok(self.store.find_summaries_due_from((self.today)()).await?)
    }

    /// `previous` is the state the order was loaded with, when it existed.
    async fn persist(&self, order: Order, previous: Option<OrderState>) -> Result<Order> {
        order.validate()?;
        if order.items.iter().any(|item| item.product.id.is_none()) {
            return Err(BakeryError::InvalidInput(UNSAVED_PRODUCT.to_string()));
        }
        let is_new = order.id.is_none();
        let saved = self.store.save(order).await?;
        let Some(order_id) = saved.id else {
            return Ok(saved);
        };
        info!(%order_id, version = saved.version, state = %saved.state(), "order saved");

        let mut events = Vec::new();
        if is_new {
            events.push(OrderEvent::Created { order_id, created_by: saved.created_by });
        }
        if previous.is_some_and(|state| state != saved.state()) {
            events.push(OrderEvent::StateChanged { order_id, state: saved.state() });
        }
        publish_all(self.publisher.as_ref(), &events).await;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::ORDER_PLACED;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::Role;
    use crate::messaging::PublishError;
    use crate::store::{CrudStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<OrderEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &OrderEvent) -> std::result::Result<(), PublishError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn baker() -> User {
        let mut user = User::new("baker@bakery.test", "Bo", "Baker", Role::Baker);
        user.id = Some(Uuid::now_v7());
        user
    }

    fn customer(name: &str) -> Customer {
        Customer { full_name: name.into(), phone_number: "555-0100".into(), details: None }
    }

    fn service() -> (OrderService, Arc<RecordingPublisher>) {
        let (service, publisher, _) = service_with_store();
        (service, publisher)
    }

    fn service_with_store() -> (OrderService, Arc<RecordingPublisher>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = OrderService::new(store.clone())
            .with_publisher(publisher.clone())
            .with_today(Arc::new(|| date(2024, 6, 15)));
        (service, publisher, store)
    }

    #[test]
    fn test_create_default() {
        let (orders, _) = service();
        let user = baker();
        let order = orders.create_default(&user).unwrap();
        assert_eq!(order.due_date, date(2024, 6, 15));
        assert_eq!(order.due_time, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert_eq!(order.state(), OrderState::New);
        assert_eq!(order.history().len(), 1);
        assert_eq!(order.history()[0].message, ORDER_PLACED);
        assert_eq!(order.history()[0].author_id, user.id.unwrap());
        assert!(order.id.is_none());
    }

    #[test]
    fn test_unsaved_actor_cannot_create() {
        let (orders, _) = service();
        let stranger = User::new("new@bakery.test", "New", "Hire", Role::Barista);
        let err = orders.create_default(&stranger).unwrap_err();
        assert!(matches!(&err, BakeryError::InvalidInput(msg) if msg == UNSAVED_ACTOR));
    }

    #[tokio::test]
    async fn test_unsaved_actor_cannot_comment_or_change_state() {
        let (orders, _) = service();
        let user = baker();
        let changes = OrderChanges { customer: Some(customer("Ann Baker")), ..Default::default() };
        let order = orders.save_order_with(&user, None, &changes).await.unwrap();
        let id = order.id.unwrap();

        let stranger = User::new("new@bakery.test", "New", "Hire", Role::Barista);
        assert!(matches!(orders.add_comment(&stranger, order, "hi").await, Err(BakeryError::InvalidInput(_))));
        let confirm = OrderChanges { state: Some(OrderState::Confirmed), ..Default::default() };
        assert!(matches!(orders.save_order_with(&stranger, Some(id), &confirm).await, Err(BakeryError::InvalidInput(_))));
        assert_eq!(orders.load(id).await.unwrap().history().len(), 1);
    }

    #[tokio::test]
    async fn test_items_need_saved_products() {
        let (orders, _) = service();
        let changes = OrderChanges {
            customer: Some(customer("Ann Baker")),
            items: Some(vec![OrderItem { product: Product::new("Croissant", 250), quantity: 2, comment: None }]),
            ..Default::default()
        };
        let err = orders.save_order_with(&baker(), None, &changes).await.unwrap_err();
        assert!(matches!(&err, BakeryError::InvalidInput(msg) if msg == UNSAVED_PRODUCT));
        assert_eq!(orders.count_any_matching_after_due_date(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_new_order_with_changes() {
        let (orders, publisher, store) = service_with_store();
        let croissant = CrudStore::save(store.as_ref(), Product::new("Croissant", 250)).await.unwrap();
        let user = baker();
        let changes = OrderChanges {
            customer: Some(customer("Ann Baker")),
            pickup_location: Some("Store".into()),
            items: Some(vec![OrderItem { product: croissant, quantity: 2, comment: None }]),
            ..Default::default()
        };
        let saved = orders.save_order_with(&user, None, &changes).await.unwrap();

        assert!(saved.id.is_some());
        assert_eq!(saved.pickup_location.as_deref(), Some("Store"));
        assert_eq!(saved.total_price(), 500);
        let events = publisher.events.lock().unwrap().clone();
        assert!(matches!(events.as_slice(), [OrderEvent::Created { .. }]));
    }

    #[tokio::test]
    async fn test_update_existing_order_records_transition() {
        let (orders, publisher) = service();
        let user = baker();
        let set_customer = |_: &User, order: &mut Order| -> Result<()> {
            order.customer = customer("Ann Baker");
            Ok(())
        };
        let created = orders.save_order_with(&user, None, &set_customer).await.unwrap();
        let id = created.id.unwrap();

        let confirm = OrderChanges { state: Some(OrderState::Confirmed), ..Default::default() };
        let updated = orders.save_order_with(&user, Some(id), &confirm).await.unwrap();

        assert_eq!(updated.id, Some(id));
        assert_eq!(updated.state(), OrderState::Confirmed);
        assert_eq!(updated.history().len(), 2);
        assert_eq!(updated.history()[1].message, "Order Confirmed");
        assert_eq!(orders.load(id).await.unwrap().history().len(), 2);
        let events = publisher.events.lock().unwrap().clone();
        assert!(matches!(events.last(), Some(OrderEvent::StateChanged { state: OrderState::Confirmed, .. })));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (orders, _) = service();
        let err = orders.save_order_with(&baker(), Some(Uuid::now_v7()), &OrderChanges::default()).await.unwrap_err();
        assert!(matches!(err, BakeryError::NotFound { entity: "Order", .. }));
    }

    #[tokio::test]
    async fn test_filler_error_aborts_save() {
        let (orders, _) = service();
        let reject = |_: &User, _: &mut Order| -> Result<()> { Err(BakeryError::InvalidInput("no".into())) };
        assert!(orders.save_order_with(&baker(), None, &reject).await.is_err());
        assert_eq!(orders.count_any_matching_after_due_date(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_order_is_rejected() {
        let (orders, _) = service();
        let err = orders.save_order_with(&baker(), None, &OrderChanges::default()).await.unwrap_err();
        assert!(matches!(err, BakeryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_add_comment_keeps_state() {
        let (orders, publisher) = service();
        let user = baker();
        let changes = OrderChanges { customer: Some(customer("Ann Baker")), ..Default::default() };
        let order = orders.save_order_with(&user, None, &changes).await.unwrap();

        let commented = orders.add_comment(&user, order, "Extra napkins").await.unwrap();
        assert_eq!(commented.state(), OrderState::New);
        let last = commented.history().last().unwrap();
        assert_eq!(last.message, "Extra napkins");
        assert_eq!(last.new_state, None);
        let events = publisher.events.lock().unwrap().clone();
        assert!(matches!(events.last(), Some(OrderEvent::CommentAdded { message, .. }) if message == "Extra napkins"));
    }

    #[tokio::test]
    async fn test_listing_and_upcoming() {
        let (orders, _) = service();
        let user = baker();
        for (name, day) in [("Ann Baker", 14), ("Bob Miller", 15), ("Annie Hall", 20)] {
            let changes = OrderChanges {
                customer: Some(customer(name)),
                due_date: Some(date(2024, 6, day)),
                ..Default::default()
            };
            orders.save_order_with(&user, None, &changes).await.unwrap();
        }

        assert_eq!(orders.count_any_matching_after_due_date(Some(" "), None).await.unwrap(), 3);
        assert_eq!(orders.count_any_matching_after_due_date(Some("ann"), None).await.unwrap(), 2);
        assert_eq!(orders.count_any_matching_after_due_date(None, Some(date(2024, 6, 15))).await.unwrap(), 1);
        let found = orders
            .find_any_matching_after_due_date(Some("ann"), Some(date(2024, 6, 13)), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(found.iter().map(|o| o.customer.full_name.as_str()).collect::<Vec<_>>(), ["Ann Baker", "Annie Hall"]);

        let upcoming = orders.find_any_matching_starting_today().await.unwrap();
        assert_eq!(upcoming.len(), 2);
        assert!(upcoming.iter().all(|s| s.due_date >= date(2024, 6, 15)));
    }
}
