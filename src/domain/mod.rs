//! Domain model: aggregates, value objects, report envelopes and events

pub mod aggregates;
pub mod events;
pub mod reports;
pub mod value_objects;

use uuid::Uuid;

/// Persistent entity with a store-assigned identity and version.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Name used in error messages.
    const NAME: &'static str;

    fn id(&self) -> Option<Uuid>;
    fn version(&self) -> i64;

    /// Called by stores after a successful write.
    fn stamp(&mut self, id: Uuid, version: i64);
}
