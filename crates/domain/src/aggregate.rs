//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded on an aggregate's stream, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Event name stored alongside the payload and used by read-side filters.
    fn event_type(&self) -> &'static str;
}

/// An event-sourced entity.
///
/// Commands are plain methods on the aggregate that inspect the current state
/// and return the events to record (or an error). State only ever changes in
/// [`Aggregate::apply`], which must be pure and infallible: events are facts
/// that already happened.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    /// Stream family name, e.g. "Table".
    fn aggregate_type() -> &'static str;

    /// Returns None until the creation event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// Version of the last applied event (0 for a fresh aggregate).
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state is periodically persisted as a snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    fn should_snapshot(&self) -> bool {
        self.version().as_i64() > 0
            && (self.version().as_i64() as usize).is_multiple_of(Self::snapshot_interval())
    }
}
