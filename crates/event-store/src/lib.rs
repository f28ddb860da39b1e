//! Event store for the table consolidation back end.
//!
//! Every table, order, table group and deferred payment record is an
//! event stream. [`EventStore::append_batch`] commits events for several
//! streams at once, so an order append and the matching table total update
//! either both land or neither does.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::{APPEND_LOCK_KEY, PostgresEventStore};
pub use query::EventQuery;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, StreamAppend};
