//! Identifiers shared by the event store, the domain and the services.

mod types;

pub use types::{AggregateId, TableNumber, TenantScope};
