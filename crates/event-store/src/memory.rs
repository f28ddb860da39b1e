use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, StreamAppend, validate_batch},
};

#[derive(Default)]
struct Log {
    /// Every event in commit order.
    events: Vec<EventEnvelope>,
    /// Current version of each stream.
    versions: HashMap<AggregateId, Version>,
}

/// In-memory event store, used by tests and when no database is configured.
///
/// A batch is validated and applied under a single write lock, so either
/// every stream in it advances or none does.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        let mut log = self.log.write().await;
        log.events.clear();
        log.versions.clear();
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_batch(&batch)?;

        let mut log = self.log.write().await;

        // Check every stream before writing anything
        for entry in &batch {
            let first = &entry.events[0];
            let current = log
                .versions
                .get(&first.aggregate_id)
                .copied()
                .unwrap_or(Version::initial());

            if let Some(expected) = entry.options.expected_version
                && current != expected
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected,
                    actual: current,
                });
            }

            // Unique (aggregate, version) constraint
            if first.version <= current {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected: entry.options.expected_version.unwrap_or(current),
                    actual: current,
                });
            }
        }

        let mut versions = Vec::with_capacity(batch.len());
        for entry in batch {
            let last_version = entry.last_version();
            let aggregate_id = entry.events[0].aggregate_id;
            log.versions.insert(aggregate_id, last_version);
            log.events.extend(entry.events);
            versions.push(last_version);
        }

        tracing::debug!(streams = versions.len(), "batch committed");
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let mut events: Vec<_> = log
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let mut events: Vec<_> = log
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let matching = log
            .events
            .iter()
            .filter(|e| query.matches(&e.aggregate_type, &e.event_type, e.timestamp))
            .cloned();

        let events = match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        };
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.log.read().await.versions.get(&aggregate_id).copied())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&aggregate_id).cloned())
    }
}
