use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, Version};

/// Options for appending events to one stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the stream before the append.
    /// If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the stream not to exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Events destined for a single stream inside a batch commit.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl StreamAppend {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    /// Aggregate the events belong to. Only valid after validation.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.events.first().map(|e| e.aggregate_id)
    }

    /// Version of the stream once these events are written.
    pub fn last_version(&self) -> Version {
        self.events
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial())
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to several streams as one atomic commit.
    ///
    /// Every stream's expected version is checked before anything is written.
    /// If any check fails the whole batch is rejected with
    /// `ConcurrencyConflict` and the store is left untouched.
    ///
    /// Returns the new version of each stream, in batch order.
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// Retrieves all events for a stream in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves events for a stream starting from a version (inclusive).
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves events matching a query, in commit order.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Streams every event in commit order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Current version of a stream, None if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Saves (replaces) the snapshot of an aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot of an aggregate.
    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends events to a single stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let versions = self
            .append_batch(vec![StreamAppend::new(events, options)])
            .await?;
        Ok(versions.into_iter().next().unwrap_or(Version::initial()))
    }

    /// Checks if a stream has any events.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Loads the latest snapshot (if any) and the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.get_events_for_aggregate(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates a batch before any backend touches storage.
///
/// Each entry must be non-empty, hold events of a single aggregate with
/// sequential versions, and no aggregate may appear twice in one batch.
pub fn validate_batch(batch: &[StreamAppend]) -> Result<()> {
    if batch.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "Cannot commit an empty batch".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(batch.len());
    for entry in batch {
        let first = entry.events.first().ok_or_else(|| {
            EventStoreError::InvalidAppend("Cannot append an empty event list".to_string())
        })?;

        if seen.contains(&first.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "Aggregate {} appears twice in one batch",
                first.aggregate_id
            )));
        }
        seen.push(first.aggregate_id);

        let mut expected_version = first.version;
        for event in entry.events.iter().skip(1) {
            if event.aggregate_id != first.aggregate_id
                || event.aggregate_type != first.aggregate_type
            {
                return Err(EventStoreError::InvalidAppend(
                    "All events of a stream entry must belong to the same aggregate".to_string(),
                ));
            }
            expected_version = expected_version.next();
            if event.version != expected_version {
                return Err(EventStoreError::InvalidAppend(format!(
                    "Event versions must be sequential. Expected {}, got {}",
                    expected_version, event.version
                )));
            }
        }

        if let Some(expected) = entry.options.expected_version
            && first.version != expected.next()
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "First event version {} does not follow expected version {}",
                first.version, expected
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::new(
            aggregate_id,
            "Table",
            Version::new(version),
            "TestEvent",
            &serde_json::json!({}),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_batch_and_empty_entries() {
        assert!(validate_batch(&[]).is_err());
        assert!(validate_batch(&[StreamAppend::new(vec![], AppendOptions::new())]).is_err());
    }

    #[test]
    fn rejects_duplicate_aggregate_in_batch() {
        let id = AggregateId::new();
        let batch = vec![
            StreamAppend::new(vec![event(id, 1)], AppendOptions::new()),
            StreamAppend::new(vec![event(id, 2)], AppendOptions::new()),
        ];
        assert!(matches!(
            validate_batch(&batch),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }

    #[test]
    fn rejects_gaps_in_versions() {
        let id = AggregateId::new();
        let batch = vec![StreamAppend::new(
            vec![event(id, 1), event(id, 3)],
            AppendOptions::expect_new(),
        )];
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn rejects_first_version_not_following_expected() {
        let id = AggregateId::new();
        let batch = vec![StreamAppend::new(
            vec![event(id, 3)],
            AppendOptions::expect_version(Version::first()),
        )];
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn accepts_multi_stream_batch() {
        let batch = vec![
            StreamAppend::new(
                vec![event(AggregateId::new(), 1), event(AggregateId::new(), 2)],
                AppendOptions::expect_new(),
            ),
            StreamAppend::new(
                vec![event(AggregateId::new(), 5)],
                AppendOptions::expect_version(Version::new(4)),
            ),
        ];
        // first entry mixes aggregates
        assert!(validate_batch(&batch).is_err());

        let id = AggregateId::new();
        let batch = vec![
            StreamAppend::new(
                vec![event(id, 1), event(id, 2)],
                AppendOptions::expect_new(),
            ),
            StreamAppend::new(
                vec![event(AggregateId::new(), 5)],
                AppendOptions::expect_version(Version::new(4)),
            ),
        ];
        assert!(validate_batch(&batch).is_ok());
        assert_eq!(batch[0].last_version(), Version::new(2));
    }
}
