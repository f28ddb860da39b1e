//! Loading aggregates and committing changes to several of them at once.

use std::collections::HashMap;

use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, StreamAppend, Version,
};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Reads aggregates from an event store and commits units of work to it.
#[derive(Clone)]
pub struct Repository<S: EventStore> {
    store: S,
}

impl<S: EventStore> Repository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds an aggregate from its latest snapshot and later events.
    ///
    /// Returns a default (uninitialized) aggregate if the stream is empty.
    pub async fn load<A>(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: Aggregate + DeserializeOwned,
    {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let version = snapshot.version;
                let mut aggregate: A = snapshot.into_state()?;
                aggregate.set_version(version);
                aggregate
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it was never created.
    pub async fn load_existing<A>(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: Aggregate + DeserializeOwned,
    {
        let aggregate: A = self.load(aggregate_id).await?;
        Ok(aggregate.id().map(|_| aggregate))
    }

    /// Loads an aggregate that must exist.
    pub async fn get<A>(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: Aggregate + DeserializeOwned,
    {
        self.load_existing(aggregate_id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.to_string(),
            })
    }

    /// Commits every staged stream in one atomic append.
    ///
    /// Snapshots are written after the events; a failed snapshot write is
    /// logged and does not fail the commit.
    pub async fn commit(&self, uow: UnitOfWork) -> Result<Vec<Version>, DomainError> {
        if uow.is_empty() {
            return Ok(Vec::new());
        }

        let UnitOfWork { streams, snapshots, .. } = uow;
        let versions = self.store.append_batch(streams).await?;

        for snapshot in snapshots.into_values() {
            let aggregate_id = snapshot.aggregate_id;
            if let Err(e) = self.store.save_snapshot(snapshot).await {
                tracing::warn!(%aggregate_id, error = %e, "failed to save snapshot");
            }
        }

        Ok(versions)
    }
}

/// Events staged against several aggregates, committed together.
///
/// Recording applies the events to the caller's aggregate immediately, so the
/// caller keeps working with up-to-date state; nothing reaches the store until
/// [`Repository::commit`]. Each stream carries the version it was loaded at as
/// its expected version.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    streams: Vec<StreamAppend>,
    snapshots: HashMap<AggregateId, Snapshot>,
    metadata: HashMap<String, serde_json::Value>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a metadata entry to every event recorded afterwards.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of events staged across all streams.
    pub fn event_count(&self) -> usize {
        self.streams.iter().map(|s| s.events.len()).sum()
    }

    /// Applies `events` to `aggregate` and stages them for commit.
    pub fn record<A: Aggregate>(
        &mut self,
        aggregate: &mut A,
        events: Vec<A::Event>,
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let loaded_version = aggregate.version();
        let mut version = loaded_version;
        let mut payloads = Vec::with_capacity(events.len());

        for event in events {
            version = version.next();
            payloads.push((version, event.event_type(), serde_json::to_value(&event)?));
            aggregate.apply(event);
        }
        aggregate.set_version(version);

        let aggregate_id = aggregate.id().ok_or(DomainError::AggregateNotFound {
            aggregate_type: A::aggregate_type(),
            aggregate_id: "uninitialized".to_string(),
        })?;

        let mut staged = Vec::with_capacity(payloads.len());
        for (version, event_type, payload) in payloads {
            let mut envelope = EventEnvelope::new(
                aggregate_id,
                A::aggregate_type(),
                version,
                event_type,
                &payload,
            )?;
            for (key, value) in &self.metadata {
                envelope = envelope.with_metadata(key.clone(), value.clone());
            }
            staged.push(envelope);
        }

        match self
            .streams
            .iter_mut()
            .find(|s| s.aggregate_id() == Some(aggregate_id))
        {
            Some(stream) => stream.events.extend(staged),
            None => {
                let options = if loaded_version == Version::initial() {
                    AppendOptions::expect_new()
                } else {
                    AppendOptions::expect_version(loaded_version)
                };
                self.streams.push(StreamAppend::new(staged, options));
            }
        }

        Ok(())
    }

    /// Like [`UnitOfWork::record`], staging a snapshot when the aggregate
    /// crosses its snapshot interval.
    pub fn record_snapshotting<A: SnapshotCapable>(
        &mut self,
        aggregate: &mut A,
        events: Vec<A::Event>,
    ) -> Result<(), DomainError> {
        let before = aggregate.version().as_i64();
        self.record(aggregate, events)?;
        let after = aggregate.version().as_i64();

        let interval = A::snapshot_interval() as i64;
        if interval > 0 && after / interval > before / interval
            && let Some(aggregate_id) = aggregate.id()
        {
            let snapshot = Snapshot::from_state(
                aggregate_id,
                A::aggregate_type(),
                aggregate.version(),
                &*aggregate,
            )?;
            self.snapshots.insert(aggregate_id, snapshot);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::InMemoryEventStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Created { id: AggregateId },
        Incremented,
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Created { .. } => "CounterCreated",
                CounterEvent::Incremented => "CounterIncremented",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Counter {
        id: Option<AggregateId>,
        count: u32,
        #[serde(default)]
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("counter error")]
    struct CounterError;

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = CounterError;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                CounterEvent::Created { id } => self.id = Some(id),
                CounterEvent::Incremented => self.count += 1,
            }
        }
    }

    impl SnapshotCapable for Counter {
        fn snapshot_interval() -> usize {
            3
        }
    }

    fn created(id: AggregateId) -> Vec<CounterEvent> {
        vec![CounterEvent::Created { id }]
    }

    #[tokio::test]
    async fn commit_spans_several_aggregates() {
        let repo = Repository::new(InMemoryEventStore::new());
        let (a_id, b_id) = (AggregateId::new(), AggregateId::new());

        let mut a = Counter::default();
        let mut b = Counter::default();
        let mut uow = UnitOfWork::new();
        uow.record(&mut a, created(a_id)).unwrap();
        uow.record(&mut b, created(b_id)).unwrap();
        uow.record(&mut a, vec![CounterEvent::Incremented]).unwrap();
        assert_eq!(uow.event_count(), 3);

        let versions = repo.commit(uow).await.unwrap();
        assert_eq!(versions, vec![Version::new(2), Version::first()]);

        let a: Counter = repo.get(a_id).await.unwrap();
        assert_eq!(a.count, 1);
        assert_eq!(a.version(), Version::new(2));
    }

    #[tokio::test]
    async fn stale_unit_of_work_is_rejected_whole() {
        let repo = Repository::new(InMemoryEventStore::new());
        let id = AggregateId::new();

        let mut counter = Counter::default();
        let mut uow = UnitOfWork::new();
        uow.record(&mut counter, created(id)).unwrap();
        repo.commit(uow).await.unwrap();

        // Two writers load the same version
        let mut first: Counter = repo.get(id).await.unwrap();
        let mut second: Counter = repo.get(id).await.unwrap();

        let mut uow = UnitOfWork::new();
        uow.record(&mut first, vec![CounterEvent::Incremented]).unwrap();
        repo.commit(uow).await.unwrap();

        let other = AggregateId::new();
        let mut fresh = Counter::default();
        let mut uow = UnitOfWork::new();
        uow.record(&mut fresh, created(other)).unwrap();
        uow.record(&mut second, vec![CounterEvent::Incremented]).unwrap();

        let err = repo.commit(uow).await.unwrap_err();
        assert!(matches!(err, DomainError::EventStore(ref e) if e.is_conflict()));
        assert!(repo.load_existing::<Counter>(other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_is_used_on_load() {
        let store = InMemoryEventStore::new();
        let repo = Repository::new(store.clone());
        let id = AggregateId::new();

        let mut counter = Counter::default();
        let mut uow = UnitOfWork::new();
        uow.record_snapshotting(&mut counter, created(id)).unwrap();
        uow.record_snapshotting(
            &mut counter,
            vec![CounterEvent::Incremented, CounterEvent::Incremented],
        )
        .unwrap();
        repo.commit(uow).await.unwrap();

        let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(3));

        let mut uow = UnitOfWork::new();
        uow.record(&mut counter, vec![CounterEvent::Incremented]).unwrap();
        repo.commit(uow).await.unwrap();

        let loaded: Counter = repo.get(id).await.unwrap();
        assert_eq!(loaded.count, 3);
        assert_eq!(loaded.version(), Version::new(4));
    }

    #[tokio::test]
    async fn metadata_is_attached_to_recorded_events() {
        let store = InMemoryEventStore::new();
        let repo = Repository::new(store.clone());
        let id = AggregateId::new();

        let mut counter = Counter::default();
        let mut uow = UnitOfWork::new().with_metadata("submission_token", serde_json::json!("t-1"));
        uow.record(&mut counter, created(id)).unwrap();
        repo.commit(uow).await.unwrap();

        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(
            events[0].metadata.get("submission_token"),
            Some(&serde_json::json!("t-1"))
        );
    }

    #[tokio::test]
    async fn get_missing_aggregate_is_not_found() {
        let repo = Repository::new(InMemoryEventStore::new());
        let result = repo.get::<Counter>(AggregateId::new()).await;
        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }

    #[tokio::test]
    async fn empty_unit_of_work_commits_nothing() {
        let store = InMemoryEventStore::new();
        let repo = Repository::new(store.clone());
        let mut counter = Counter::default();
        let mut uow = UnitOfWork::new();
        uow.record(&mut counter, vec![]).unwrap();

        assert!(repo.commit(uow).await.unwrap().is_empty());
        assert_eq!(store.event_count().await, 0);
    }
}
