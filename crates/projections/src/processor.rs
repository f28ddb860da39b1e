//! Projection processor for feeding events to projections.

use event_store::EventStore;
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Processes events from an event store and delivers them to projections.
///
/// The processor supports:
/// - Catch-up: replays the log to bring projections up to date
/// - Rebuild: resets all projections and replays from scratch
///
/// Catch-up runs are serialized so concurrent readers never deliver the same
/// event twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the log and delivers each event to every projection that has
    /// not seen it yet.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let _guard = self.catch_up.lock().await;

        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;

            for projection in &self.projections {
                if projection.position().await.events_processed < event_index {
                    projection.handle(&event).await?;
                    delivered += 1;
                    metrics::counter!("projections_events_processed", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(log_length = event_index, delivered, "catch-up complete");
        }

        Ok(())
    }

    /// Resets all projections and replays the log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await?;
        tracing::info!(projections = self.projections.len(), "projections rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use event_store::EventEnvelope;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, EventStoreExt, InMemoryEventStore, Version};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Counts every event it sees.
    #[derive(Clone)]
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            }
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance(event);
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn test_event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::new(
            aggregate_id,
            "Table",
            Version::new(version),
            "TestEvent",
            &serde_json::json!({"test": true}),
        )
        .unwrap()
    }

    async fn store_with(n: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        if n > 0 {
            let agg_id = AggregateId::new();
            let events = (1..=n).map(|v| test_event(agg_id, v)).collect();
            store.append(events, AppendOptions::new()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_catch_up_processes_all_events() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();

        assert_eq!(*projection.count.read().await, 3);
    }

    #[tokio::test]
    async fn test_catch_up_skips_already_processed() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(*projection.count.read().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_catch_up_delivers_once() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(20).await);
        processor.register(Box::new(projection.clone()));
        let processor = Arc::new(processor);

        let runs: Vec<_> = (0..4)
            .map(|_| {
                let processor = Arc::clone(&processor);
                tokio::spawn(async move { processor.run_catch_up().await })
            })
            .collect();
        for run in runs {
            run.await.unwrap().unwrap();
        }

        assert_eq!(*projection.count.read().await, 20);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_replays() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(*projection.count.read().await, 2);
        assert_eq!(projection.position.read().await.events_processed, 2);
    }

    #[tokio::test]
    async fn test_empty_store_catch_up() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(0).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        assert_eq!(*projection.count.read().await, 0);
    }

    #[tokio::test]
    async fn test_multiple_projections() {
        let first = CountingProjection::new();
        let second = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(Box::new(first.clone()));
        processor.register(Box::new(second.clone()));
        assert_eq!(processor.projection_count(), 2);

        processor.run_catch_up().await.unwrap();

        assert_eq!(*first.count.read().await, 2);
        assert_eq!(*second.count.read().await, 2);
    }
}
