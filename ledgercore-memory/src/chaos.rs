//! Failure injection for exercising the store's error paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ledgercore::{
    AdapterError, AdapterResult, EventId, EventKind, EventRecord, EventsProvider, ReadOptions,
    StreamId, Timestamp,
};

/// An events provider that injects write failures on demand.
///
/// Wraps any [`EventsProvider`]; reads always pass through, and writes fail
/// with an injected [`AdapterError`] while armed. Injection is a counter,
/// not a probability, so tests stay deterministic.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ledgercore_memory::{ChaosEvents, MemoryAdapter};
///
/// let memory = MemoryAdapter::new();
/// let chaos = ChaosEvents::new(Arc::new(memory.events()));
/// chaos.fail_next_writes(1);
/// ```
#[derive(Clone)]
pub struct ChaosEvents {
    inner: Arc<dyn EventsProvider>,
    failing_writes: Arc<AtomicUsize>,
}

impl ChaosEvents {
    /// Wraps a provider with no failures armed.
    pub fn new(inner: Arc<dyn EventsProvider>) -> Self {
        Self {
            inner,
            failing_writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Arms the next `n` write operations to fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Consumes one armed failure, if any.
    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |armed| {
                armed.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl EventsProvider for ChaosEvents {
    async fn insert(&self, record: &EventRecord) -> AdapterResult<()> {
        if self.take_failure() {
            return Err(AdapterError::new("injected write failure"));
        }
        self.inner.insert(record).await
    }

    async fn insert_many(
        &self,
        records: &[EventRecord],
        batch_size: Option<usize>,
    ) -> AdapterResult<()> {
        if self.take_failure() {
            return Err(AdapterError::new("injected write failure"));
        }
        self.inner.insert_many(records, batch_size).await
    }

    async fn get(&self, options: &ReadOptions) -> AdapterResult<Vec<EventRecord>> {
        self.inner.get(options).await
    }

    async fn get_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> AdapterResult<Vec<EventRecord>> {
        self.inner.get_by_stream(stream, options).await
    }

    async fn get_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> AdapterResult<Vec<EventRecord>> {
        self.inner.get_by_streams(streams, options).await
    }

    async fn get_by_id(&self, id: &EventId) -> AdapterResult<Option<EventRecord>> {
        self.inner.get_by_id(id).await
    }

    async fn check_outdated(
        &self,
        stream: &StreamId,
        kind: &EventKind,
        created: Timestamp,
    ) -> AdapterResult<bool> {
        self.inner.check_outdated(stream, kind, created).await
    }
}

impl std::fmt::Debug for ChaosEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosEvents")
            .field("failing_writes", &self.failing_writes.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryAdapter;
    use ledgercore::testing::RecordBuilder;

    #[tokio::test]
    async fn armed_writes_fail_then_recover() {
        let memory = MemoryAdapter::new();
        let chaos = ChaosEvents::new(Arc::new(memory.events()));

        chaos.fail_next_writes(2);
        let record = RecordBuilder::new("tick").stream("s").build();
        assert!(chaos.insert(&record).await.is_err());
        assert!(chaos.insert(&record).await.is_err());

        // Disarmed: the write lands in the wrapped provider.
        chaos.insert(&record).await.unwrap();
        assert_eq!(memory.event_count(), 1);
    }

    #[tokio::test]
    async fn reads_pass_through_while_armed() {
        let memory = MemoryAdapter::new();
        let chaos = ChaosEvents::new(Arc::new(memory.events()));

        let record = RecordBuilder::new("tick").stream("s").build();
        chaos.insert(&record).await.unwrap();

        chaos.fail_next_writes(1);
        assert!(chaos.get_by_id(&record.id).await.unwrap().is_some());
        assert_eq!(chaos.get(&ReadOptions::new()).await.unwrap().len(), 1);
    }
}
