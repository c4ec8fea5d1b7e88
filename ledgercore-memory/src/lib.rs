//! In-memory adapter for the LedgerCore event sourcing engine.
//!
//! This crate provides [`MemoryAdapter`] — storage for all three provider
//! slots (`EventsProvider`, `RelationsProvider`, `SnapshotsProvider`) backed
//! by standard library collections behind `RwLock`s. It is the reference
//! adapter for tests and development; no durability is provided.
//!
//! Writer isolation: every write takes a single write guard for its whole
//! operation, so concurrent batch inserts are serialized and a reader never
//! observes a partial batch.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod chaos;

pub use chaos::ChaosEvents;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use ledgercore::{
    Adapter, AdapterError, AdapterResult, Direction, EventId, EventKind, EventRecord,
    EventsProvider, ReadOptions, ReducerName, Relation, RelationKey, RelationOp,
    RelationsProvider, Snapshot, SnapshotsProvider, StreamId, Timestamp,
};

#[derive(Clone, Default)]
struct Shared {
    events: Arc<RwLock<Vec<EventRecord>>>,
    relations: Arc<RwLock<Vec<Relation>>>,
    snapshots: Arc<RwLock<HashMap<(ReducerName, String), Snapshot>>>,
}

/// Thread-safe in-memory storage behind the adapter contract.
///
/// The provider handles returned by [`events`](Self::events),
/// [`relations`](Self::relations), and [`snapshots`](Self::snapshots) all
/// share this instance's storage; [`into_adapter`](Self::into_adapter)
/// bundles them for an event store.
///
/// ```
/// use ledgercore_memory::MemoryAdapter;
///
/// let adapter = MemoryAdapter::new().into_adapter();
/// ```
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    shared: Shared,
}

/// Events provider over a [`MemoryAdapter`]'s storage.
#[derive(Clone)]
pub struct MemoryEvents {
    shared: Shared,
}

/// Relations provider over a [`MemoryAdapter`]'s storage.
#[derive(Clone)]
pub struct MemoryRelations {
    shared: Shared,
}

/// Snapshots provider over a [`MemoryAdapter`]'s storage.
#[derive(Clone)]
pub struct MemorySnapshots {
    shared: Shared,
}

impl MemoryAdapter {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// The events provider handle.
    pub fn events(&self) -> MemoryEvents {
        MemoryEvents {
            shared: self.shared.clone(),
        }
    }

    /// The relations provider handle.
    pub fn relations(&self) -> MemoryRelations {
        MemoryRelations {
            shared: self.shared.clone(),
        }
    }

    /// The snapshots provider handle.
    pub fn snapshots(&self) -> MemorySnapshots {
        MemorySnapshots {
            shared: self.shared.clone(),
        }
    }

    /// Bundles the three provider handles for an event store.
    pub fn into_adapter(self) -> Adapter {
        Adapter::new(
            Arc::new(self.events()),
            Arc::new(self.relations()),
            Arc::new(self.snapshots()),
        )
    }

    /// Number of records in the ledger.
    pub fn event_count(&self) -> usize {
        self.shared.events.read().expect("RwLock poisoned").len()
    }
}

/// Applies kind filter, cursor, direction, and limit to a pre-selected set.
fn apply_options(mut records: Vec<EventRecord>, options: &ReadOptions) -> Vec<EventRecord> {
    if let Some(kinds) = &options.kinds {
        records.retain(|record| kinds.contains(&record.kind));
    }

    records.sort_by(|a, b| a.created.cmp(&b.created));

    if let Some(cursor) = options.cursor {
        match options.direction {
            Direction::Asc => records.retain(|record| record.created > cursor),
            Direction::Desc => records.retain(|record| record.created < cursor),
        }
    }

    if options.direction == Direction::Desc {
        records.reverse();
    }

    if let Some(limit) = options.limit {
        records.truncate(limit);
    }

    records
}

#[async_trait]
impl EventsProvider for MemoryEvents {
    async fn insert(&self, record: &EventRecord) -> AdapterResult<()> {
        let mut events = self.shared.events.write().expect("RwLock poisoned");
        if events.iter().any(|existing| existing.id == record.id) {
            return Err(AdapterError::new(format!(
                "duplicate event id '{}'",
                record.id
            )));
        }
        events.push(record.clone());
        Ok(())
    }

    async fn insert_many(
        &self,
        records: &[EventRecord],
        _batch_size: Option<usize>,
    ) -> AdapterResult<()> {
        // One write guard for the whole batch: either every record lands or
        // none does, and readers never observe a partial batch. The batch
        // size hint is for backends that chunk round-trips; irrelevant here.
        let mut events = self.shared.events.write().expect("RwLock poisoned");

        for (index, record) in records.iter().enumerate() {
            let duplicate_within = records[..index]
                .iter()
                .any(|earlier| earlier.id == record.id);
            let duplicate_existing = events.iter().any(|existing| existing.id == record.id);
            if duplicate_within || duplicate_existing {
                return Err(AdapterError::new(format!(
                    "duplicate event id '{}'",
                    record.id
                )));
            }
        }

        events.extend(records.iter().cloned());
        Ok(())
    }

    async fn get(&self, options: &ReadOptions) -> AdapterResult<Vec<EventRecord>> {
        let events = self.shared.events.read().expect("RwLock poisoned");
        Ok(apply_options(events.clone(), options))
    }

    async fn get_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> AdapterResult<Vec<EventRecord>> {
        let events = self.shared.events.read().expect("RwLock poisoned");
        let selected = events
            .iter()
            .filter(|record| &record.stream == stream)
            .cloned()
            .collect();
        Ok(apply_options(selected, options))
    }

    async fn get_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> AdapterResult<Vec<EventRecord>> {
        let events = self.shared.events.read().expect("RwLock poisoned");
        let selected = events
            .iter()
            .filter(|record| streams.contains(&record.stream))
            .cloned()
            .collect();
        Ok(apply_options(selected, options))
    }

    async fn get_by_id(&self, id: &EventId) -> AdapterResult<Option<EventRecord>> {
        let events = self.shared.events.read().expect("RwLock poisoned");
        Ok(events.iter().find(|record| &record.id == id).cloned())
    }

    async fn check_outdated(
        &self,
        stream: &StreamId,
        kind: &EventKind,
        created: Timestamp,
    ) -> AdapterResult<bool> {
        let events = self.shared.events.read().expect("RwLock poisoned");
        Ok(events.iter().any(|record| {
            &record.stream == stream && &record.kind == kind && record.created > created
        }))
    }
}

#[async_trait]
impl RelationsProvider for MemoryRelations {
    async fn handle(&self, ops: &[RelationOp]) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        for op in ops {
            match op {
                RelationOp::Insert(relation) => {
                    if !relations.contains(relation) {
                        relations.push(relation.clone());
                    }
                }
                RelationOp::Remove(relation) => {
                    relations.retain(|existing| existing != relation);
                }
            }
        }
        Ok(())
    }

    async fn insert(&self, key: &RelationKey, stream: &StreamId) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        let relation = Relation::new(key.clone(), stream.clone());
        if !relations.contains(&relation) {
            relations.push(relation);
        }
        Ok(())
    }

    async fn insert_many(
        &self,
        pairs: &[Relation],
        _batch_size: Option<usize>,
    ) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        for relation in pairs {
            if !relations.contains(relation) {
                relations.push(relation.clone());
            }
        }
        Ok(())
    }

    async fn get_by_key(&self, key: &RelationKey) -> AdapterResult<Vec<StreamId>> {
        let relations = self.shared.relations.read().expect("RwLock poisoned");
        Ok(relations
            .iter()
            .filter(|relation| &relation.key == key)
            .map(|relation| relation.stream.clone())
            .collect())
    }

    async fn get_by_keys(&self, keys: &[RelationKey]) -> AdapterResult<Vec<StreamId>> {
        let relations = self.shared.relations.read().expect("RwLock poisoned");
        let mut streams: Vec<StreamId> = Vec::new();
        for relation in relations.iter() {
            if keys.contains(&relation.key) && !streams.contains(&relation.stream) {
                streams.push(relation.stream.clone());
            }
        }
        Ok(streams)
    }

    async fn remove(&self, key: &RelationKey, stream: &StreamId) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        relations.retain(|relation| !(&relation.key == key && &relation.stream == stream));
        Ok(())
    }

    async fn remove_many(
        &self,
        pairs: &[Relation],
        _batch_size: Option<usize>,
    ) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        relations.retain(|relation| !pairs.contains(relation));
        Ok(())
    }

    async fn remove_by_keys(&self, keys: &[RelationKey]) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        relations.retain(|relation| !keys.contains(&relation.key));
        Ok(())
    }

    async fn remove_by_streams(&self, streams: &[StreamId]) -> AdapterResult<()> {
        let mut relations = self.shared.relations.write().expect("RwLock poisoned");
        relations.retain(|relation| !streams.contains(&relation.stream));
        Ok(())
    }
}

#[async_trait]
impl SnapshotsProvider for MemorySnapshots {
    async fn insert(&self, snapshot: Snapshot) -> AdapterResult<()> {
        let mut snapshots = self.shared.snapshots.write().expect("RwLock poisoned");
        snapshots.insert(
            (snapshot.name.clone(), snapshot.subject.clone()),
            snapshot,
        );
        Ok(())
    }

    async fn get_by_subject(
        &self,
        name: &ReducerName,
        subject: &str,
    ) -> AdapterResult<Option<Snapshot>> {
        let snapshots = self.shared.snapshots.read().expect("RwLock poisoned");
        Ok(snapshots
            .get(&(name.clone(), subject.to_string()))
            .cloned())
    }

    async fn remove(&self, name: &ReducerName, subject: &str) -> AdapterResult<()> {
        let mut snapshots = self.shared.snapshots.write().expect("RwLock poisoned");
        snapshots.remove(&(name.clone(), subject.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream(s: &str) -> StreamId {
        StreamId::try_new(s).unwrap()
    }

    fn kind(s: &str) -> EventKind {
        EventKind::try_new(s).unwrap()
    }

    fn key(s: &str) -> RelationKey {
        RelationKey::try_new(s).unwrap()
    }

    fn record(stream_name: &str, kind_name: &str, time: u64) -> EventRecord {
        EventRecord {
            id: EventId::new(),
            stream: stream(stream_name),
            kind: kind(kind_name),
            data: Some(json!({ "t": time })),
            meta: None,
            created: Timestamp::new(time, 0),
            recorded: Timestamp::new(time, 0),
        }
    }

    #[tokio::test]
    async fn insert_and_read_back_sorted_by_created() {
        let events = MemoryAdapter::new().events();
        events.insert(&record("s", "tick", 30)).await.unwrap();
        events.insert(&record("s", "tick", 10)).await.unwrap();
        events.insert(&record("s", "tick", 20)).await.unwrap();

        let records = events.get(&ReadOptions::new()).await.unwrap();
        let times: Vec<u64> = records.iter().map(|r| r.created.time()).collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let events = MemoryAdapter::new().events();
        let original = record("s", "tick", 1);
        events.insert(&original).await.unwrap();

        let mut duplicate = record("s", "tick", 2);
        duplicate.id = original.id;
        assert!(events.insert(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn insert_many_rejects_the_whole_batch_on_duplicate() {
        let adapter = MemoryAdapter::new();
        let events = adapter.events();
        let existing = record("s", "tick", 1);
        events.insert(&existing).await.unwrap();

        let fresh = record("s", "tick", 2);
        let mut clashing = record("s", "tick", 3);
        clashing.id = existing.id;

        let result = events.insert_many(&[fresh.clone(), clashing], None).await;
        assert!(result.is_err());

        // The fresh record must not have landed either.
        assert!(events.get_by_id(&fresh.id).await.unwrap().is_none());
        assert_eq!(adapter.event_count(), 1);
    }

    #[tokio::test]
    async fn read_options_filter_cursor_direction_limit() {
        let events = MemoryAdapter::new().events();
        for t in 1..=6 {
            let k = if t % 2 == 0 { "even" } else { "odd" };
            events.insert(&record("s", k, t)).await.unwrap();
        }

        let evens = events
            .get(&ReadOptions::new().with_kinds([kind("even")]))
            .await
            .unwrap();
        assert_eq!(evens.len(), 3);

        // Cursor is exclusive.
        let after = events
            .get(&ReadOptions::new().with_cursor(Timestamp::new(4, 0)))
            .await
            .unwrap();
        let times: Vec<u64> = after.iter().map(|r| r.created.time()).collect();
        assert_eq!(times, vec![5, 6]);

        let newest_two = events
            .get(
                &ReadOptions::new()
                    .with_direction(Direction::Desc)
                    .with_limit(2),
            )
            .await
            .unwrap();
        let times: Vec<u64> = newest_two.iter().map(|r| r.created.time()).collect();
        assert_eq!(times, vec![6, 5]);
    }

    #[tokio::test]
    async fn get_by_streams_merges_in_created_order() {
        let events = MemoryAdapter::new().events();
        events.insert(&record("a", "tick", 2)).await.unwrap();
        events.insert(&record("b", "tick", 1)).await.unwrap();
        events.insert(&record("c", "tick", 3)).await.unwrap();

        let merged = events
            .get_by_streams(&[stream("a"), stream("b")], &ReadOptions::new())
            .await
            .unwrap();
        let times: Vec<u64> = merged.iter().map(|r| r.created.time()).collect();
        assert_eq!(times, vec![1, 2]);
    }

    #[tokio::test]
    async fn check_outdated_requires_same_stream_and_kind() {
        let events = MemoryAdapter::new().events();
        events.insert(&record("s", "tick", 100)).await.unwrap();

        // Earlier record of the same (stream, kind): outdated.
        assert!(events
            .check_outdated(&stream("s"), &kind("tick"), Timestamp::new(50, 0))
            .await
            .unwrap());
        // Later than everything stored: current.
        assert!(!events
            .check_outdated(&stream("s"), &kind("tick"), Timestamp::new(150, 0))
            .await
            .unwrap());
        // Different kind or stream: not outdated.
        assert!(!events
            .check_outdated(&stream("s"), &kind("tock"), Timestamp::new(50, 0))
            .await
            .unwrap());
        assert!(!events
            .check_outdated(&stream("other"), &kind("tick"), Timestamp::new(50, 0))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn relations_ignore_duplicates_and_dedup_reads() {
        let relations = MemoryAdapter::new().relations();
        relations.insert(&key("k1"), &stream("a")).await.unwrap();
        relations.insert(&key("k1"), &stream("a")).await.unwrap();
        relations.insert(&key("k1"), &stream("b")).await.unwrap();
        relations.insert(&key("k2"), &stream("a")).await.unwrap();

        let by_key = relations.get_by_key(&key("k1")).await.unwrap();
        assert_eq!(by_key, vec![stream("a"), stream("b")]);

        // Stream "a" appears under both keys; the fan-in deduplicates it.
        let by_keys = relations.get_by_keys(&[key("k1"), key("k2")]).await.unwrap();
        assert_eq!(by_keys, vec![stream("a"), stream("b")]);
    }

    #[tokio::test]
    async fn relation_removal_variants() {
        let relations = MemoryAdapter::new().relations();
        for (k, s) in [("k1", "a"), ("k1", "b"), ("k2", "a"), ("k3", "c")] {
            relations.insert(&key(k), &stream(s)).await.unwrap();
        }

        relations.remove(&key("k1"), &stream("a")).await.unwrap();
        assert_eq!(
            relations.get_by_key(&key("k1")).await.unwrap(),
            vec![stream("b")]
        );

        relations.remove_by_streams(&[stream("a")]).await.unwrap();
        assert!(relations.get_by_key(&key("k2")).await.unwrap().is_empty());

        relations.remove_by_keys(&[key("k3")]).await.unwrap();
        assert!(relations.get_by_key(&key("k3")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_applies_ops_in_order() {
        let relations = MemoryAdapter::new().relations();
        let pair = Relation::new(key("k"), stream("s"));

        relations
            .handle(&[
                RelationOp::Insert(pair.clone()),
                RelationOp::Insert(pair.clone()),
                RelationOp::Remove(pair.clone()),
                RelationOp::Insert(pair),
            ])
            .await
            .unwrap();

        assert_eq!(
            relations.get_by_key(&key("k")).await.unwrap(),
            vec![stream("s")]
        );
    }

    #[tokio::test]
    async fn snapshots_replace_per_name_and_subject() {
        let snapshots = MemoryAdapter::new().snapshots();
        let name = ReducerName::try_new("user").unwrap();

        snapshots
            .insert(Snapshot {
                name: name.clone(),
                subject: "u1".to_string(),
                cursor: Timestamp::new(10, 0),
                state: json!({ "v": 1 }),
            })
            .await
            .unwrap();
        snapshots
            .insert(Snapshot {
                name: name.clone(),
                subject: "u1".to_string(),
                cursor: Timestamp::new(20, 0),
                state: json!({ "v": 2 }),
            })
            .await
            .unwrap();

        let snapshot = snapshots
            .get_by_subject(&name, "u1")
            .await
            .unwrap()
            .expect("snapshot stored");
        assert_eq!(snapshot.cursor, Timestamp::new(20, 0));
        assert_eq!(snapshot.state, json!({ "v": 2 }));

        snapshots.remove(&name, "u1").await.unwrap();
        assert!(snapshots.get_by_subject(&name, "u1").await.unwrap().is_none());
    }
}
