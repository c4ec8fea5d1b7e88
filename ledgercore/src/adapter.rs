//! The storage adapter contract.
//!
//! Any backend plugs into the engine by implementing three providers —
//! [`EventsProvider`], [`RelationsProvider`], [`SnapshotsProvider`] —
//! bundled into an [`Adapter`]. The store treats the bundle as an immutable
//! shared reference; all isolation and durability discipline lives behind
//! these traits.
//!
//! The one hard transactional requirement is
//! [`EventsProvider::insert_many`]: a failing batch must roll back every
//! write of that batch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Timestamp;
use crate::errors::{AdapterError, AdapterResult};
use crate::record::EventRecord;
use crate::types::{EventId, EventKind, ReducerName, RelationKey, StreamId};

/// Batch size used when an operation does not specify one.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Scan direction for event reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending by `created` (the default).
    #[default]
    Asc,
    /// Descending by `created`.
    Desc,
}

impl std::str::FromStr for Direction {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" | "1" => Ok(Self::Asc),
            "desc" | "-1" => Ok(Self::Desc),
            other => Err(AdapterError::new(format!(
                "unrecognized direction '{other}'"
            ))),
        }
    }
}

/// Filter options for event reads.
///
/// The cursor bounds the scan exclusively: ascending reads return records
/// created strictly after it, descending reads strictly before it. The
/// store's snapshot resume path relies on the exclusive bound — the record
/// at the cursor has already been folded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Restrict to these event kinds.
    pub kinds: Option<Vec<EventKind>>,
    /// Exclusive `created` bound to resume from.
    pub cursor: Option<Timestamp>,
    /// Scan direction; ascending unless told otherwise.
    pub direction: Direction,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl ReadOptions {
    /// Creates default options: all kinds, no cursor, ascending, unlimited.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the read to the given kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Resumes the scan strictly after `cursor`.
    #[must_use]
    pub const fn with_cursor(mut self, cursor: Timestamp) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Sets the scan direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Caps the number of returned records.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A `(key, stream)` pair of the secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// The fan-in key.
    pub key: RelationKey,
    /// The tagged stream.
    pub stream: StreamId,
}

impl Relation {
    /// Creates a relation pair.
    pub const fn new(key: RelationKey, stream: StreamId) -> Self {
        Self { key, stream }
    }
}

/// A single mutation of the relation index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOp {
    /// Add the pair; a duplicate is silently ignored.
    Insert(Relation),
    /// Remove the pair; a missing pair is silently ignored.
    Remove(Relation),
}

/// A snapshot of reduced state at a cursor.
///
/// At most one snapshot exists per `(name, subject)`; inserting replaces any
/// earlier one. The subject is a stream id or a relation key, depending on
/// what the reducer ran over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The reducer that produced the state.
    pub name: ReducerName,
    /// Stream id or relation key the reduction ran over.
    pub subject: String,
    /// `created` timestamp of the last folded record.
    pub cursor: Timestamp,
    /// The reduced state.
    pub state: Value,
}

/// Persistence port for event records.
#[async_trait]
pub trait EventsProvider: Send + Sync {
    /// Inserts one record.
    ///
    /// # Errors
    ///
    /// Any backend failure, including a duplicate record id.
    async fn insert(&self, record: &EventRecord) -> AdapterResult<()>;

    /// Inserts a batch atomically: a failure rolls back the entire batch.
    ///
    /// `batch_size` caps statements per round-trip where the backend cares;
    /// [`DEFAULT_BATCH_SIZE`] when `None`.
    ///
    /// # Errors
    ///
    /// Any backend failure; no record of the batch is persisted then.
    async fn insert_many(
        &self,
        records: &[EventRecord],
        batch_size: Option<usize>,
    ) -> AdapterResult<()>;

    /// Reads records across all streams.
    ///
    /// Sorted ascending by `created` unless the options say otherwise.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get(&self, options: &ReadOptions) -> AdapterResult<Vec<EventRecord>>;

    /// Reads one stream's records.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> AdapterResult<Vec<EventRecord>>;

    /// Reads several streams' records, merged into one `created`-ordered
    /// list.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> AdapterResult<Vec<EventRecord>>;

    /// Point lookup by record id.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get_by_id(&self, id: &EventId) -> AdapterResult<Option<EventRecord>>;

    /// Whether a record with the same `(stream, kind)` and a strictly
    /// greater `created` exists.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn check_outdated(
        &self,
        stream: &StreamId,
        kind: &EventKind,
        created: Timestamp,
    ) -> AdapterResult<bool>;
}

/// Persistence port for the `(key, stream)` secondary index.
#[async_trait]
pub trait RelationsProvider: Send + Sync {
    /// Applies a mixed list of insert/remove mutations in order.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn handle(&self, ops: &[RelationOp]) -> AdapterResult<()>;

    /// Adds one pair; a duplicate `(key, stream)` is silently ignored.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn insert(&self, key: &RelationKey, stream: &StreamId) -> AdapterResult<()>;

    /// Adds many pairs; duplicates are silently ignored.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn insert_many(
        &self,
        relations: &[Relation],
        batch_size: Option<usize>,
    ) -> AdapterResult<()>;

    /// Streams tagged by the key.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get_by_key(&self, key: &RelationKey) -> AdapterResult<Vec<StreamId>>;

    /// Streams tagged by any of the keys, deduplicated.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get_by_keys(&self, keys: &[RelationKey]) -> AdapterResult<Vec<StreamId>>;

    /// Removes one pair.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn remove(&self, key: &RelationKey, stream: &StreamId) -> AdapterResult<()>;

    /// Removes many pairs.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn remove_many(
        &self,
        relations: &[Relation],
        batch_size: Option<usize>,
    ) -> AdapterResult<()>;

    /// Removes every pair under the given keys.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn remove_by_keys(&self, keys: &[RelationKey]) -> AdapterResult<()>;

    /// Removes every pair referencing the given streams.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn remove_by_streams(&self, streams: &[StreamId]) -> AdapterResult<()>;
}

/// Persistence port for reducer snapshots.
#[async_trait]
pub trait SnapshotsProvider: Send + Sync {
    /// Stores a snapshot, replacing any existing one for its
    /// `(name, subject)`.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn insert(&self, snapshot: Snapshot) -> AdapterResult<()>;

    /// Fetches the snapshot for `(name, subject)`.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn get_by_subject(
        &self,
        name: &ReducerName,
        subject: &str,
    ) -> AdapterResult<Option<Snapshot>>;

    /// Deletes the snapshot for `(name, subject)`, if any.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    async fn remove(&self, name: &ReducerName, subject: &str) -> AdapterResult<()>;
}

/// The provider bundle handed to an event store.
#[derive(Clone)]
pub struct Adapter {
    /// Event record persistence.
    pub events: Arc<dyn EventsProvider>,
    /// Relation index persistence.
    pub relations: Arc<dyn RelationsProvider>,
    /// Snapshot persistence.
    pub snapshots: Arc<dyn SnapshotsProvider>,
}

impl Adapter {
    /// Bundles three providers.
    pub fn new(
        events: Arc<dyn EventsProvider>,
        relations: Arc<dyn RelationsProvider>,
        snapshots: Arc<dyn SnapshotsProvider>,
    ) -> Self {
        Self {
            events,
            relations,
            snapshots,
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Adapter { events, relations, snapshots }")
    }
}
