//! Aggregate roots: domain state with a pending-event buffer.
//!
//! An [`Aggregate`] is the state half — a `Default` + serde type folding
//! records through [`with`](Aggregate::with). A [`Root`] wraps that state
//! with a stream id, the buffer of uncommitted records, and a store handle
//! for the commit helpers. The store owns no aggregates; it only operates on
//! them transiently while committing.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreResult;
use crate::record::{EventInput, EventRecord};
use crate::reducer::Reducer;
use crate::store::{EventStore, InsertSettings, ReduceTarget};
use crate::types::{ReducerName, StreamId};

/// Domain state derived from an event history.
///
/// Implementations provide the fold; [`Root`] provides identity, buffering,
/// and commit plumbing around it.
///
/// # Examples
///
/// ```
/// use ledgercore::{Aggregate, EventRecord, ReducerName};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Clone, Serialize, Deserialize)]
/// struct User {
///     email: Option<String>,
/// }
///
/// impl Aggregate for User {
///     fn name() -> ReducerName {
///         ReducerName::try_new("user").expect("valid reducer name")
///     }
///
///     fn with(&mut self, record: &EventRecord) {
///         if record.kind.as_ref() == "user:created" {
///             self.email = record
///                 .data
///                 .as_ref()
///                 .and_then(|data| data["email"].as_str())
///                 .map(String::from);
///         }
///     }
/// }
/// ```
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The reducer name this aggregate's snapshots are stored under.
    fn name() -> ReducerName;

    /// Folds one record into the state.
    ///
    /// Must be total: unknown kinds are ignored, not rejected.
    fn with(&mut self, record: &EventRecord);
}

/// The aggregate shape of a reducer: instantiates the aggregate (optionally
/// seeded from a snapshot) and folds each event through
/// [`Aggregate::with`].
pub struct AggregateReducer<A> {
    name: ReducerName,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> AggregateReducer<A> {
    /// Creates the reducer for `A`, named [`Aggregate::name`].
    pub fn new() -> Self {
        Self {
            name: A::name(),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> Default for AggregateReducer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> Reducer for AggregateReducer<A> {
    type State = A;

    fn name(&self) -> &ReducerName {
        &self.name
    }

    fn reduce(&self, events: &[EventRecord], snapshot: Option<A>) -> A {
        let mut state = snapshot.unwrap_or_default();
        for record in events {
            state.with(record);
        }
        state
    }
}

/// An aggregate instance bound to a stream and a store.
///
/// Records pushed through [`push`](Self::push) are applied to the state
/// immediately and buffered until [`save`](Self::save) commits them as one
/// atomic batch.
pub struct Root<A: Aggregate> {
    id: StreamId,
    state: A,
    pending: Vec<EventRecord>,
    store: EventStore,
}

impl<A: Aggregate> Root<A> {
    /// Creates a fresh aggregate on a generated stream.
    pub fn new(store: EventStore) -> Self {
        Self::with_id(store, StreamId::generate())
    }

    /// Creates a fresh aggregate on a given stream, without reading it.
    pub fn with_id(store: EventStore, id: StreamId) -> Self {
        Self {
            id,
            state: A::default(),
            pending: Vec::new(),
            store,
        }
    }

    /// Loads an aggregate by reducing its stream (snapshot-accelerated).
    ///
    /// A stream with no history yields the default state.
    ///
    /// # Errors
    ///
    /// As for [`EventStore::reduce`].
    pub async fn load(store: EventStore, id: StreamId) -> StoreResult<Self> {
        let state = store
            .reduce(&AggregateReducer::<A>::new(), ReduceTarget::Stream(id.clone()))
            .await?
            .unwrap_or_default();
        Ok(Self {
            id,
            state,
            pending: Vec::new(),
            store,
        })
    }

    /// The stream this aggregate lives on.
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// The current state, including every pending record's effect.
    pub fn state(&self) -> &A {
        &self.state
    }

    /// Factory-produces a record onto this aggregate's stream, applies it to
    /// the state, and buffers it for the next [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// As for [`EventStore::make_event`]; the state and buffer are untouched
    /// on failure.
    pub fn push(&mut self, input: EventInput) -> StoreResult<&mut Self> {
        let input = EventInput {
            stream: Some(self.id.clone()),
            ..input
        };
        let record = self.store.make_event(input)?;
        self.state.with(&record);
        self.pending.push(record);
        Ok(self)
    }

    /// Whether uncommitted records are buffered.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The uncommitted records, for multi-aggregate batched commits.
    pub fn to_pending(&self) -> &[EventRecord] {
        &self.pending
    }

    /// Clears the pending buffer without committing.
    pub fn flush(&mut self) {
        self.pending.clear();
    }

    /// Commits the pending records with default settings, flushing on
    /// success.
    ///
    /// # Errors
    ///
    /// As for [`Self::save_with`].
    pub async fn save(&mut self) -> StoreResult<()> {
        self.save_with(InsertSettings::default(), true).await
    }

    /// Commits the pending records as one atomic batch.
    ///
    /// A clean aggregate is a no-op. On success the buffer is cleared when
    /// `flush` is set; pass `false` to keep it, e.g. when the same records
    /// feed a later multi-aggregate commit.
    ///
    /// # Errors
    ///
    /// As for [`EventStore::push_many_events`]; the buffer is kept on
    /// failure.
    pub async fn save_with(&mut self, settings: InsertSettings, flush: bool) -> StoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store
            .push_many_events(self.pending.clone(), settings)
            .await?;
        if flush {
            self.flush();
        }
        Ok(())
    }

    /// Saves, then persists a snapshot of this aggregate's stream under
    /// [`Aggregate::name`].
    ///
    /// # Errors
    ///
    /// As for [`Self::save`] and [`EventStore::create_snapshot`].
    pub async fn snapshot(&mut self) -> StoreResult<()> {
        self.save().await?;
        self.store
            .create_snapshot(
                &AggregateReducer::<A>::new(),
                ReduceTarget::Stream(self.id.clone()),
            )
            .await
    }
}

impl<A: Aggregate + std::fmt::Debug> std::fmt::Debug for Root<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::types::{EventId, EventKind};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        ticks: u64,
    }

    impl Aggregate for Counter {
        fn name() -> ReducerName {
            ReducerName::try_new("counter").expect("valid reducer name")
        }

        fn with(&mut self, record: &EventRecord) {
            if record.kind.as_ref() == "tick" {
                self.ticks += 1;
            }
        }
    }

    fn record(stream: &str, kind: &str, time: u64) -> EventRecord {
        EventRecord {
            id: EventId::new(),
            stream: StreamId::try_new(stream).unwrap(),
            kind: EventKind::try_new(kind).unwrap(),
            data: Some(json!({})),
            meta: None,
            created: Timestamp::new(time, 0),
            recorded: Timestamp::new(time, 0),
        }
    }

    #[test]
    fn aggregate_reducer_folds_through_with() {
        let reducer = AggregateReducer::<Counter>::new();
        assert_eq!(reducer.name().as_ref(), "counter");

        let events = [
            record("s", "tick", 1),
            record("s", "noise", 2),
            record("s", "tick", 3),
        ];
        let state = reducer.reduce(&events, None);
        assert_eq!(state.ticks, 2);
    }

    #[test]
    fn aggregate_reducer_seeds_from_snapshot() {
        let reducer = AggregateReducer::<Counter>::new();
        let events = [record("s", "tick", 5)];
        let state = reducer.reduce(&events, Some(Counter { ticks: 10 }));
        assert_eq!(state.ticks, 11);
    }

    #[test]
    fn aggregate_reducer_rehydrates_snapshot_state() {
        let reducer = AggregateReducer::<Counter>::new();
        let state = reducer.from_snapshot(json!({ "ticks": 7 })).unwrap();
        assert_eq!(state, Counter { ticks: 7 });
    }
}
