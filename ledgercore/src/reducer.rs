//! Reducers: folds of an ordered event list into a state.
//!
//! A [`Reducer`] is named — the name keys its snapshots — and folds a slice
//! of records, optionally seeded from a previously snapshotted state. The
//! events are always sorted ascending by `created`; that ordering is the
//! store's contract with every reducer.
//!
//! Two shapes exist: a plain fold built with [`FoldReducer`], and the
//! aggregate shape (see
//! [`AggregateReducer`](crate::aggregate::AggregateReducer)) that drives an
//! aggregate's `with` method per event.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::record::EventRecord;
use crate::types::ReducerName;

/// A named fold of an event list into a state.
pub trait Reducer: Send + Sync {
    /// The reduced state. Serialized to JSON when snapshotted.
    type State: Serialize + DeserializeOwned + Send;

    /// The reducer's name; snapshots are stored under it.
    fn name(&self) -> &ReducerName;

    /// Rehydrates a state from snapshotted JSON.
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] when the stored state no longer matches
    /// the state type.
    fn from_snapshot(&self, state: Value) -> StoreResult<Self::State> {
        serde_json::from_value(state).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Folds `events` onto `snapshot`, or onto the default state when no
    /// snapshot is given.
    fn reduce(&self, events: &[EventRecord], snapshot: Option<Self::State>) -> Self::State;
}

/// A fold reducer built from a function and a `Default` state.
///
/// # Examples
///
/// ```
/// use ledgercore::{FoldReducer, ReducerName};
///
/// let counter = FoldReducer::new(
///     ReducerName::try_new("event-count").unwrap(),
///     |count: u64, _record| count + 1,
/// );
/// ```
pub struct FoldReducer<S, F> {
    name: ReducerName,
    fold: F,
    _state: PhantomData<fn() -> S>,
}

impl<S, F> FoldReducer<S, F>
where
    S: Default + Serialize + DeserializeOwned + Send + Sync,
    F: Fn(S, &EventRecord) -> S + Send + Sync,
{
    /// Creates a named fold reducer.
    pub const fn new(name: ReducerName, fold: F) -> Self {
        Self {
            name,
            fold,
            _state: PhantomData,
        }
    }
}

impl<S, F> Reducer for FoldReducer<S, F>
where
    S: Default + Serialize + DeserializeOwned + Send + Sync,
    F: Fn(S, &EventRecord) -> S + Send + Sync,
{
    type State = S;

    fn name(&self) -> &ReducerName {
        &self.name
    }

    fn reduce(&self, events: &[EventRecord], snapshot: Option<S>) -> S {
        events
            .iter()
            .fold(snapshot.unwrap_or_default(), |state, record| {
                (self.fold)(state, record)
            })
    }
}
