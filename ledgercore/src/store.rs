//! The event store: validation → persistence → fan-out.
//!
//! [`EventStore`] composes the catalog, an adapter bundle, the HLC clock,
//! and insert hooks. It owns the append path (single and atomic multi-event
//! writes), the status probe used for replication, relation fan-in reads,
//! and snapshot-accelerated reduction.
//!
//! The store is a cheap-to-clone handle; clones share all state. It is
//! logically single-threaded per instance — parallelism exists only where
//! the runtime multiplexes the futures it returns.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::instrument;

use crate::adapter::{Adapter, ReadOptions, Snapshot};
use crate::aggregate::{Aggregate, Root};
use crate::catalog::Catalog;
use crate::clock::{HlcClock, HlcConfig};
use crate::errors::{StoreError, StoreResult};
use crate::projector::Projector;
use crate::record::{EventInput, EventRecord, EventStatus, RecordStatus};
use crate::reducer::Reducer;
use crate::types::{ReducerName, RelationKey, StreamId};

/// When the store writes snapshots during [`EventStore::reduce`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Snapshots are written only through
    /// [`EventStore::create_snapshot`] (the default).
    #[default]
    Manual,
    /// Every reduction that folded at least one event persists its result
    /// as the new snapshot.
    Auto,
}

/// Store-wide configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Snapshot write policy for reductions.
    pub snapshot: SnapshotPolicy,
}

/// Per-insert settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSettings {
    /// Whether to invoke the `on_events_inserted` hook after a successful
    /// insert. Defaults to `true`.
    pub emit: bool,
    /// Batch key published to batched listeners alongside the per-record
    /// fan-out.
    pub batch: Option<String>,
    /// Replay classification handed to the projector. Defaults to
    /// [`RecordStatus::LIVE`]; the sync path overrides it.
    pub status: RecordStatus,
}

impl Default for InsertSettings {
    fn default() -> Self {
        Self {
            emit: true,
            batch: None,
            status: RecordStatus::LIVE,
        }
    }
}

impl InsertSettings {
    /// Creates the default settings: emit, no batch key, live status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses the insert hook for this write.
    #[must_use]
    pub const fn without_emit(mut self) -> Self {
        self.emit = false;
        self
    }

    /// Publishes the batch to batched listeners under `key`.
    #[must_use]
    pub fn with_batch(mut self, key: impl Into<String>) -> Self {
        self.batch = Some(key.into());
        self
    }

    /// Overrides the replay classification handed to the projector.
    #[must_use]
    pub const fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }
}

/// Hook invoked with the exact inserted batch, exactly once per successful
/// insert.
pub type InsertedHook =
    Arc<dyn Fn(Vec<EventRecord>, InsertSettings) -> BoxFuture<'static, StoreResult<()>> + Send + Sync>;

/// Hook receiving errors absorbed after a successful insert.
pub type ErrorHook = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// Insert lifecycle hooks.
///
/// `on_events_inserted` runs after every successful insert (unless the
/// settings suppress it); its failures never fail the insert — they are
/// routed to `on_error`, which defaults to an error-level log line.
#[derive(Clone, Default)]
pub struct Hooks {
    on_events_inserted: Option<InsertedHook>,
    on_error: Option<ErrorHook>,
}

impl Hooks {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the insert hook.
    #[must_use]
    pub fn on_events_inserted<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Vec<EventRecord>, InsertSettings) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StoreResult<()>> + Send + 'static,
    {
        self.on_events_inserted = Some(Arc::new(move |records, settings| {
            Box::pin(hook(records, settings))
        }));
        self
    }

    /// Sets the error hook.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&StoreError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_events_inserted", &self.on_events_inserted.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// What a reduction runs over: one stream, or the fan-in of a relation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReduceTarget {
    /// A single stream's timeline.
    Stream(StreamId),
    /// Every stream tagged by the relation key, merged in `created` order.
    Relation(RelationKey),
}

impl ReduceTarget {
    /// The snapshot subject for this target.
    pub fn subject(&self) -> &str {
        match self {
            Self::Stream(stream) => stream.as_ref(),
            Self::Relation(key) => key.as_ref(),
        }
    }
}

impl From<StreamId> for ReduceTarget {
    fn from(stream: StreamId) -> Self {
        Self::Stream(stream)
    }
}

impl From<RelationKey> for ReduceTarget {
    fn from(key: RelationKey) -> Self {
        Self::Relation(key)
    }
}

struct StoreInner {
    catalog: Catalog,
    adapter: Adapter,
    clock: HlcClock,
    config: StoreConfig,
    hooks: Hooks,
}

/// Builder for an [`EventStore`].
pub struct EventStoreBuilder {
    catalog: Catalog,
    adapter: Adapter,
    clock: Option<HlcConfig>,
    config: StoreConfig,
    hooks: Hooks,
    projector: Option<Projector>,
}

impl EventStoreBuilder {
    /// Sets the HLC clock configuration.
    #[must_use]
    pub fn clock(mut self, config: HlcConfig) -> Self {
        self.clock = Some(config);
        self
    }

    /// Sets the snapshot policy.
    #[must_use]
    pub const fn snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.config.snapshot = policy;
        self
    }

    /// Sets the insert hooks. Replaces any hook wiring done so far.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Connects a projector: unless an `on_events_inserted` hook is set
    /// explicitly, every inserted record is pushed to the projector with the
    /// settings' status, and batches carrying a batch key are additionally
    /// published to its batched listeners.
    #[must_use]
    pub fn projector(mut self, projector: Projector) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Builds the store.
    pub fn build(self) -> EventStore {
        let mut hooks = self.hooks;
        if hooks.on_events_inserted.is_none() {
            if let Some(projector) = self.projector {
                hooks.on_events_inserted = Some(projector_hook(projector));
            }
        }

        EventStore {
            inner: Arc::new(StoreInner {
                catalog: self.catalog,
                adapter: self.adapter,
                clock: HlcClock::new(self.clock.unwrap_or_default()),
                config: self.config,
                hooks,
            }),
        }
    }
}

/// The default insert hook: per-record projector fan-out plus batched
/// publication when the settings carry a batch key.
fn projector_hook(projector: Projector) -> InsertedHook {
    Arc::new(move |records, settings| {
        let projector = projector.clone();
        Box::pin(async move {
            for record in &records {
                projector.push(record.clone(), settings.status).await?;
            }
            if let Some(batch_key) = &settings.batch {
                projector.push_many(batch_key, records).await;
            }
            Ok(())
        })
    })
}

/// Top-level orchestrator of the ledger.
///
/// # Examples
///
/// ```no_run
/// use ledgercore::{
///     Catalog, EventInput, EventKind, EventStore, EventType, InsertSettings, Projector,
/// };
/// use ledgercore::schema::{object, string};
///
/// # async fn example(adapter: ledgercore::Adapter) -> ledgercore::StoreResult<()> {
/// let mut catalog = Catalog::new();
/// catalog.register(
///     EventType::new(EventKind::try_new("user:created").unwrap())
///         .with_data_schema(object([("email", string())])),
/// );
///
/// let projector = Projector::new();
/// let store = EventStore::builder(catalog, adapter)
///     .projector(projector.clone())
///     .build();
///
/// let record = store.make_event(
///     EventInput::new(EventKind::try_new("user:created").unwrap())
///         .with_data(serde_json::json!({ "email": "a@x" })),
/// )?;
/// store.push_event(record, InsertSettings::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<StoreInner>,
}

impl EventStore {
    /// Starts building a store over a catalog and an adapter bundle.
    pub fn builder(catalog: Catalog, adapter: Adapter) -> EventStoreBuilder {
        EventStoreBuilder {
            catalog,
            adapter,
            clock: None,
            config: StoreConfig::default(),
            hooks: Hooks::default(),
            projector: None,
        }
    }

    /// Creates a store with default configuration and no hooks.
    pub fn new(catalog: Catalog, adapter: Adapter) -> Self {
        Self::builder(catalog, adapter).build()
    }

    /// The event type catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// The adapter bundle.
    pub fn adapter(&self) -> &Adapter {
        &self.inner.adapter
    }

    /// The store's clock.
    pub fn clock(&self) -> &HlcClock {
        &self.inner.clock
    }

    /// Creates a record from an input via the catalog's record factory.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingEvent`] for an unregistered kind,
    /// [`StoreError::Validation`] when the payloads do not conform,
    /// [`StoreError::Clock`] when the clock refuses a timestamp.
    pub fn make_event(&self, input: EventInput) -> StoreResult<EventRecord> {
        let event_type = self
            .inner
            .catalog
            .get(&input.kind)
            .ok_or_else(|| StoreError::MissingEvent(input.kind.clone()))?;
        event_type.record(input, &self.inner.clock)
    }

    /// Validates and persists one record, then emits it to the insert hook.
    ///
    /// Hook failures are absorbed: they are routed to the error hook and
    /// never fail the insert.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingEvent`], [`StoreError::Validation`], or
    /// [`StoreError::Insertion`] when the adapter rejects the write.
    #[instrument(skip_all, fields(kind = %record.kind, stream = %record.stream))]
    pub async fn push_event(
        &self,
        record: EventRecord,
        settings: InsertSettings,
    ) -> StoreResult<()> {
        self.inner.catalog.validate(&record)?;

        self.inner
            .adapter
            .events
            .insert(&record)
            .await
            .map_err(|e| StoreError::Insertion(e.to_string()))?;
        tracing::debug!(id = %record.id, "record inserted");

        self.emit(vec![record], settings).await;
        Ok(())
    }

    /// Validates and persists a batch in a single transactional write, then
    /// emits the full batch to the insert hook exactly once.
    ///
    /// # Errors
    ///
    /// The first [`StoreError::Validation`] among the records (nothing is
    /// written then), or [`StoreError::Insertion`] when the adapter rejects
    /// the batch — in which case the adapter has rolled back every record of
    /// it.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn push_many_events(
        &self,
        records: Vec<EventRecord>,
        settings: InsertSettings,
    ) -> StoreResult<()> {
        for record in &records {
            self.inner.catalog.validate(record)?;
        }
        if records.is_empty() {
            return Ok(());
        }

        self.inner
            .adapter
            .events
            .insert_many(&records, None)
            .await
            .map_err(|e| StoreError::Insertion(e.to_string()))?;
        tracing::debug!(records = records.len(), "batch inserted");

        self.emit(records, settings).await;
        Ok(())
    }

    /// Probes the ledger for a (possibly foreign) record.
    ///
    /// When the id already exists, `outdated` is reported `true` as a
    /// sentinel — the caller treats the record as already seen. Otherwise
    /// `outdated` reflects whether a record of the same `(stream, kind)`
    /// with a strictly greater `created` is persisted.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] when the probe reads fail.
    pub async fn get_event_status(&self, record: &EventRecord) -> StoreResult<EventStatus> {
        let exists = self
            .inner
            .adapter
            .events
            .get_by_id(&record.id)
            .await?
            .is_some();
        if exists {
            return Ok(EventStatus {
                exists: true,
                outdated: true,
            });
        }

        let outdated = self
            .inner
            .adapter
            .events
            .check_outdated(&record.stream, &record.kind, record.created)
            .await?;
        Ok(EventStatus {
            exists: false,
            outdated,
        })
    }

    /// Receives a replicated record: probe, merge its `created` into the
    /// clock, restamp `recorded` locally, insert, and project as hydrated.
    ///
    /// An existing record is skipped (the returned status says so). A
    /// missing one is inserted and fanned out with
    /// `{hydrated: true, outdated}` per the probe, so `once` subscribers
    /// never fire for it while read models stay current.
    ///
    /// # Errors
    ///
    /// [`StoreError::Clock`] when the foreign timestamp violates the clock's
    /// offset bounds, plus everything [`push_event`](Self::push_event) can
    /// return.
    #[instrument(skip_all, fields(kind = %record.kind, stream = %record.stream))]
    pub async fn sync_event(
        &self,
        mut record: EventRecord,
        settings: InsertSettings,
    ) -> StoreResult<EventStatus> {
        let status = self.get_event_status(&record).await?;
        if status.exists {
            tracing::debug!(id = %record.id, "record already in ledger, skipping");
            return Ok(status);
        }

        record.recorded = self.inner.clock.update(record.created)?;

        let settings =
            settings.with_status(RecordStatus::new(true, status.outdated));
        self.push_event(record, settings).await?;
        Ok(status)
    }

    /// Reads records across all streams.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn get_events(&self, options: &ReadOptions) -> StoreResult<Vec<EventRecord>> {
        Ok(self.inner.adapter.events.get(options).await?)
    }

    /// Reads one stream's records.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn get_events_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        Ok(self
            .inner
            .adapter
            .events
            .get_by_stream(stream, options)
            .await?)
    }

    /// Reads several streams' records, merged in `created` order.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn get_events_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        Ok(self
            .inner
            .adapter
            .events
            .get_by_streams(streams, options)
            .await?)
    }

    /// Reads the records of every stream tagged by any of the keys.
    ///
    /// Resolves the keys through the relation index; an empty resolution
    /// short-circuits to an empty list without touching the events provider.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn get_events_by_relations(
        &self,
        keys: &[RelationKey],
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        let streams = self.inner.adapter.relations.get_by_keys(keys).await?;
        if streams.is_empty() {
            return Ok(Vec::new());
        }
        self.get_events_by_streams(&streams, options).await
    }

    /// Tags `stream` with `key` in the relation index.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn add_relation(&self, key: &RelationKey, stream: &StreamId) -> StoreResult<()> {
        Ok(self.inner.adapter.relations.insert(key, stream).await?)
    }

    /// Removes the `(key, stream)` pair from the relation index.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn remove_relation(&self, key: &RelationKey, stream: &StreamId) -> StoreResult<()> {
        Ok(self.inner.adapter.relations.remove(key, stream).await?)
    }

    /// Reduces a stream (or a relation fan-in) to a state, resuming from the
    /// reducer's snapshot when one exists.
    ///
    /// Returns `None` when there is neither a snapshot nor any event to
    /// fold. Under [`SnapshotPolicy::Auto`] a reduction that folded events
    /// persists its result as the new snapshot.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure,
    /// [`StoreError::Serialization`] when snapshot state does not round-trip
    /// through the reducer's state type.
    pub async fn reduce<R: Reducer>(
        &self,
        reducer: &R,
        target: impl Into<ReduceTarget>,
    ) -> StoreResult<Option<R::State>> {
        self.reduce_with(reducer, target, ReadOptions::new(), &[])
            .await
    }

    /// [`reduce`](Self::reduce) with an explicit event filter and a list of
    /// pending (uncommitted) records appended after the fetched ones.
    ///
    /// # Errors
    ///
    /// As for [`reduce`](Self::reduce).
    #[instrument(skip_all, fields(reducer = %reducer.name()))]
    pub async fn reduce_with<R: Reducer>(
        &self,
        reducer: &R,
        target: impl Into<ReduceTarget>,
        filter: ReadOptions,
        pending: &[EventRecord],
    ) -> StoreResult<Option<R::State>> {
        let target = target.into();
        let subject = target.subject().to_string();

        let snapshot = self
            .inner
            .adapter
            .snapshots
            .get_by_subject(reducer.name(), &subject)
            .await?;
        let (cursor, state) = match snapshot {
            Some(snapshot) => (
                Some(snapshot.cursor),
                Some(reducer.from_snapshot(snapshot.state)?),
            ),
            None => (None, None),
        };

        let mut options = filter;
        options.cursor = cursor.or(options.cursor);

        let mut events = self.fetch_target(&target, &options).await?;
        events.extend_from_slice(pending);

        let Some(last) = events.last() else {
            return Ok(state);
        };
        let last_created = last.created;
        let result = reducer.reduce(&events, state);

        if self.inner.config.snapshot == SnapshotPolicy::Auto {
            let state = serde_json::to_value(&result)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.inner
                .adapter
                .snapshots
                .insert(Snapshot {
                    name: reducer.name().clone(),
                    subject,
                    cursor: last_created,
                    state,
                })
                .await?;
        }

        Ok(Some(result))
    }

    /// Reduces the target from scratch and persists the result as its
    /// snapshot. A target with no events is a no-op.
    ///
    /// # Errors
    ///
    /// As for [`reduce`](Self::reduce).
    #[instrument(skip_all, fields(reducer = %reducer.name()))]
    pub async fn create_snapshot<R: Reducer>(
        &self,
        reducer: &R,
        target: impl Into<ReduceTarget>,
    ) -> StoreResult<()> {
        let target = target.into();
        let events = self.fetch_target(&target, &ReadOptions::new()).await?;
        let Some(last) = events.last() else {
            return Ok(());
        };

        let cursor = last.created;
        let result = reducer.reduce(&events, None);
        let state =
            serde_json::to_value(&result).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.inner
            .adapter
            .snapshots
            .insert(Snapshot {
                name: reducer.name().clone(),
                subject: target.subject().to_string(),
                cursor,
                state,
            })
            .await?;
        tracing::debug!(subject = target.subject(), cursor = %cursor, "snapshot written");
        Ok(())
    }

    /// Fetches the snapshot stored for `(name, subject)`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn get_snapshot(
        &self,
        name: &ReducerName,
        subject: &str,
    ) -> StoreResult<Option<Snapshot>> {
        Ok(self
            .inner
            .adapter
            .snapshots
            .get_by_subject(name, subject)
            .await?)
    }

    /// Deletes the snapshot stored for `(name, subject)`, if any.
    ///
    /// # Errors
    ///
    /// [`StoreError::Adapter`] on backend failure.
    pub async fn delete_snapshot(&self, name: &ReducerName, subject: &str) -> StoreResult<()> {
        Ok(self.inner.adapter.snapshots.remove(name, subject).await?)
    }

    /// Commits one aggregate's pending records as an atomic batch, flushing
    /// them on success.
    ///
    /// # Errors
    ///
    /// As for [`push_many_events`](Self::push_many_events); the pending
    /// buffer is kept on failure.
    pub async fn push_aggregate<A: Aggregate>(
        &self,
        root: &mut Root<A>,
        settings: InsertSettings,
    ) -> StoreResult<()> {
        let pending = root.to_pending().to_vec();
        if pending.is_empty() {
            return Ok(());
        }
        self.push_many_events(pending, settings).await?;
        root.flush();
        Ok(())
    }

    /// Commits several aggregates' pending records as one atomic batch,
    /// flushing all of them on success.
    ///
    /// # Errors
    ///
    /// As for [`push_many_events`](Self::push_many_events); every pending
    /// buffer is kept on failure.
    pub async fn push_many_aggregates<A: Aggregate>(
        &self,
        roots: &mut [Root<A>],
        settings: InsertSettings,
    ) -> StoreResult<()> {
        let pending: Vec<EventRecord> = roots
            .iter()
            .flat_map(|root| root.to_pending().iter().cloned())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        self.push_many_events(pending, settings).await?;
        for root in roots {
            root.flush();
        }
        Ok(())
    }

    async fn fetch_target(
        &self,
        target: &ReduceTarget,
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        match target {
            ReduceTarget::Stream(stream) => self.get_events_by_stream(stream, options).await,
            ReduceTarget::Relation(key) => {
                self.get_events_by_relations(std::slice::from_ref(key), options)
                    .await
            }
        }
    }

    /// Runs the insert hook and routes its failure to the error hook. Never
    /// fails the caller.
    async fn emit(&self, records: Vec<EventRecord>, settings: InsertSettings) {
        if !settings.emit {
            return;
        }
        let Some(hook) = &self.inner.hooks.on_events_inserted else {
            return;
        };

        if let Err(error) = hook(records, settings).await {
            self.route_error(&error);
        }
    }

    fn route_error(&self, error: &StoreError) {
        match &self.inner.hooks.on_error {
            Some(hook) => hook(error),
            None => tracing::error!(%error, "insert hook failed"),
        }
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("catalog", &self.inner.catalog)
            .field("config", &self.inner.config)
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}
