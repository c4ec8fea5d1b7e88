//! Replay-aware projection fan-out.
//!
//! The [`Projector`] dispatches persisted records to typed subscribers.
//! Dispatch is serialized per stream through a [`SerialQueue`]: records
//! sharing a stream are handled strictly FIFO, while distinct streams
//! proceed in parallel. Within one queue slot, every listener registered for
//! the record's kind runs concurrently; the slot completes when all of them
//! have completed.
//!
//! # Subscription modes
//!
//! | Mode   | accepts hydrated? | accepts outdated? |
//! |--------|-------------------|-------------------|
//! | `Once` | no                | no                |
//! | `On`   | yes               | no                |
//! | `All`  | yes               | yes               |
//!
//! `Once` is for side effects that must never replay (sending an email,
//! placing an external order); `On` is the default read-model projection,
//! replay-safe but skipping obsolete out-of-order records; `All` is the
//! catch-all for ordering-agnostic side effects.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::{ProjectionError, ProjectionResult};
use crate::queue::{DrainHook, SerialQueue, Worker};
use crate::record::{EventRecord, RecordStatus};
use crate::types::{EventKind, StreamId};

/// Replay sensitivity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Reject replayed and outdated records.
    Once,
    /// Accept replayed records, reject outdated ones.
    On,
    /// Accept everything.
    All,
}

impl SubscriptionMode {
    /// Whether a record with the given status is dispatched to this mode.
    pub const fn accepts(self, status: RecordStatus) -> bool {
        match self {
            Self::Once => !status.hydrated && !status.outdated,
            Self::On => !status.outdated,
            Self::All => true,
        }
    }
}

/// Boxed future returned by subscriber handlers.
pub type HandlerFuture = BoxFuture<'static, ProjectionResult<Option<Value>>>;

/// A subscriber handler: receives the record, resolves with optional result
/// data (passed to [`Effects::on_success`]) or rejects.
pub type Handler = Arc<dyn Fn(EventRecord) -> HandlerFuture + Send + Sync>;

/// A batched subscriber handler: receives the full insert batch at once.
pub type BatchHandler = Arc<dyn Fn(Vec<EventRecord>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome passed to [`Effects::on_success`].
#[derive(Debug, Clone)]
pub struct EffectOutcome {
    /// Data the handler resolved with, if any.
    pub data: Option<Value>,
    /// The dispatched record.
    pub record: EventRecord,
}

/// Failure passed to [`Effects::on_error`].
#[derive(Debug, Clone)]
pub struct EffectFailure {
    /// The handler's error.
    pub error: ProjectionError,
    /// The dispatched record.
    pub record: EventRecord,
}

type SuccessCallback = Arc<dyn Fn(EffectOutcome) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(EffectFailure) + Send + Sync>;

/// Side-effect callbacks attached to a subscription.
///
/// When effects are present, the handler's resolution is routed to
/// `on_success` and its failure to `on_error`; panics raised by the
/// callbacks themselves are swallowed. Without effects, a failing handler on
/// a non-`Once` subscription rejects the future returned by
/// [`Projector::push`].
#[derive(Clone, Default)]
pub struct Effects {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl Effects {
    /// Creates an empty effects set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success callback.
    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(EffectOutcome) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(EffectFailure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    fn success(&self, outcome: EffectOutcome) {
        if let Some(callback) = &self.on_success {
            let callback = Arc::clone(callback);
            if catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
                tracing::warn!("on_success effect panicked; swallowed");
            }
        }
    }

    fn failure(&self, failure: EffectFailure) {
        if let Some(callback) = &self.on_error {
            let callback = Arc::clone(callback);
            if catch_unwind(AssertUnwindSafe(move || callback(failure))).is_err() {
                tracing::warn!("on_error effect panicked; swallowed");
            }
        }
    }
}

impl std::fmt::Debug for Effects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effects")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Clone)]
struct ListenerEntry {
    id: u64,
    mode: SubscriptionMode,
    handler: Handler,
    effects: Option<Effects>,
}

#[derive(Clone)]
struct BatchEntry {
    id: u64,
    handler: BatchHandler,
}

struct DispatchJob {
    record: EventRecord,
    status: RecordStatus,
    done: oneshot::Sender<ProjectionResult<bool>>,
}

struct ProjectorInner {
    listeners: Mutex<HashMap<EventKind, Vec<ListenerEntry>>>,
    batched: Mutex<HashMap<String, Vec<BatchEntry>>>,
    queues: Mutex<HashMap<StreamId, SerialQueue<DispatchJob>>>,
    next_id: AtomicU64,
}

/// Unsubscribe token returned by [`Projector::subscribe`].
///
/// Unsubscribing removes the handler synchronously; invocations already in
/// flight run to completion. Dropping the token without calling
/// [`unsubscribe`](Self::unsubscribe) leaves the subscription active.
#[derive(Debug)]
pub struct Subscription {
    projector: Weak<ProjectorInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Removes the handler from the projector.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.projector.upgrade() {
            let mut listeners = inner.listeners.lock().expect("listener map lock poisoned");
            if let Some(entries) = listeners.get_mut(&self.kind) {
                entries.retain(|entry| entry.id != self.id);
                if entries.is_empty() {
                    listeners.remove(&self.kind);
                }
            }
        }
    }
}

/// Unsubscribe token returned by [`Projector::subscribe_batch`].
#[derive(Debug)]
pub struct BatchSubscription {
    projector: Weak<ProjectorInner>,
    batch_key: String,
    id: u64,
}

impl BatchSubscription {
    /// Removes the batch handler from the projector.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.projector.upgrade() {
            let mut batched = inner.batched.lock().expect("batch map lock poisoned");
            if let Some(entries) = batched.get_mut(&self.batch_key) {
                entries.retain(|entry| entry.id != self.id);
                if entries.is_empty() {
                    batched.remove(&self.batch_key);
                }
            }
        }
    }
}

/// In-process fan-out of persisted records to typed subscribers.
///
/// Cheap to clone; clones share the subscription registry and the per-stream
/// queues.
///
/// # Examples
///
/// ```no_run
/// use ledgercore::{Projector, SubscriptionMode, EventKind, RecordStatus};
///
/// # async fn example(record: ledgercore::EventRecord) {
/// let projector = Projector::new();
/// let _sub = projector.subscribe(
///     EventKind::try_new("user:created").unwrap(),
///     SubscriptionMode::On,
///     |record| async move {
///         tracing::info!(stream = %record.stream, "user created");
///         Ok(None)
///     },
/// );
///
/// projector.push(record, RecordStatus::LIVE).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct Projector {
    inner: Arc<ProjectorInner>,
}

impl Projector {
    /// Creates a projector with no subscriptions.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ProjectorInner {
                listeners: Mutex::new(HashMap::new()),
                batched: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes a handler to a kind under the given mode.
    pub fn subscribe<H, Fut>(
        &self,
        kind: EventKind,
        mode: SubscriptionMode,
        handler: H,
    ) -> Subscription
    where
        H: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ProjectionResult<Option<Value>>> + Send + 'static,
    {
        self.subscribe_with_effects(kind, mode, handler, None)
    }

    /// Subscribes a handler with side-effect callbacks.
    pub fn subscribe_with_effects<H, Fut>(
        &self,
        kind: EventKind,
        mode: SubscriptionMode,
        handler: H,
        effects: impl Into<Option<Effects>>,
    ) -> Subscription
    where
        H: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ProjectionResult<Option<Value>>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = ListenerEntry {
            id,
            mode,
            handler: Arc::new(move |record| Box::pin(handler(record)) as HandlerFuture),
            effects: effects.into(),
        };

        self.inner
            .listeners
            .lock()
            .expect("listener map lock poisoned")
            .entry(kind.clone())
            .or_default()
            .push(entry);

        Subscription {
            projector: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Subscribes a handler to whole insert batches published under
    /// `batch_key`. Batched dispatch bypasses per-stream serialization.
    pub fn subscribe_batch<H, Fut>(
        &self,
        batch_key: impl Into<String>,
        handler: H,
    ) -> BatchSubscription
    where
        H: Fn(Vec<EventRecord>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let batch_key = batch_key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = BatchEntry {
            id,
            handler: Arc::new(move |records| Box::pin(handler(records)) as BoxFuture<'static, ()>),
        };

        self.inner
            .batched
            .lock()
            .expect("batch map lock poisoned")
            .entry(batch_key.clone())
            .or_default()
            .push(entry);

        BatchSubscription {
            projector: Arc::downgrade(&self.inner),
            batch_key,
            id,
        }
    }

    /// Dispatches a record to every matching subscriber.
    ///
    /// The record is enqueued on its stream's serial queue; the returned
    /// future resolves `true` once all matching listeners have completed.
    ///
    /// # Errors
    ///
    /// The first handler failure from a subscription without effects, or
    /// [`ProjectionError::QueueClosed`] when the projector was dropped
    /// before the dispatch ran.
    pub async fn push(&self, record: EventRecord, status: RecordStatus) -> ProjectionResult<bool> {
        let id = record.id;
        let (done, receiver) = oneshot::channel();
        let mut job = DispatchJob {
            record,
            status,
            done,
        };

        loop {
            let queue = self.queue_for(&job.record.stream);
            match queue.push(job) {
                Ok(()) => break,
                Err(returned) => {
                    // Lost the race against the drain hook: drop the stale
                    // instance and retry on a fresh one.
                    job = returned;
                    self.release_drained_queue(&job.record.stream);
                }
            }
        }

        receiver
            .await
            .map_err(|_| ProjectionError::QueueClosed { id })?
    }

    /// Invokes every handler registered under `batch_key` with the full
    /// records list, in parallel.
    pub async fn push_many(&self, batch_key: &str, records: Vec<EventRecord>) {
        let handlers: Vec<BatchHandler> = {
            let batched = self.inner.batched.lock().expect("batch map lock poisoned");
            batched
                .get(batch_key)
                .map(|entries| entries.iter().map(|entry| Arc::clone(&entry.handler)).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            return;
        }

        tracing::debug!(batch_key, records = records.len(), handlers = handlers.len(), "dispatching batch");
        join_all(handlers.iter().map(|handler| handler(records.clone()))).await;
    }

    /// Number of streams with a live queue; drained queues are released.
    pub fn active_streams(&self) -> usize {
        self.inner
            .queues
            .lock()
            .expect("queue map lock poisoned")
            .len()
    }

    fn queue_for(&self, stream: &StreamId) -> SerialQueue<DispatchJob> {
        let mut queues = self.inner.queues.lock().expect("queue map lock poisoned");
        queues
            .entry(stream.clone())
            .or_insert_with(|| self.new_queue(stream.clone()))
            .clone()
    }

    /// Removes the stream's queue entry if it has drained. The drain hook
    /// and the push retry path both go through here, and both re-check the
    /// phase so a fresh replacement queue is never evicted.
    fn release_drained_queue_in(inner: &ProjectorInner, stream: &StreamId) {
        let mut queues = inner.queues.lock().expect("queue map lock poisoned");
        if queues.get(stream).is_some_and(SerialQueue::is_drained) {
            queues.remove(stream);
        }
    }

    fn release_drained_queue(&self, stream: &StreamId) {
        Self::release_drained_queue_in(&self.inner, stream);
    }

    fn new_queue(&self, stream: StreamId) -> SerialQueue<DispatchJob> {
        let worker: Worker<DispatchJob> = {
            let inner = Arc::downgrade(&self.inner);
            Arc::new(move |job| {
                let inner = inner.clone();
                Box::pin(async move {
                    match inner.upgrade() {
                        // Projector dropped mid-flight: the sender drops and
                        // the awaiting push resolves with QueueClosed.
                        None => drop(job),
                        Some(inner) => dispatch(&inner, job).await,
                    }
                })
            })
        };

        let on_drained: DrainHook = {
            let inner = Arc::downgrade(&self.inner);
            Arc::new(move || {
                if let Some(inner) = inner.upgrade() {
                    Self::release_drained_queue_in(&inner, &stream);
                }
            })
        };

        SerialQueue::new(worker, on_drained)
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("active_streams", &self.active_streams())
            .finish()
    }
}

/// Runs one queue slot: all listeners for the record's kind, concurrently.
async fn dispatch(inner: &ProjectorInner, job: DispatchJob) {
    let DispatchJob {
        record,
        status,
        done,
    } = job;

    let matching: Vec<ListenerEntry> = {
        let listeners = inner.listeners.lock().expect("listener map lock poisoned");
        listeners
            .get(&record.kind)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.mode.accepts(status))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    };

    tracing::trace!(
        kind = %record.kind,
        stream = %record.stream,
        hydrated = status.hydrated,
        outdated = status.outdated,
        listeners = matching.len(),
        "dispatching record"
    );

    let results = join_all(matching.iter().map(|entry| {
        let handler = Arc::clone(&entry.handler);
        let record = record.clone();
        async move { handler(record).await }
    }))
    .await;

    let mut failure = None;
    for (entry, result) in matching.iter().zip(results) {
        match (result, &entry.effects) {
            (Ok(data), Some(effects)) => effects.success(EffectOutcome {
                data,
                record: record.clone(),
            }),
            (Ok(_), None) => {}
            (Err(error), Some(effects)) => effects.failure(EffectFailure {
                error,
                record: record.clone(),
            }),
            (Err(error), None) => {
                if entry.mode == SubscriptionMode::Once {
                    // Once-handlers are absorbed even without effects; they
                    // must not fail the awaiting push.
                    tracing::warn!(kind = %record.kind, %error, "once handler failed without effects");
                } else if failure.is_none() {
                    failure = Some(error);
                }
            }
        }
    }

    let _ = done.send(match failure {
        None => Ok(true),
        Some(error) => Err(error),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::types::EventId;
    use serde_json::json;
    use std::time::Duration;

    fn kind(s: &str) -> EventKind {
        EventKind::try_new(s).unwrap()
    }

    fn record(stream: &str, kind_name: &str, time: u64) -> EventRecord {
        EventRecord {
            id: EventId::new(),
            stream: StreamId::try_new(stream).unwrap(),
            kind: kind(kind_name),
            data: None,
            meta: None,
            created: Timestamp::new(time, 0),
            recorded: Timestamp::new(time, 0),
        }
    }

    #[test]
    fn mode_filter_matches_the_table() {
        let live = RecordStatus::new(false, false);
        let hydrated = RecordStatus::new(true, false);
        let outdated = RecordStatus::new(false, true);
        let both = RecordStatus::new(true, true);

        assert!(SubscriptionMode::Once.accepts(live));
        assert!(!SubscriptionMode::Once.accepts(hydrated));
        assert!(!SubscriptionMode::Once.accepts(outdated));
        assert!(!SubscriptionMode::Once.accepts(both));

        assert!(SubscriptionMode::On.accepts(live));
        assert!(SubscriptionMode::On.accepts(hydrated));
        assert!(!SubscriptionMode::On.accepts(outdated));
        assert!(!SubscriptionMode::On.accepts(both));

        assert!(SubscriptionMode::All.accepts(live));
        assert!(SubscriptionMode::All.accepts(hydrated));
        assert!(SubscriptionMode::All.accepts(outdated));
        assert!(SubscriptionMode::All.accepts(both));
    }

    #[tokio::test]
    async fn dispatches_to_matching_modes_only() {
        let projector = Projector::new();
        let calls: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        for (label, mode) in [
            ("once", SubscriptionMode::Once),
            ("on", SubscriptionMode::On),
            ("all", SubscriptionMode::All),
        ] {
            let calls = Arc::clone(&calls);
            projector.subscribe(kind("user:created"), mode, move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.lock().unwrap().push(label);
                    Ok(None)
                }
            });
        }

        projector
            .push(record("u1", "user:created", 1), RecordStatus::LIVE)
            .await
            .unwrap();
        {
            let mut seen = calls.lock().unwrap();
            seen.sort_unstable();
            assert_eq!(*seen, vec!["all", "on", "once"]);
            seen.clear();
        }

        projector
            .push(record("u1", "user:created", 2), RecordStatus::new(true, false))
            .await
            .unwrap();
        {
            let mut seen = calls.lock().unwrap();
            seen.sort_unstable();
            assert_eq!(*seen, vec!["all", "on"]);
            seen.clear();
        }

        projector
            .push(record("u1", "user:created", 3), RecordStatus::new(true, true))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["all"]);
    }

    #[tokio::test]
    async fn per_stream_dispatch_is_fifo() {
        let projector = Projector::new();
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let seen = Arc::clone(&seen);
            projector.subscribe(kind("tick"), SubscriptionMode::All, move |record| {
                let seen = Arc::clone(&seen);
                async move {
                    // Sleep inversely to arrival order; FIFO must still hold.
                    let delay = 10u64.saturating_sub(record.created.time());
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    seen.lock().unwrap().push(record.created.time());
                    Ok(None)
                }
            });
        }

        let pushes: Vec<_> = (1..=5)
            .map(|t| projector.push(record("s", "tick", t), RecordStatus::LIVE))
            .collect();
        for result in join_all(pushes).await {
            assert!(result.unwrap());
        }

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn drained_queues_are_released_and_recreated() {
        let projector = Projector::new();
        projector.subscribe(kind("tick"), SubscriptionMode::All, |_| async { Ok(None) });

        projector
            .push(record("s", "tick", 1), RecordStatus::LIVE)
            .await
            .unwrap();

        // The drain hook runs right after dispatch completes.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(projector.active_streams(), 0);

        projector
            .push(record("s", "tick", 2), RecordStatus::LIVE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn handler_failure_without_effects_rejects_the_push() {
        let projector = Projector::new();
        projector.subscribe(kind("tick"), SubscriptionMode::On, |record| async move {
            Err(ProjectionError::HandlerFailed {
                id: record.id,
                reason: "read model down".to_string(),
            })
        });

        let err = projector
            .push(record("s", "tick", 1), RecordStatus::LIVE)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::HandlerFailed { .. }));
    }

    #[tokio::test]
    async fn once_effects_receive_success_and_failure() {
        let projector = Projector::new();
        let outcomes: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let effects = {
            let outcomes = Arc::clone(&outcomes);
            let failures = Arc::clone(&outcomes);
            Effects::new()
                .on_success(move |outcome| {
                    outcomes
                        .lock()
                        .unwrap()
                        .push(format!("ok:{}", outcome.data.unwrap()));
                })
                .on_error(move |failure| {
                    failures.lock().unwrap().push(format!("err:{}", failure.error));
                })
        };

        projector.subscribe_with_effects(
            kind("mail:send"),
            SubscriptionMode::Once,
            |record| async move {
                if record.stream.as_ref() == "bad" {
                    Err(ProjectionError::HandlerFailed {
                        id: record.id,
                        reason: "smtp refused".to_string(),
                    })
                } else {
                    Ok(Some(json!("sent")))
                }
            },
            effects,
        );

        projector
            .push(record("good", "mail:send", 1), RecordStatus::LIVE)
            .await
            .unwrap();
        // The failing handler is absorbed by effects: push still resolves.
        projector
            .push(record("bad", "mail:send", 2), RecordStatus::LIVE)
            .await
            .unwrap();

        let seen = outcomes.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("ok:"));
        assert!(seen[1].starts_with("err:"));
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_handler() {
        let projector = Projector::new();
        let calls = Arc::new(Mutex::new(0u32));

        let subscription = {
            let calls = Arc::clone(&calls);
            projector.subscribe(kind("tick"), SubscriptionMode::All, move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    *calls.lock().unwrap() += 1;
                    Ok(None)
                }
            })
        };

        projector
            .push(record("s", "tick", 1), RecordStatus::LIVE)
            .await
            .unwrap();
        subscription.unsubscribe();
        projector
            .push(record("s", "tick", 2), RecordStatus::LIVE)
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn batched_listeners_receive_the_full_batch() {
        let projector = Projector::new();
        let batches: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let batches = Arc::clone(&batches);
            projector.subscribe_batch("imports", move |records| {
                let batches = Arc::clone(&batches);
                async move {
                    batches.lock().unwrap().push(records.len());
                }
            });
        }

        let records = vec![record("a", "tick", 1), record("b", "tick", 2)];
        projector.push_many("imports", records).await;
        projector.push_many("other-key", vec![record("c", "tick", 3)]).await;

        assert_eq!(*batches.lock().unwrap(), vec![2]);
    }
}
