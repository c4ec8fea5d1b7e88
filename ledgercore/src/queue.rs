//! Single-consumer serial work queues.
//!
//! A [`SerialQueue`] processes its messages strictly FIFO with at most one
//! worker invocation in flight. The projector keeps one queue per stream so
//! that records sharing a stream are handled in order while distinct streams
//! dispatch in parallel.
//!
//! A queue is born idle, turns working on its first push, and becomes
//! drained once its backlog empties; drained is terminal for the instance
//! and fires the drain hook so the owner can release it from its per-key
//! map. Pushing into a drained queue hands the message back to the caller,
//! who allocates a fresh instance.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

/// Work function driving a queue; invoked once per message, serially.
pub type Worker<M> = Arc<dyn Fn(M) -> BoxFuture<'static, ()> + Send + Sync>;

/// Hook invoked when a queue drains (backlog empty, nothing in flight).
pub type DrainHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Working,
    Drained,
}

struct QueueState<M> {
    pending: VecDeque<M>,
    phase: Phase,
}

struct QueueInner<M> {
    state: Mutex<QueueState<M>>,
    worker: Worker<M>,
    on_drained: DrainHook,
}

/// A per-key FIFO queue with a single consumer task.
///
/// Guarantees:
///
/// - strictly one worker invocation in flight per queue;
/// - FIFO among messages pushed onto the same queue;
/// - the drain hook fires exactly once, after the last worker invocation
///   completes and the backlog is empty.
pub struct SerialQueue<M: Send + 'static> {
    inner: Arc<QueueInner<M>>,
}

impl<M: Send + 'static> Clone for SerialQueue<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + 'static> SerialQueue<M> {
    /// Creates an idle queue driven by `worker`, with `on_drained` fired at
    /// end of life.
    pub fn new(worker: Worker<M>, on_drained: DrainHook) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    phase: Phase::Idle,
                }),
                worker,
                on_drained,
            }),
        }
    }

    /// Enqueues a message; starts the consumer task if the queue was idle.
    ///
    /// # Errors
    ///
    /// Hands the message back when the queue has already drained; the caller
    /// must allocate a fresh instance.
    pub fn push(&self, message: M) -> Result<(), M> {
        let mut state = self.inner.state.lock().expect("queue state lock poisoned");
        match state.phase {
            Phase::Drained => Err(message),
            Phase::Working => {
                state.pending.push_back(message);
                Ok(())
            }
            Phase::Idle => {
                state.pending.push_back(message);
                state.phase = Phase::Working;
                drop(state);
                self.spawn_consumer();
                Ok(())
            }
        }
    }

    /// Drops pending messages: all of them, or only those matching the
    /// predicate. The message currently in flight is unaffected.
    pub fn flush(&self, predicate: Option<&dyn Fn(&M) -> bool>) {
        let mut state = self.inner.state.lock().expect("queue state lock poisoned");
        match predicate {
            None => state.pending.clear(),
            Some(matches) => state.pending.retain(|message| !matches(message)),
        }
    }

    /// Number of messages waiting (excludes the one in flight).
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("queue state lock poisoned")
            .pending
            .len()
    }

    /// Whether the backlog is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this instance has reached its terminal drained phase.
    pub fn is_drained(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("queue state lock poisoned")
            .phase
            == Phase::Drained
    }

    fn spawn_consumer(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                // Pop and the drained transition happen under one lock so a
                // concurrent push either lands before the pop or observes
                // the drained phase and retries on a fresh instance.
                let next = {
                    let mut state = inner.state.lock().expect("queue state lock poisoned");
                    match state.pending.pop_front() {
                        Some(message) => Some(message),
                        None => {
                            state.phase = Phase::Drained;
                            None
                        }
                    }
                };

                match next {
                    Some(message) => (inner.worker)(message).await,
                    None => {
                        (inner.on_drained)();
                        break;
                    }
                }
            }
        });
    }
}

impl<M: Send + 'static> std::fmt::Debug for SerialQueue<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().expect("queue state lock poisoned");
        f.debug_struct("SerialQueue")
            .field("pending", &state.pending.len())
            .field("phase", &state.phase)
            .finish()
    }
}
