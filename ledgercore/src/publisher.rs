//! Single-handler publication channels.
//!
//! A [`Publisher`] is the single-consumer variant of the [`Projector`]: at
//! most one handler per kind. Where the projector fans one record out to a
//! set of listeners, a publisher routes it to exactly one owner — the shape
//! to reach for when a kind has a designated downstream (a command handler,
//! an outbox relay) and a second registration is a wiring bug, surfaced as
//! [`ProjectionError::DuplicateHandler`] instead of silently fanning out.
//!
//! Dispatch semantics are the projector's: per-stream FIFO, replay-aware
//! modes, and the same effects contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::errors::{ProjectionError, ProjectionResult};
use crate::projector::{Effects, Projector, Subscription, SubscriptionMode};
use crate::record::{EventRecord, RecordStatus};
use crate::types::EventKind;

struct PublisherInner {
    projector: Projector,
    claimed: Mutex<HashMap<EventKind, ()>>,
}

/// Unsubscribe token returned by [`Publisher::subscribe`].
///
/// Unsubscribing releases the kind: a later [`Publisher::subscribe`] for it
/// succeeds again.
#[derive(Debug)]
pub struct PublisherSubscription {
    publisher: Weak<PublisherInner>,
    kind: EventKind,
    inner: Subscription,
}

impl PublisherSubscription {
    /// Removes the handler and releases the kind.
    pub fn unsubscribe(self) {
        if let Some(publisher) = self.publisher.upgrade() {
            publisher
                .claimed
                .lock()
                .expect("publisher registry lock poisoned")
                .remove(&self.kind);
        }
        self.inner.unsubscribe();
    }
}

/// A projector restricted to one handler per kind.
///
/// # Examples
///
/// ```
/// use ledgercore::{EventKind, Publisher, SubscriptionMode};
///
/// let publisher = Publisher::new();
/// let kind = EventKind::try_new("order:placed").unwrap();
///
/// let owner = publisher
///     .subscribe(kind.clone(), SubscriptionMode::Once, |_record| async { Ok(None) })
///     .unwrap();
///
/// // The kind is claimed; a second handler is rejected.
/// assert!(publisher
///     .subscribe(kind.clone(), SubscriptionMode::Once, |_record| async { Ok(None) })
///     .is_err());
///
/// owner.unsubscribe();
/// assert!(publisher
///     .subscribe(kind, SubscriptionMode::Once, |_record| async { Ok(None) })
///     .is_ok());
/// ```
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl Publisher {
    /// Creates a publisher with no channels claimed.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                projector: Projector::new(),
                claimed: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Claims the kind for a handler.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::DuplicateHandler`] when the kind already has one.
    pub fn subscribe<H, Fut>(
        &self,
        kind: EventKind,
        mode: SubscriptionMode,
        handler: H,
    ) -> ProjectionResult<PublisherSubscription>
    where
        H: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ProjectionResult<Option<Value>>> + Send + 'static,
    {
        self.subscribe_with_effects(kind, mode, handler, None)
    }

    /// Claims the kind for a handler with side-effect callbacks.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::DuplicateHandler`] when the kind already has one.
    pub fn subscribe_with_effects<H, Fut>(
        &self,
        kind: EventKind,
        mode: SubscriptionMode,
        handler: H,
        effects: impl Into<Option<Effects>>,
    ) -> ProjectionResult<PublisherSubscription>
    where
        H: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ProjectionResult<Option<Value>>> + Send + 'static,
    {
        {
            let mut claimed = self
                .inner
                .claimed
                .lock()
                .expect("publisher registry lock poisoned");
            if claimed.contains_key(&kind) {
                return Err(ProjectionError::DuplicateHandler { kind });
            }
            claimed.insert(kind.clone(), ());
        }

        let inner = self
            .inner
            .projector
            .subscribe_with_effects(kind.clone(), mode, handler, effects);
        Ok(PublisherSubscription {
            publisher: Arc::downgrade(&self.inner),
            kind,
            inner,
        })
    }

    /// Routes a record to the kind's handler, if one is claimed.
    ///
    /// Per-stream FIFO and the mode filter apply exactly as on
    /// [`Projector::push`].
    ///
    /// # Errors
    ///
    /// As for [`Projector::push`].
    pub async fn push(&self, record: EventRecord, status: RecordStatus) -> ProjectionResult<bool> {
        self.inner.projector.push(record, status).await
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let claimed = self
            .inner
            .claimed
            .lock()
            .expect("publisher registry lock poisoned");
        let mut kinds: Vec<&EventKind> = claimed.keys().collect();
        kinds.sort();
        f.debug_struct("Publisher").field("claimed", &kinds).finish()
    }
}
