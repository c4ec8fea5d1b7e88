//! Collecting subscriber for projection assertions.

use std::sync::{Arc, Mutex};

use crate::projector::{Projector, Subscription, SubscriptionMode};
use crate::record::EventRecord;
use crate::types::EventKind;

/// A subscriber that accumulates every record it is dispatched.
///
/// Attach it to a projector under any kind and mode, run the flow under
/// test, then assert on [`records`](Self::records). Clones share storage, so
/// a clone can be kept for assertions while the collector subscribes.
///
/// # Examples
///
/// ```
/// use ledgercore::testing::{RecordBuilder, RecordCollector};
/// use ledgercore::{EventKind, Projector, RecordStatus, SubscriptionMode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let projector = Projector::new();
/// let collector = RecordCollector::new();
/// collector.attach(
///     &projector,
///     EventKind::try_new("user:created").unwrap(),
///     SubscriptionMode::On,
/// );
///
/// let record = RecordBuilder::new("user:created").stream("u1").build();
/// projector.push(record, RecordStatus::LIVE).await.unwrap();
///
/// assert_eq!(collector.len(), 1);
/// assert_eq!(collector.records()[0].stream.as_ref(), "u1");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordCollector {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl RecordCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes this collector to a kind on the projector.
    ///
    /// The returned token unsubscribes as usual; the collector keeps its
    /// records either way.
    pub fn attach(
        &self,
        projector: &Projector,
        kind: EventKind,
        mode: SubscriptionMode,
    ) -> Subscription {
        let records = Arc::clone(&self.records);
        projector.subscribe(kind, mode, move |record| {
            let records = Arc::clone(&records);
            async move {
                records
                    .lock()
                    .expect("collector storage lock poisoned")
                    .push(record);
                Ok(None)
            }
        })
    }

    /// A copy of everything collected so far, in dispatch order.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .expect("collector storage lock poisoned")
            .clone()
    }

    /// Number of records collected.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("collector storage lock poisoned")
            .len()
    }

    /// Whether nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything collected so far.
    pub fn clear(&self) {
        self.records
            .lock()
            .expect("collector storage lock poisoned")
            .clear();
    }
}
