//! Event records and their construction inputs.
//!
//! An [`EventRecord`] is the unit of persistence: an immutable, typed fact
//! appended to a stream. Records are produced by the catalog's record
//! factory (see [`EventType::record`](crate::EventType::record)) and never
//! mutated after insertion.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Timestamp;
use crate::types::{EventId, EventKind, StreamId};

/// A persisted domain event.
///
/// # Invariants
///
/// - `id` is unique across the ledger.
/// - `created` is assigned once by the originating node's clock and never
///   changes; `(stream, kind, created)` ordering is what classifies a record
///   as outdated relative to its successors.
/// - `recorded` is assigned by the node that wrote the record into *its*
///   ledger: it equals `created` on the originating node and may differ on a
///   replica that received the record later.
/// - `data`/`meta` are `None` exactly when the event type defines no
///   corresponding schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Globally unique identifier.
    pub id: EventId,
    /// The stream this record belongs to.
    pub stream: StreamId,
    /// The registered event type this record was created from.
    pub kind: EventKind,
    /// Structured payload, validated by the type's data schema.
    pub data: Option<Value>,
    /// Structured metadata, validated by the type's meta schema.
    pub meta: Option<Value>,
    /// HLC timestamp assigned at record creation. Immutable.
    pub created: Timestamp,
    /// HLC timestamp assigned when the record was written into this ledger.
    pub recorded: Timestamp,
}

/// Input to the record factory.
///
/// Names the event type to instantiate and optionally pins the stream and
/// payloads. A missing stream means the record opens a fresh timeline.
///
/// # Examples
///
/// ```
/// use ledgercore::{EventInput, EventKind, StreamId};
/// use serde_json::json;
///
/// let input = EventInput::new(EventKind::try_new("user:created").unwrap())
///     .with_stream(StreamId::try_new("u1").unwrap())
///     .with_data(json!({ "email": "a@x" }));
/// ```
#[derive(Debug, Clone)]
pub struct EventInput {
    /// The event type to instantiate.
    pub kind: EventKind,
    /// Target stream; generated when absent.
    pub stream: Option<StreamId>,
    /// Data payload.
    pub data: Option<Value>,
    /// Meta payload.
    pub meta: Option<Value>,
}

impl EventInput {
    /// Creates an input for the given event kind with no stream or payloads.
    pub const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            stream: None,
            data: None,
            meta: None,
        }
    }

    /// Pins the target stream.
    #[must_use]
    pub fn with_stream(mut self, stream: StreamId) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Attaches a data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a meta payload.
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Replay classification attached to a record at projection time.
///
/// The projector's subscription modes filter on this pair; see the mode
/// table on [`SubscriptionMode`](crate::SubscriptionMode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStatus {
    /// The record is being reprocessed (replay or sync) rather than seen for
    /// the first time.
    pub hydrated: bool,
    /// A record with the same `(stream, kind)` and a later `created` already
    /// exists in the ledger.
    pub outdated: bool,
}

impl RecordStatus {
    /// Status of a record dispatched right after its first local insert.
    pub const LIVE: Self = Self {
        hydrated: false,
        outdated: false,
    };

    /// Creates a status.
    pub const fn new(hydrated: bool, outdated: bool) -> Self {
        Self { hydrated, outdated }
    }
}

/// Result of probing the ledger for a (possibly foreign) record.
///
/// This is the engine's replication primitive: `exists` means the record is
/// already in the ledger (and `outdated` is set as a sentinel so callers
/// treat it as already seen); otherwise `outdated` reports whether a
/// same-`(stream, kind)` record with a later `created` is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStatus {
    /// The record id is present in the ledger.
    pub exists: bool,
    /// The record predates another persisted record of its `(stream, kind)`.
    pub outdated: bool,
}
