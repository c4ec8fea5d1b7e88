//! Fluent builders for test records.

use std::sync::OnceLock;

use serde_json::Value;

use crate::clock::{HlcClock, Timestamp};
use crate::record::EventRecord;
use crate::types::{EventId, EventKind, StreamId};

/// Shared clock stamping builder-made records, so defaults stay monotonic
/// within one test process.
fn test_clock() -> &'static HlcClock {
    static CLOCK: OnceLock<HlcClock> = OnceLock::new();
    CLOCK.get_or_init(HlcClock::default)
}

/// Builds an [`EventRecord`] directly, bypassing the catalog's factory.
///
/// Defaults: a fresh id, a generated stream, no payloads, and `created` =
/// `recorded` stamped from a process-wide clock. Anything can be pinned,
/// including timestamps that would never come out of a live clock — which is
/// the point: outdated-classification and replay tests need authored
/// histories.
///
/// # Examples
///
/// ```
/// use ledgercore::testing::RecordBuilder;
/// use serde_json::json;
///
/// let record = RecordBuilder::new("user:created")
///     .stream("u1")
///     .data(json!({ "email": "a@x" }))
///     .created_ms(100)
///     .build();
///
/// assert_eq!(record.stream.as_ref(), "u1");
/// assert_eq!(record.created.time(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    kind: EventKind,
    id: Option<EventId>,
    stream: Option<StreamId>,
    data: Option<Value>,
    meta: Option<Value>,
    created: Option<Timestamp>,
    recorded: Option<Timestamp>,
}

impl RecordBuilder {
    /// Starts a builder for the given kind.
    ///
    /// # Panics
    ///
    /// When `kind` is not a valid [`EventKind`].
    pub fn new(kind: impl AsRef<str>) -> Self {
        Self {
            kind: EventKind::try_new(kind.as_ref()).expect("valid event kind"),
            id: None,
            stream: None,
            data: None,
            meta: None,
            created: None,
            recorded: None,
        }
    }

    /// Pins the record id.
    #[must_use]
    pub fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the stream.
    ///
    /// # Panics
    ///
    /// When `stream` is not a valid [`StreamId`].
    #[must_use]
    pub fn stream(mut self, stream: impl AsRef<str>) -> Self {
        self.stream = Some(StreamId::try_new(stream.as_ref()).expect("valid stream id"));
        self
    }

    /// Attaches a data payload.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a meta payload.
    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Pins `created` to a wall time with logical `0`.
    #[must_use]
    pub const fn created_ms(mut self, wall_ms: u64) -> Self {
        self.created = Some(Timestamp::new(wall_ms, 0));
        self
    }

    /// Pins `created`.
    #[must_use]
    pub const fn created(mut self, created: Timestamp) -> Self {
        self.created = Some(created);
        self
    }

    /// Pins `recorded`; defaults to `created` when unset.
    #[must_use]
    pub const fn recorded(mut self, recorded: Timestamp) -> Self {
        self.recorded = Some(recorded);
        self
    }

    /// Builds the record.
    pub fn build(self) -> EventRecord {
        let created = self
            .created
            .unwrap_or_else(|| test_clock().now().expect("test clock tick"));
        EventRecord {
            id: self.id.unwrap_or_default(),
            stream: self.stream.unwrap_or_else(StreamId::generate),
            kind: self.kind,
            data: self.data,
            meta: self.meta,
            created,
            recorded: self.recorded.unwrap_or(created),
        }
    }
}
