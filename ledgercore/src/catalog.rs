//! Event type definitions and the catalog registry.
//!
//! An [`EventType`] pairs a kind with optional data and meta schemas and
//! acts as the record factory for that kind. The [`Catalog`] maps kinds to
//! their definitions; it is populated at startup and shared immutably by
//! every concurrent store operation afterwards.

use std::collections::HashMap;

use crate::clock::HlcClock;
use crate::errors::{StoreError, StoreResult};
use crate::record::{EventInput, EventRecord};
use crate::schema::{render_issues, Issue, SchemaRef, Segment, ISSUE_MARKER};
use crate::types::{EventId, EventKind, StreamId};

/// An immutable event type definition.
///
/// # Examples
///
/// ```
/// use ledgercore::{EventType, EventKind};
/// use ledgercore::schema::{object, string};
///
/// let definition = EventType::new(EventKind::try_new("user:created").unwrap())
///     .with_data_schema(object([("email", string())]));
/// ```
#[derive(Clone)]
pub struct EventType {
    kind: EventKind,
    data_schema: Option<SchemaRef>,
    meta_schema: Option<SchemaRef>,
}

impl EventType {
    /// Creates a definition with no payload schemas: records of this kind
    /// carry `data: None` and `meta: None`.
    pub const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            data_schema: None,
            meta_schema: None,
        }
    }

    /// Attaches the data payload schema.
    #[must_use]
    pub fn with_data_schema(mut self, schema: SchemaRef) -> Self {
        self.data_schema = Some(schema);
        self
    }

    /// Attaches the meta payload schema.
    #[must_use]
    pub fn with_meta_schema(mut self, schema: SchemaRef) -> Self {
        self.meta_schema = Some(schema);
        self
    }

    /// The kind this definition registers under.
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Creates a record of this type from an input.
    ///
    /// Assigns a fresh [`EventId`], the input's stream (or a generated one),
    /// and stamps `created = recorded` from the clock. The record is
    /// validated before being returned.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] carrying the rejected record and its
    /// issues, or [`StoreError::Clock`] when the clock refuses to produce a
    /// timestamp.
    pub fn record(&self, input: EventInput, clock: &HlcClock) -> StoreResult<EventRecord> {
        let created = clock.now()?;
        let record = EventRecord {
            id: EventId::new(),
            stream: input.stream.unwrap_or_else(StreamId::generate),
            kind: self.kind.clone(),
            data: input.data,
            meta: input.meta,
            created,
            recorded: created,
        };

        match self.validate(&record) {
            Ok(()) => Ok(record),
            Err(issues) => Err(StoreError::Validation {
                record: Box::new(record),
                issues,
            }),
        }
    }

    /// Validates a record against this definition.
    ///
    /// # Errors
    ///
    /// The rendered issue lines, sorted by path depth ascending:
    ///
    /// - a kind mismatch yields the single issue
    ///   `"record does not belong to this type"`;
    /// - a non-null `data` payload requires a data schema and must parse
    ///   against it, `meta` likewise.
    pub fn validate(&self, record: &EventRecord) -> Result<(), Vec<String>> {
        if record.kind != self.kind {
            return Err(vec![format!(
                "{ISSUE_MARKER} record does not belong to this type"
            )]);
        }

        let mut issues = Vec::new();
        collect_payload_issues(&mut issues, "data", record.data.as_ref(), self.data_schema.as_ref());
        collect_payload_issues(&mut issues, "meta", record.meta.as_ref(), self.meta_schema.as_ref());

        if issues.is_empty() {
            Ok(())
        } else {
            Err(render_issues(&issues))
        }
    }
}

fn collect_payload_issues(
    issues: &mut Vec<Issue>,
    field: &str,
    payload: Option<&serde_json::Value>,
    schema: Option<&SchemaRef>,
) {
    match (payload, schema) {
        (Some(value), Some(schema)) => {
            if let Err(payload_issues) = schema.parse(value) {
                issues.extend(
                    payload_issues
                        .into_iter()
                        .map(|issue| issue.under(Segment::Key(field.to_string()))),
                );
            }
        }
        (Some(_), None) => {
            issues.push(
                Issue::new("payload is not accepted by this event type")
                    .under(Segment::Key(field.to_string())),
            );
        }
        (None, _) => {}
    }
}

/// Registry of event type definitions, keyed by kind.
///
/// Populated once at startup; the store shares it immutably afterwards.
/// Registering a kind twice replaces the earlier definition.
#[derive(Clone, Default)]
pub struct Catalog {
    types: HashMap<EventKind, EventType>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under its kind.
    pub fn register(&mut self, event_type: EventType) -> &mut Self {
        self.types.insert(event_type.kind.clone(), event_type);
        self
    }

    /// Looks up the definition for a kind.
    pub fn get(&self, kind: &EventKind) -> Option<&EventType> {
        self.types.get(kind)
    }

    /// Whether a definition is registered for the kind.
    pub fn has(&self, kind: &EventKind) -> bool {
        self.types.contains_key(kind)
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog has no definitions.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Validates a record against its registered definition.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingEvent`] when the record's kind is unknown,
    /// [`StoreError::Validation`] when the payloads do not conform.
    pub fn validate(&self, record: &EventRecord) -> StoreResult<()> {
        let event_type = self
            .get(&record.kind)
            .ok_or_else(|| StoreError::MissingEvent(record.kind.clone()))?;

        event_type
            .validate(record)
            .map_err(|issues| StoreError::Validation {
                record: Box::new(record.clone()),
                issues,
            })
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&EventKind> = self.types.keys().collect();
        kinds.sort();
        f.debug_struct("Catalog").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{object, string};
    use serde_json::json;

    fn kind(s: &str) -> EventKind {
        EventKind::try_new(s).unwrap()
    }

    fn user_created() -> EventType {
        EventType::new(kind("user:created"))
            .with_data_schema(object([
                ("name", object([("given", string()), ("family", string())])),
                ("email", string()),
            ]))
            .with_meta_schema(object([("auditor", string())]))
    }

    #[test]
    fn record_factory_assigns_identity_and_timestamps() {
        let clock = HlcClock::default();
        let record = user_created()
            .record(
                EventInput::new(kind("user:created"))
                    .with_data(json!({
                        "name": { "given": "Ada", "family": "Lovelace" },
                        "email": "ada@example.com",
                    }))
                    .with_meta(json!({ "auditor": "ops" })),
                &clock,
            )
            .unwrap();

        assert_eq!(record.kind, kind("user:created"));
        assert_eq!(record.created, record.recorded);
        // No stream in the input: a fresh one is generated.
        assert!(!record.stream.as_ref().is_empty());
    }

    #[test]
    fn record_factory_rejects_invalid_payloads() {
        let clock = HlcClock::default();
        let err = user_created()
            .record(
                EventInput::new(kind("user:created")).with_data(json!({ "email": 7 })),
                &clock,
            )
            .unwrap_err();

        match err {
            StoreError::Validation { issues, .. } => {
                assert!(issues.iter().any(|i| i.contains("data.email")));
                assert!(issues.iter().any(|i| i.contains("data.name")));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_foreign_kind() {
        let clock = HlcClock::default();
        let other = EventType::new(kind("user:removed"));
        let record = other
            .record(EventInput::new(kind("user:removed")), &clock)
            .unwrap();

        let issues = user_created().validate(&record).unwrap_err();
        assert_eq!(issues, vec!["✖ record does not belong to this type"]);
    }

    #[test]
    fn validate_rejects_payload_without_schema() {
        let clock = HlcClock::default();
        let bare = EventType::new(kind("ping"));
        let mut record = bare.record(EventInput::new(kind("ping")), &clock).unwrap();
        record.data = Some(json!({ "stray": true }));

        let issues = bare.validate(&record).unwrap_err();
        assert_eq!(
            issues,
            vec!["✖ payload is not accepted by this event type at data"]
        );
    }

    #[test]
    fn null_payload_is_accepted_regardless_of_schema() {
        let clock = HlcClock::default();
        let record = user_created()
            .record(EventInput::new(kind("user:created")), &clock)
            .unwrap();
        assert!(record.data.is_none());
        assert!(user_created().validate(&record).is_ok());
    }

    #[test]
    fn catalog_lookup_and_membership() {
        let mut catalog = Catalog::new();
        catalog.register(user_created());

        assert!(catalog.has(&kind("user:created")));
        assert!(!catalog.has(&kind("user:removed")));
        assert!(catalog.get(&kind("user:created")).is_some());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn catalog_validate_reports_missing_kind() {
        let catalog = Catalog::new();
        let clock = HlcClock::default();
        let record = EventType::new(kind("ghost"))
            .record(EventInput::new(kind("ghost")), &clock)
            .unwrap();

        let err = catalog.validate(&record).unwrap_err();
        assert!(matches!(err, StoreError::MissingEvent(k) if k == kind("ghost")));
    }

    #[test]
    fn reregistering_a_kind_replaces_the_definition() {
        let mut catalog = Catalog::new();
        catalog.register(EventType::new(kind("user:created")));
        catalog.register(user_created());

        let clock = HlcClock::default();
        let record = catalog
            .get(&kind("user:created"))
            .unwrap()
            .record(EventInput::new(kind("user:created")), &clock)
            .unwrap();
        // The replacing definition carries schemas; a stray payload on the
        // original definition would have passed.
        assert!(catalog.validate(&record).is_ok());
    }
}
