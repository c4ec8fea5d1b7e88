//! # LedgerCore
//!
//! An event sourcing engine built around an **append-only ledger** of typed
//! records grouped by streams, with hybrid-logical-clock ordering, secondary
//! relation indexes, cursor-resumable snapshots, and an in-process projector
//! with replay-aware subscription modes.
//!
//! ## What LedgerCore provides
//!
//! - **🕐 HLC timestamps**: every record carries a `(wall_ms, logical)`
//!   timestamp whose string form sorts lexicographically, mergeable across
//!   nodes without coordination
//! - **📚 Typed events**: a catalog of event type definitions with pluggable
//!   data/meta schema validation
//! - **⚛️ Atomic batches**: multi-event writes succeed or roll back as one
//! - **🔍 Relations**: `(key, stream)` tags for multi-stream fan-in reads
//! - **📸 Snapshots**: reducer state cached at a cursor, so reductions fold
//!   only what happened since
//! - **📣 Projections**: per-stream serialized fan-out with `once` / `on` /
//!   `all` replay semantics
//! - **🔌 Pluggable storage**: one adapter contract, any backend
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ledgercore::{
//!     Catalog, EventInput, EventKind, EventStore, EventType, InsertSettings,
//!     Projector, SubscriptionMode,
//! };
//! use ledgercore::schema::{object, string};
//! use ledgercore_memory::MemoryAdapter;
//!
//! #[tokio::main]
//! async fn main() -> ledgercore::StoreResult<()> {
//!     // 1. Describe the events the ledger accepts.
//!     let mut catalog = Catalog::new();
//!     catalog.register(
//!         EventType::new(EventKind::try_new("user:created").unwrap())
//!             .with_data_schema(object([("email", string())])),
//!     );
//!
//!     // 2. Subscribe read models and side effects.
//!     let projector = Projector::new();
//!     projector.subscribe(
//!         EventKind::try_new("user:created").unwrap(),
//!         SubscriptionMode::On,
//!         |record| async move {
//!             println!("user created on {}", record.stream);
//!             Ok(None)
//!         },
//!     );
//!
//!     // 3. Wire the store and append.
//!     let store = EventStore::builder(catalog, MemoryAdapter::new().into_adapter())
//!         .projector(projector)
//!         .build();
//!
//!     let record = store.make_event(
//!         EventInput::new(EventKind::try_new("user:created").unwrap())
//!             .with_data(serde_json::json!({ "email": "ada@example.com" })),
//!     )?;
//!     store.push_event(record, InsertSettings::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! All I/O-bearing operations return futures; catalog lookups, clock ticks,
//! and queue pushes are synchronous. Two isolation guarantees hold: records
//! sharing a stream are projected strictly FIFO, and all listeners of one
//! record run concurrently within one queue slot. See the [`projector`] and
//! [`queue`] modules.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod aggregate;
pub mod catalog;
pub mod clock;
pub mod errors;
pub mod projector;
pub mod publisher;
pub mod queue;
pub mod record;
pub mod reducer;
pub mod schema;
pub mod store;
pub mod testing;
pub mod types;

pub use adapter::{
    Adapter, Direction, EventsProvider, ReadOptions, Relation, RelationOp, RelationsProvider,
    Snapshot, SnapshotsProvider, DEFAULT_BATCH_SIZE,
};
pub use aggregate::{Aggregate, AggregateReducer, Root};
pub use catalog::{Catalog, EventType};
pub use clock::{HlcClock, HlcConfig, Timestamp, LOGICAL_WIDTH, MAX_WALL_TIME};
pub use errors::{
    AdapterError, AdapterResult, ClockError, ClockResult, ProjectionError, ProjectionResult,
    StoreError, StoreResult,
};
pub use projector::{
    BatchHandler, BatchSubscription, EffectFailure, EffectOutcome, Effects, Handler,
    HandlerFuture, Projector, Subscription, SubscriptionMode,
};
pub use publisher::{Publisher, PublisherSubscription};
pub use queue::SerialQueue;
pub use record::{EventInput, EventRecord, EventStatus, RecordStatus};
pub use reducer::{FoldReducer, Reducer};
pub use schema::{Schema, SchemaRef};
pub use store::{
    ErrorHook, EventStore, EventStoreBuilder, Hooks, InsertSettings, InsertedHook, ReduceTarget,
    SnapshotPolicy, StoreConfig,
};
pub use types::{EventId, EventKind, ReducerName, RelationKey, StreamId};
