//! Test support: record builders and projection collectors.
//!
//! These utilities are part of the public API so adapter implementations and
//! downstream applications can drive the engine in their own test suites —
//! building records without a catalog round-trip and asserting on what a
//! projector actually dispatched.
//!
//! Constructors in this module `expect` on invalid input instead of
//! returning results; test data is authored, not parsed.

mod builders;
mod collector;

pub use builders::RecordBuilder;
pub use collector::RecordCollector;
