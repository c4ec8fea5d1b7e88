//! Hybrid logical clock (HLC) timestamping.
//!
//! Every record in the ledger is stamped with a [`Timestamp`] combining wall
//! clock milliseconds with a logical counter. The pair is monotonic on one
//! node even when the wall clock stalls or steps backward, and merging
//! foreign timestamps through [`HlcClock::update`] keeps causally related
//! records ordered across nodes without coordination.
//!
//! # Wire format
//!
//! A timestamp serializes as `"{wall_ms}-{logical:05}"`. The logical counter
//! is zero-padded to a fixed five digits so that lexicographic ordering of
//! the strings equals numeric ordering of the pairs; adapters can therefore
//! index and range-scan the string column directly.
//!
//! # Examples
//!
//! ```
//! use ledgercore::{HlcClock, HlcConfig, Timestamp};
//!
//! let clock = HlcClock::new(HlcConfig::default());
//! let a = clock.now().unwrap();
//! let b = clock.now().unwrap();
//! assert!(b > a);
//! assert!(b.to_string() > a.to_string());
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{ClockError, ClockResult};

/// Width of the zero-padded logical component in the wire format.
pub const LOGICAL_WIDTH: usize = 5;

/// Largest wall time the clock will produce, in milliseconds.
///
/// Wall times are kept below 2^53 so they stay exactly representable as
/// IEEE-754 doubles; JSON consumers of the ledger can round-trip cursors
/// without precision loss. [`HlcConfig::time_upper_bound`] may lower this
/// bound, never raise it.
pub const MAX_WALL_TIME: u64 = (1 << 53) - 1;

/// A hybrid logical timestamp: wall clock milliseconds plus a logical
/// disambiguator.
///
/// Ordering is lexicographic over `(time, logical)`, and the string form
/// preserves that ordering (see the module docs for the wire format).
/// Timestamps are produced by an [`HlcClock`]; constructing one directly is
/// only needed when decoding foreign input, for which [`FromStr`] is the
/// usual path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    time: u64,
    logical: u32,
}

impl Timestamp {
    /// Creates a timestamp from its parts.
    pub const fn new(time: u64, logical: u32) -> Self {
        Self { time, logical }
    }

    /// The zero timestamp, ordered before every clock-produced one.
    pub const ZERO: Self = Self::new(0, 0);

    /// Wall clock milliseconds since the Unix epoch.
    pub const fn time(&self) -> u64 {
        self.time
    }

    /// Logical counter disambiguating timestamps within one millisecond.
    pub const fn logical(&self) -> u32 {
        self.logical
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:0width$}", self.time, self.logical, width = LOGICAL_WIDTH)
    }
}

impl FromStr for Timestamp {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn malformed(s: &str) -> ClockError {
            ClockError::Malformed(s.to_string())
        }
        let (time, logical) = s.split_once('-').ok_or_else(|| malformed(s))?;
        let time: u64 = time.parse().map_err(|_| malformed(s))?;
        let logical: u32 = logical.parse().map_err(|_| malformed(s))?;
        Ok(Self { time, logical })
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Configuration for an [`HlcClock`].
///
/// All bounds are in milliseconds; a bound of `0` disables its check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HlcConfig {
    /// Maximum distance a received timestamp may lead the wall clock before
    /// [`HlcClock::update`] fails with [`ClockError::ClockOffset`].
    pub max_offset: u64,
    /// Upper bound on produced wall times; exceeding it fails with
    /// [`ClockError::WallTimeOverflow`]. `0` means [`MAX_WALL_TIME`].
    pub time_upper_bound: u64,
    /// Largest forward step of the wall clock (relative to the clock's last
    /// state) accepted without failing with [`ClockError::ForwardJump`].
    pub tolerated_forward_jump: u64,
    /// Initial clock state; defaults to the current wall time.
    pub last: Option<Timestamp>,
}

impl HlcConfig {
    /// Creates a configuration with every check disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum accepted lead of received timestamps.
    #[must_use]
    pub const fn with_max_offset(mut self, max_offset: u64) -> Self {
        self.max_offset = max_offset;
        self
    }

    /// Sets the upper bound on produced wall times.
    #[must_use]
    pub const fn with_time_upper_bound(mut self, bound: u64) -> Self {
        self.time_upper_bound = bound;
        self
    }

    /// Sets the tolerated forward jump of the wall clock.
    #[must_use]
    pub const fn with_tolerated_forward_jump(mut self, jump: u64) -> Self {
        self.tolerated_forward_jump = jump;
        self
    }

    /// Seeds the clock with a persisted last state.
    #[must_use]
    pub const fn with_last(mut self, last: Timestamp) -> Self {
        self.last = Some(last);
        self
    }
}

/// A hybrid logical clock.
///
/// The clock keeps a single `last` timestamp behind a mutex; every operation
/// is a read-modify-write of that state, so produced timestamps are strictly
/// increasing per clock instance regardless of task interleaving.
///
/// Two operations exist:
///
/// - [`now`](Self::now) refreshes `last` against the wall clock and returns
///   the new state. Used to stamp locally created records.
/// - [`update`](Self::update) additionally folds in a foreign timestamp,
///   guaranteeing the result orders after it. Used when receiving replicated
///   records.
pub struct HlcClock {
    last: Mutex<Timestamp>,
    max_offset: u64,
    time_upper_bound: u64,
    tolerated_forward_jump: u64,
}

impl HlcClock {
    /// Creates a clock from the given configuration.
    pub fn new(config: HlcConfig) -> Self {
        let last = config.last.unwrap_or_else(|| Timestamp::new(wall_now(), 0));
        Self {
            last: Mutex::new(last),
            max_offset: config.max_offset,
            time_upper_bound: config.time_upper_bound,
            tolerated_forward_jump: config.tolerated_forward_jump,
        }
    }

    /// Produces the next timestamp, refreshing `last` against the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ForwardJump`] when the wall clock stepped
    /// forward beyond the configured tolerance, or
    /// [`ClockError::WallTimeOverflow`] when the produced wall time reaches
    /// the configured upper bound.
    pub fn now(&self) -> ClockResult<Timestamp> {
        let mut last = self.last.lock().expect("HLC state lock poisoned");
        let next = self.step(*last)?;
        *last = next;
        Ok(next)
    }

    /// Folds a foreign timestamp into the clock and returns the new state.
    ///
    /// The result is strictly greater than both `other` and every timestamp
    /// previously produced by this clock.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ClockOffset`] when `other` leads the wall clock
    /// by more than `max_offset`, [`ClockError::ForwardJump`] when the wall
    /// clock stepped forward beyond the configured tolerance, or
    /// [`ClockError::WallTimeOverflow`] on reaching the wall time bound.
    pub fn update(&self, other: Timestamp) -> ClockResult<Timestamp> {
        let mut last = self.last.lock().expect("HLC state lock poisoned");
        let next = self.step((*last).max(other))?;
        *last = next;
        Ok(next)
    }

    /// The clock's current state, without advancing it.
    pub fn last(&self) -> Timestamp {
        *self.last.lock().expect("HLC state lock poisoned")
    }

    /// Advances from `candidate` (the max of `last` and any received
    /// timestamp) against the current wall clock.
    fn step(&self, candidate: Timestamp) -> ClockResult<Timestamp> {
        let physical = wall_now();

        let next = if candidate.time < physical {
            // Wall clock has advanced past everything we have seen.
            let jump = physical - candidate.time;
            if self.tolerated_forward_jump > 0 && jump > self.tolerated_forward_jump {
                return Err(ClockError::ForwardJump {
                    jump,
                    tolerance: self.tolerated_forward_jump,
                });
            }
            Timestamp::new(physical, 0)
        } else {
            // Candidate leads (or matches) the wall clock; bump the logical
            // counter to stay strictly ahead.
            let offset = candidate.time - physical;
            if self.max_offset > 0 && offset > self.max_offset {
                return Err(ClockError::ClockOffset {
                    offset,
                    max: self.max_offset,
                });
            }
            Timestamp::new(candidate.time, candidate.logical + 1)
        };

        let max_wall = if self.time_upper_bound > 0 {
            self.time_upper_bound
        } else {
            MAX_WALL_TIME
        };
        if next.time >= max_wall {
            return Err(ClockError::WallTimeOverflow {
                time: next.time,
                max: max_wall,
            });
        }

        Ok(next)
    }
}

impl Default for HlcClock {
    fn default() -> Self {
        Self::new(HlcConfig::default())
    }
}

impl fmt::Debug for HlcClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HlcClock")
            .field("last", &self.last())
            .field("max_offset", &self.max_offset)
            .field("time_upper_bound", &self.time_upper_bound)
            .field("tolerated_forward_jump", &self.tolerated_forward_jump)
            .finish()
    }
}

/// Current wall time in milliseconds since the Unix epoch.
fn wall_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
