//! Property tests for the hybrid logical clock and its wire format.

use ledgercore::{HlcClock, HlcConfig, Timestamp};
use proptest::prelude::*;

// Wall times in the 13-digit era (2001–2286). Within one digit-width era the
// wire format's lexicographic order equals numeric order, which is what the
// adapters' string indexes rely on.
const WALL_MIN: u64 = 1_000_000_000_000;
const WALL_MAX: u64 = 9_999_999_999_999;

proptest! {
    #[test]
    fn wire_format_round_trips(time in WALL_MIN..=WALL_MAX, logical in 0u32..100_000) {
        let stamp = Timestamp::new(time, logical);
        let encoded = stamp.to_string();
        let decoded: Timestamp = encoded.parse().unwrap();
        prop_assert_eq!(decoded, stamp);
    }

    #[test]
    fn string_order_equals_timestamp_order(
        time_a in WALL_MIN..=WALL_MAX,
        logical_a in 0u32..100_000,
        time_b in WALL_MIN..=WALL_MAX,
        logical_b in 0u32..100_000,
    ) {
        let a = Timestamp::new(time_a, logical_a);
        let b = Timestamp::new(time_b, logical_b);

        prop_assert_eq!(a < b, a.to_string() < b.to_string());
        prop_assert_eq!(a == b, a.to_string() == b.to_string());
        prop_assert_eq!(a > b, a.to_string() > b.to_string());
    }

    #[test]
    fn now_is_strictly_monotonic(ticks in 2usize..64) {
        let clock = HlcClock::new(HlcConfig::default());
        let mut previous = clock.now().unwrap();
        for _ in 1..ticks {
            let next = clock.now().unwrap();
            prop_assert!(next > previous, "{next} not after {previous}");
            previous = next;
        }
    }

    #[test]
    fn update_orders_after_both_inputs(
        lead_ms in 0u64..10_000,
        logical in 0u32..100,
    ) {
        let clock = HlcClock::new(HlcConfig::default());
        let before = clock.last();
        let foreign = Timestamp::new(before.time() + lead_ms, logical);

        let merged = clock.update(foreign).unwrap();
        prop_assert!(merged > foreign);
        prop_assert!(merged > before);

        // And the clock keeps going from there.
        let after = clock.now().unwrap();
        prop_assert!(after > merged);
    }

    #[test]
    fn serialized_logical_is_always_five_digits(
        time in WALL_MIN..=WALL_MAX,
        logical in 0u32..100_000,
    ) {
        let encoded = Timestamp::new(time, logical).to_string();
        let (_, logical_part) = encoded.split_once('-').unwrap();
        prop_assert_eq!(logical_part.len(), 5);
    }
}
