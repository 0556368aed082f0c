use proptest::prelude::*;

use agora_types::{Points, Timestamp};

proptest! {
    /// Floor split never hands out more than the total, and loses less than one cent per share.
    #[test]
    fn split_floor_never_exceeds_total(cents in 0i64..10_000_000, parts in 1usize..50) {
        let total = Points::from_cents(cents);
        let share = total.split_floor(parts).unwrap();
        let handed_out = share.cents() * parts as i64;
        prop_assert!(handed_out <= total.cents());
        prop_assert!(total.cents() - handed_out < parts as i64);
    }

    /// Display followed by parse is lossless.
    #[test]
    fn display_parse_lossless(cents in -1_000_000_000i64..1_000_000_000) {
        let p = Points::from_cents(cents);
        let parsed: Points = p.to_string().parse().unwrap();
        prop_assert_eq!(parsed, p);
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// has_expired agrees with elapsed_since.
    #[test]
    fn expiry_matches_elapsed(start in 0u64..1_000_000, dur in 0u64..1_000_000, now in 0u64..3_000_000) {
        let t = Timestamp::new(start);
        let now = Timestamp::new(now);
        prop_assert_eq!(t.has_expired(dur, now), now.as_secs() >= start + dur);
    }
}
