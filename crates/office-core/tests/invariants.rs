use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use office_core::{
    ConflictPolicy, Deregistration, Engine, MemoryStore, OccupancyStore, ReferenceZone,
    RegisterOutcome, RegisterRequest,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Join {
        user: u8,
        start: Option<(u32, u32)>,
        end: Option<(u32, u32)>,
    },
    Leave {
        user: u8,
    },
    Advance {
        minutes: i64,
    },
    Tick,
}

fn hhmm() -> impl Strategy<Value = Option<(u32, u32)>> {
    proptest::option::of((0u32..24, 0u32..60))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..5, hhmm(), hhmm()).prop_map(|(user, start, end)| Op::Join { user, start, end }),
        (0u8..5).prop_map(|user| Op::Leave { user }),
        (1i64..600).prop_map(|minutes| Op::Advance { minutes }),
        Just(Op::Tick),
    ]
}

fn policy() -> impl Strategy<Value = ConflictPolicy> {
    prop_oneof![Just(ConflictPolicy::Reject), Just(ConflictPolicy::Replace)]
}

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T08:00:00+09:00")
        .expect("valid RFC3339 timestamp")
        .with_timezone(&Utc)
}

fn fmt_time(t: Option<(u32, u32)>) -> Option<String> {
    t.map(|(h, m)| format!("{h:02}:{m:02}"))
}

proptest! {
    #[test]
    fn active_set_never_holds_duplicate_users(
        ops in proptest::collection::vec(op(), 1..60),
        policy in policy(),
    ) {
        let store = MemoryStore::new();
        let engine = Engine::new(ReferenceZone::default(), policy);
        let mut now = epoch();

        for op in ops {
            match op {
                Op::Join { user, start, end } => {
                    let req = RegisterRequest {
                        user_id: user.to_string(),
                        display_name: format!("user{user}"),
                        planned_start: fmt_time(start),
                        expected_end: fmt_time(end),
                        note: None,
                    };
                    engine.register(&store, &req, now).unwrap();
                }
                Op::Leave { user } => {
                    let before_entries = store.entries().unwrap().len();
                    let before_history = store.history_len().unwrap();
                    match engine.deregister(&store, &user.to_string(), now).unwrap() {
                        Deregistration::Left { .. } => {
                            prop_assert_eq!(store.entries().unwrap().len(), before_entries - 1);
                            prop_assert_eq!(store.history_len().unwrap(), before_history + 1);
                        }
                        Deregistration::NotRegistered => {
                            prop_assert_eq!(store.entries().unwrap().len(), before_entries);
                            prop_assert_eq!(store.history_len().unwrap(), before_history);
                        }
                    }
                }
                Op::Advance { minutes } => now += TimeDelta::minutes(minutes),
                Op::Tick => {
                    let before_history = store.history_len().unwrap();
                    let report = engine.reconcile(&store, now).unwrap();
                    prop_assert!(report.failures.is_empty());
                    prop_assert_eq!(
                        store.history_len().unwrap(),
                        before_history + report.ended.len()
                    );
                    for closed in &report.ended {
                        prop_assert!(closed.ended_at <= now);
                    }
                    let again = engine.reconcile(&store, now).unwrap();
                    prop_assert!(again.is_quiet());
                    for entry in store.entries().unwrap() {
                        prop_assert!(!entry.is_due_to_start(now));
                        prop_assert!(!entry.is_due_to_end(now));
                    }
                }
            }

            let entries = store.entries().unwrap();
            let ids: HashSet<_> = entries.iter().map(|e| e.user_id.clone()).collect();
            prop_assert_eq!(ids.len(), entries.len());
        }
    }

    #[test]
    fn resolved_times_are_strictly_future_and_within_a_day(
        hour in 0u32..24,
        minute in 0u32..60,
        offset_minutes in 0i64..(7 * 24 * 60),
    ) {
        let zone = ReferenceZone::default();
        let now = epoch() + TimeDelta::minutes(offset_minutes);
        let text = format!("{hour:02}:{minute:02}");
        let resolved = zone.resolve_time_of_day(&text, now).unwrap();
        prop_assert!(resolved > now);
        prop_assert!(resolved - now <= TimeDelta::days(1));
        let local = resolved.with_timezone(&zone.offset()).format("%H:%M").to_string();
        prop_assert_eq!(local, text);
    }

    #[test]
    fn reject_policy_never_changes_an_existing_start(
        first_minutes in 0i64..600,
        second_minutes in 0i64..600,
    ) {
        let store = MemoryStore::new();
        let engine = Engine::new(ReferenceZone::default(), ConflictPolicy::Reject);
        let req = RegisterRequest {
            user_id: "u".to_string(),
            display_name: "u".to_string(),
            ..Default::default()
        };
        let first = epoch() + TimeDelta::minutes(first_minutes);
        engine.register(&store, &req, first).unwrap();
        let second = first + TimeDelta::minutes(second_minutes);
        let reg = engine.register(&store, &req, second).unwrap();
        prop_assert_eq!(reg.outcome, RegisterOutcome::AlreadyActive);
        prop_assert_eq!(store.entry("u").unwrap().unwrap().start, first);
    }
}
