use proptest::prelude::*;
use roster_core::Record;
use roster_core::codec;
use roster_core::merge::{filter_valid, merge, merge_two, sort_by_name};
use std::collections::HashSet;

// Small pools so generated rosters collide on (last, first, date) often.
const LAST: [&str; 5] = ["Ivanov", "Petrov", "Abramov", "Sidorova-Kim", "de la Cruz"];
const FIRST: [&str; 4] = ["Ivan", "Anna", "Oleg", "J.R."];
const DATES: [&str; 5] = ["01.01.1990", "29.02.2000", "15.06.1985", "1.1.1990", "31.04.2000"];

fn arb_last_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::sample::select(LAST.to_vec()).prop_map(str::to_string),
        1 => "[A-Z][a-z]{1,8}",
    ]
}

fn arb_first_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::sample::select(FIRST.to_vec()).prop_map(str::to_string),
        1 => "[A-Z][a-z]{1,8}",
    ]
}

fn arb_birth_date() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::sample::select(DATES.to_vec()).prop_map(str::to_string),
        1 => (1u32..=28, 1u32..=12, 1950i32..2010)
            .prop_map(|(d, m, y)| format!("{d:02}.{m:02}.{y}")),
    ]
}

fn arb_record() -> impl Strategy<Value = Record> {
    (0i64..1000, arb_last_name(), arb_first_name(), arb_birth_date())
        .prop_map(|(id, last, first, date)| Record::new(id, last, first, &date))
}

fn arb_roster(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(arb_record(), 0..max)
}

/// A roster plus one record copied from it under a fresh id.
fn arb_roster_with_collision() -> impl Strategy<Value = (Vec<Record>, Record)> {
    arb_roster(20)
        .prop_filter("need something to copy", |r| !r.is_empty())
        .prop_flat_map(|roster| {
            let len = roster.len();
            (Just(roster), 0..len, 1000i64..2000)
        })
        .prop_map(|(roster, pick, id)| {
            let original = &roster[pick];
            let copy = Record::new(
                id,
                original.last_name(),
                original.first_name(),
                &original.birth_date_text(),
            );
            (roster, copy)
        })
}

proptest! {
    #[test]
    fn count_invariant_holds(a in arb_roster(20), b in arb_roster(20)) {
        let result = merge_two(&a, &b);
        prop_assert_eq!(result.total_input, a.len() + b.len());
        prop_assert_eq!(result.total_input, result.merged.len() + result.duplicates_removed);
        // Every chain reports all of its members but removes all but one.
        if result.duplicates_removed > 0 {
            prop_assert!(result.duplicates.len() > result.duplicates_removed);
        } else {
            prop_assert!(result.duplicates.is_empty());
        }
    }

    #[test]
    fn merged_keys_are_unique_and_complete(a in arb_roster(20), b in arb_roster(20)) {
        let result = merge_two(&a, &b);
        let merged_keys: HashSet<_> = result.merged.iter().map(Record::key).collect();
        prop_assert_eq!(merged_keys.len(), result.merged.len());
        let input_keys: HashSet<_> = a.iter().chain(&b).map(Record::key).collect();
        prop_assert_eq!(merged_keys, input_keys);
    }

    #[test]
    fn first_occurrence_wins(a in arb_roster(20), b in arb_roster(20)) {
        let result = merge_two(&a, &b);
        for kept in &result.merged {
            let first = a
                .iter()
                .chain(&b)
                .find(|r| r.is_duplicate_of(kept))
                .expect("merged record comes from the input");
            prop_assert_eq!(first, kept);
        }
    }

    #[test]
    fn merge_is_idempotent(roster in arb_roster(30)) {
        let first = merge(&[roster]);
        let second = merge(&[first.merged.clone()]);
        prop_assert_eq!(second.duplicates_removed, 0);
        prop_assert!(second.duplicates.is_empty());
        prop_assert_eq!(second.merged, first.merged);
    }

    #[test]
    fn copy_under_new_id_is_a_duplicate((roster, copy) in arb_roster_with_collision()) {
        let before = merge(&[roster.clone()]);
        let mut extended = roster;
        extended.push(copy.clone());
        let after = merge(&[extended]);
        prop_assert_eq!(after.merged.len(), before.merged.len());
        prop_assert_eq!(after.duplicates_removed, before.duplicates_removed + 1);
        prop_assert!(after.duplicates.contains(&copy));
    }

    #[test]
    fn sort_is_stable_and_repeatable(roster in arb_roster(40)) {
        // Ids follow input position so stability is observable.
        let roster: Vec<Record> = roster
            .iter()
            .enumerate()
            .map(|(i, r)| Record::new(i as i64, r.last_name(), r.first_name(), &r.birth_date_text()))
            .collect();
        let once = sort_by_name(&roster);
        prop_assert_eq!(&sort_by_name(&once), &once);
        for pair in once.windows(2) {
            let (x, y) = (&pair[0], &pair[1]);
            prop_assert!(x.canonical_cmp(y) != std::cmp::Ordering::Greater);
            if x.last_name() == y.last_name() && x.first_name() == y.first_name() {
                prop_assert!(x.id() < y.id(), "equal keys must keep input order");
            }
        }
    }

    #[test]
    fn filter_keeps_exactly_the_valid_records(roster in arb_roster(30)) {
        let kept = filter_valid(&roster);
        prop_assert!(kept.iter().all(Record::is_valid));
        prop_assert_eq!(kept.len(), roster.iter().filter(|r| r.is_valid()).count());
    }

    #[test]
    fn merged_roster_survives_the_wire(a in arb_roster(25), b in arb_roster(25)) {
        let merged = merge(&[a, b]).merged;
        let payload = codec::encode(&merged).expect("encode");
        let decoded = codec::decode(&payload).expect("decode");
        prop_assert_eq!(decoded, merged);
    }
}

#[test]
fn duplicates_ignore_id() {
    let a = Record::new(1, "Ivanov", "Ivan", "01.01.1990");
    let b = Record::new(99, "Ivanov", "Ivan", "01.01.1990");
    let c = Record::new(1, "Ivanov", "Ivan", "02.01.1990");
    assert!(a.is_duplicate_of(&b));
    assert!(!a.is_duplicate_of(&c));
    assert_eq!(merge(&[vec![a, b, c]]).duplicates_removed, 1);
}

#[test]
fn merge_scenario_from_two_sources() {
    let result = merge_two(
        &[Record::new(1, "Ivanov", "Ivan", "01.01.1990")],
        &[
            Record::new(2, "Ivanov", "Ivan", "01.01.1990"),
            Record::new(3, "Petrov", "Petr", "02.02.1991"),
        ],
    );
    let names: Vec<String> = result.merged.iter().map(Record::full_name).collect();
    assert_eq!(names, vec!["Ivanov Ivan", "Petrov Petr"]);
    assert_eq!(result.total_input, 3);
    assert_eq!(result.duplicates_removed, 1);
    let dup_ids: Vec<i64> = result.duplicates.iter().map(Record::id).collect();
    assert_eq!(dup_ids, vec![1, 2]);
}

#[test]
fn invalid_date_never_survives_filter() {
    let bad = Record::new(1, "Ivanov", "Ivan", "31.04.2000");
    let non_leap = Record::new(2, "Petrov", "Petr", "29.02.2001");
    let good = Record::new(3, "Sidorov", "Oleg", "29.02.2004");
    assert!(!bad.is_valid());
    assert!(!non_leap.is_valid());
    let kept = filter_valid(&[bad, non_leap, good.clone()]);
    assert_eq!(kept, vec![good]);
}
