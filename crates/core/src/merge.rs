//! Merging of overlapping rosters into one canonical, duplicate-free list.
//!
//! Everything here is a pure function over slices: nothing fails, nothing is
//! shared, and invalid records pass straight through unless the caller runs
//! [`filter_valid`] first.

use crate::record::{Record, RecordKey};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Deduplicated roster in canonical order.
    pub merged: Vec<Record>,
    pub total_input: usize,
    pub duplicates_removed: usize,
    /// Every record that took part in at least one duplicate pair, first-seen
    /// ones included. Diagnostic only; may exceed `duplicates_removed`.
    pub duplicates: Vec<Record>,
}

impl MergeResult {
    pub fn unique_count(&self) -> usize {
        self.merged.len()
    }
}

/// Concatenates `sources` in order, drops duplicates (first occurrence wins),
/// reports every duplicate participant and sorts the survivors.
pub fn merge<S: AsRef<[Record]>>(sources: &[S]) -> MergeResult {
    let all: Vec<Record> = sources
        .iter()
        .flat_map(|s| s.as_ref().iter().cloned())
        .collect();
    let total_input = all.len();

    let unique = remove_duplicates(&all);
    let duplicates_removed = total_input - unique.len();
    let duplicates = find_duplicates(&all);

    MergeResult {
        merged: sort_by_name(&unique),
        total_input,
        duplicates_removed,
        duplicates,
    }
}

pub fn merge_two(first: &[Record], second: &[Record]) -> MergeResult {
    merge(&[first, second])
}

/// Keeps the first record for each `(last_name, first_name, birth_date)` key,
/// preserving input order.
pub fn remove_duplicates(records: &[Record]) -> Vec<Record> {
    let mut seen: HashSet<RecordKey<'_>> = HashSet::with_capacity(records.len());
    let mut unique = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(record.key()) {
            unique.push(record.clone());
        }
    }
    unique
}

pub fn sort_by_name(records: &[Record]) -> Vec<Record> {
    let mut sorted = records.to_vec();
    // slice::sort_by is stable
    sorted.sort_by(Record::canonical_cmp);
    sorted
}

pub fn filter_valid(records: &[Record]) -> Vec<Record> {
    records.iter().filter(|r| r.is_valid()).cloned().collect()
}

/// All-pairs scan. Quadratic, but rosters are small and the report has to
/// list whole duplicate chains rather than just the extras.
fn find_duplicates(records: &[Record]) -> Vec<Record> {
    let mut flagged = vec![false; records.len()];
    let mut duplicates = Vec::new();

    for i in 0..records.len() {
        if flagged[i] {
            continue;
        }
        for j in (i + 1)..records.len() {
            if records[i].is_duplicate_of(&records[j]) {
                if !flagged[i] {
                    duplicates.push(records[i].clone());
                    flagged[i] = true;
                }
                if !flagged[j] {
                    duplicates.push(records[j].clone());
                    flagged[j] = true;
                }
            }
        }
    }

    duplicates
}
