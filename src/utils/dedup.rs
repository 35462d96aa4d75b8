//! Deduplication of records across queries and sources.

use std::collections::HashSet;

use crate::models::{NaturalKey, Record};

/// Ordered, growing set of unique records for one harvest run
///
/// Identity is the natural key read from `key_field`. The first record seen
/// with a key is kept and later ones are dropped, even when their content
/// differs. Records without a key are always kept since dropping them would
/// silently lose data.
#[derive(Debug, Clone)]
pub struct DedupAccumulator {
    key_field: String,
    seen: HashSet<NaturalKey>,
    records: Vec<Record>,
    unkeyed: usize,
    duplicates: usize,
}

impl DedupAccumulator {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            seen: HashSet::new(),
            records: Vec::new(),
            unkeyed: 0,
            duplicates: 0,
        }
    }

    /// Insert a record, returning `true` if it was added to the set
    pub fn add(&mut self, record: Record) -> bool {
        match record.natural_key(&self.key_field) {
            Some(key) => {
                if !self.seen.insert(key) {
                    self.duplicates += 1;
                    return false;
                }
            }
            None => self.unkeyed += 1,
        }
        self.records.push(record);
        true
    }

    /// Insert every record, returning how many were new
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        records.into_iter().map(|r| self.add(r)).filter(|&added| added).count()
    }

    /// The result set in first-seen order
    pub fn all(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Natural keys in first-seen order, each exactly once
    pub fn unique_keys(&self) -> Vec<NaturalKey> {
        self.records
            .iter()
            .filter_map(|r| r.natural_key(&self.key_field))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records kept without a key
    pub fn unkeyed(&self) -> usize {
        self.unkeyed
    }

    /// Records dropped because their key was already present
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}
