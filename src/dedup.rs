use indexmap::IndexMap;

use crate::data::{Record, RecordId, ResourceKind};

/// Outcome of merging one page into an [`Accumulator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Records appended.
    pub added: usize,
    /// Records dropped because their identifier was already present.
    pub duplicates: usize,
    /// Records dropped because they carried no readable identifier.
    pub malformed: usize,
}

/// Arrival-ordered, identifier-unique record set for one aggregation call.
///
/// Backed by an `IndexMap` so membership checks stay O(1) up to the safety cap
/// while iteration preserves arrival order until [`Accumulator::sort_by`].
#[derive(Clone, Debug)]
pub struct Accumulator {
    kind: ResourceKind,
    records: IndexMap<RecordId, Record>,
}

impl Accumulator {
    /// Empty accumulator for `kind`.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            records: IndexMap::new(),
        }
    }

    /// Resource kind whose identifier field keys this set.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Append every record from `page` whose identifier is not yet present.
    pub fn merge<I>(&mut self, page: I) -> MergeOutcome
    where
        I: IntoIterator<Item = Record>,
    {
        let mut outcome = MergeOutcome::default();
        for record in page {
            let Some(id) = record.id(self.kind) else {
                outcome.malformed += 1;
                continue;
            };
            if self.records.contains_key(&id) {
                outcome.duplicates += 1;
                continue;
            }
            self.records.insert(id, record);
            outcome.added += 1;
        }
        outcome
    }

    /// Returns `true` when `id` has been collected.
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of unique records collected.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identifiers in current order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.keys().copied().collect()
    }

    /// Borrow records in current order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Reorder records in place.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Record, &Record) -> std::cmp::Ordering,
    {
        self.records.sort_by(|_, left, _, right| compare(left, right));
    }

    /// Drop everything past the first `len` records.
    pub fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    /// Consume into records in current order.
    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}
