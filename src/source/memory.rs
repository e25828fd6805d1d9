use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::data::{Page, Record, ResourceKind, ScanDirection, Scope, StatusCounts, StatusPartition};
use crate::errors::AggregateError;
use crate::source::{CountSource, PageRequest, RecordSource};

/// In-memory record source for tests, demos, and small datasets.
///
/// Records are served in the kind's scan direction. Two backend quirks can be
/// switched on:
/// - `page_size` caps every page (the server, not the caller, picks it).
/// - `scan_window` only considers identifiers within `window` of the cursor,
///   so a gap wider than the window yields an empty page before the true end.
///
/// Scope filtering compares `company_id`/`branch_id`/`type` fields when the
/// record carries them. Status partitions compare the `status` field.
pub struct InMemorySource {
    records: HashMap<ResourceKind, Vec<Record>>,
    page_size: usize,
    scan_window: Option<i64>,
    calls: AtomicUsize,
}

impl InMemorySource {
    /// Empty source with a page size of `page_size` (at least 1).
    pub fn new(page_size: usize) -> Self {
        Self {
            records: HashMap::new(),
            page_size: page_size.max(1),
            scan_window: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Add records for `kind`; records without a readable id are dropped.
    pub fn with_records(mut self, kind: ResourceKind, records: Vec<Record>) -> Self {
        let entry = self.records.entry(kind).or_default();
        entry.extend(records.into_iter().filter(|record| record.id(kind).is_some()));
        entry.sort_by_key(|record| record.id(kind));
        self
    }

    /// Only consider identifiers within `window` of the cursor on each call.
    pub fn with_scan_window(mut self, window: i64) -> Self {
        self.scan_window = Some(window.max(1));
        self
    }

    /// Number of `fetch_page` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn matches(&self, record: &Record, request: &PageRequest) -> bool {
        let kind = request.kind;
        if !field_matches(record, "company_id", Some(&request.scope.company_id)) {
            return false;
        }
        if !field_matches(record, "branch_id", request.scope.branch_id.as_ref()) {
            return false;
        }
        if !field_matches(record, "type", request.scope.kind_filter.as_ref()) {
            return false;
        }
        if let Some(status) = request.status {
            if !field_matches(record, "status", Some(&status.as_str().to_string())) {
                return false;
            }
        }
        request.include_disabled || record.is_active(kind)
    }

    fn in_window(&self, request: &PageRequest, id: i64) -> bool {
        let Some(window) = self.scan_window else {
            return true;
        };
        if request.cursor.is_start() && request.cursor.direction == ScanDirection::Descending {
            return true;
        }
        id.abs_diff(request.cursor.position) <= window.unsigned_abs()
    }
}

impl RecordSource for InMemorySource {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(records) = self.records.get(&request.kind) else {
            return Ok(Page::ok(Vec::new()));
        };
        let kind = request.kind;
        let candidates = records.iter().filter(|record| {
            record.id(kind).is_some_and(|id| {
                request.cursor.is_past(id) && self.in_window(request, id)
            }) && self.matches(record, request)
        });
        let page: Vec<Record> = match request.cursor.direction {
            ScanDirection::Ascending => candidates.take(self.page_size).cloned().collect(),
            ScanDirection::Descending => {
                let mut matched: Vec<&Record> = candidates.collect();
                matched.reverse();
                matched.into_iter().take(self.page_size).cloned().collect()
            }
        };
        Ok(Page::ok(page))
    }
}

impl CountSource for InMemorySource {
    fn status_counts(&self, scope: &Scope) -> Result<StatusCounts, AggregateError> {
        let Some(records) = self.records.get(&ResourceKind::Request) else {
            return Ok(StatusCounts::default());
        };
        let mut counts = StatusCounts::default();
        for status in StatusPartition::ALL {
            let request = PageRequest::new(ResourceKind::Request, scope.clone())
                .with_status(status)
                .with_include_disabled(true);
            let count = records
                .iter()
                .filter(|record| self.matches(record, &request))
                .count() as u64;
            match status {
                StatusPartition::Open => counts.open = count,
                StatusPartition::Closed => counts.closed = count,
            }
        }
        Ok(counts)
    }
}

fn field_matches(record: &Record, field: &str, expected: Option<&String>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match record.field(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text == expected,
        Some(Value::Number(number)) => number.to_string() == *expected,
        Some(_) => false,
    }
}
