//! Dual-stream merger for resources paginated as open/closed partitions.
//!
//! Each partition keeps its own descending cursor, "more available" flag and
//! deduplicating buffer. Both buffers are concatenated and sorted by
//! identifier (then timestamp) descending before the caller's window is cut.

use std::cmp::Ordering;
use std::thread;

use tracing::{debug, warn};

use crate::config::{MergeConfig, MergeMode};
use crate::constants::transport::UNSPECIFIED_FAILURE;
use crate::cursor::{Advance, Cursor, CursorAdvancer};
use crate::data::{Record, ResourceKind, StatusCounts, StatusPartition};
use crate::dedup::Accumulator;
use crate::errors::AggregateError;
use crate::source::{CountSource, PageRequest, RecordSource};

/// 1-based page window requested by the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    /// 1-based page number; 0 is treated as 1.
    pub page: usize,
    /// Records per page.
    pub page_size: usize,
    /// Collect one record past the window end so `hasMore` is exact.
    pub lookahead: bool,
}

impl PageWindow {
    /// Window for `page` of `page_size` records.
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: page.max(1),
            page_size,
            lookahead: false,
        }
    }

    /// Same window, collecting one extra record.
    pub fn with_lookahead(mut self, lookahead: bool) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Index of the first record in the window.
    pub fn start(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.page_size)
    }

    /// Exclusive end index of the window.
    pub fn end(&self) -> usize {
        self.start().saturating_add(self.page_size)
    }

    /// Number of merged records to gather before slicing.
    pub fn collect_target(&self) -> usize {
        self.end().saturating_add(usize::from(self.lookahead))
    }
}

/// Progress of one status partition.
#[derive(Debug)]
pub struct PartitionReport {
    /// Partition tag.
    pub status: StatusPartition,
    /// Final cursor.
    pub cursor: Cursor,
    /// Whether the partition may still hold records.
    pub has_more: bool,
    /// Page fetches issued.
    pub fetches: usize,
    /// Failure that exhausted the partition early, if any.
    pub failure: Option<AggregateError>,
}

/// Merged, sorted, window-sliced result.
#[derive(Debug)]
pub struct MergedWindow {
    /// Records inside the requested window, sorted.
    pub records: Vec<Record>,
    /// Merged records gathered before slicing.
    pub collected: usize,
    /// Open/closed totals, when the count endpoint answered.
    pub counts: Option<StatusCounts>,
    /// Total items: exact from the count endpoint, else the collected size.
    pub total_count: u64,
    /// Total pages derived from `total_count`.
    pub total_pages: u64,
    /// Per-partition progress.
    pub partitions: Vec<PartitionReport>,
}

impl MergedWindow {
    /// Returns `true` when `total_count` came from the count endpoint.
    pub fn total_is_exact(&self) -> bool {
        self.counts.is_some()
    }

    /// Returns `true` when every partition ended in failure.
    pub fn all_failed(&self) -> bool {
        !self.partitions.is_empty() && self.partitions.iter().all(|p| p.failure.is_some())
    }

    /// First partition failure, if any.
    pub fn first_failure(&self) -> Option<&AggregateError> {
        self.partitions.iter().find_map(|p| p.failure.as_ref())
    }

    /// Whether records exist past the window, by collected size.
    pub fn collected_past(&self, window: &PageWindow) -> bool {
        self.collected > window.end()
    }
}

struct PartitionStream {
    status: StatusPartition,
    cursor: Cursor,
    has_more: bool,
    fetches: usize,
    failure: Option<AggregateError>,
    records: Accumulator,
}

impl PartitionStream {
    fn new(status: StatusPartition, kind: ResourceKind) -> Self {
        Self {
            status,
            cursor: Cursor::start_for(kind),
            has_more: true,
            fetches: 0,
            failure: None,
            records: Accumulator::new(kind),
        }
    }

    fn into_parts(self) -> (Vec<Record>, PartitionReport) {
        let report = PartitionReport {
            status: self.status,
            cursor: self.cursor,
            has_more: self.has_more,
            fetches: self.fetches,
            failure: self.failure,
        };
        (self.records.into_records(), report)
    }
}

/// Runs the open and closed partitions and merges them into one ordering.
pub struct DualStreamMerger<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    counts: Option<&'a dyn CountSource>,
    config: &'a MergeConfig,
    gap_jump_step: i64,
}

impl<'a, S: RecordSource + ?Sized> DualStreamMerger<'a, S> {
    /// Merger over `source` using `config`.
    pub fn new(source: &'a S, config: &'a MergeConfig, gap_jump_step: i64) -> Self {
        Self {
            source,
            counts: None,
            config,
            gap_jump_step,
        }
    }

    /// Attach the auxiliary count endpoint.
    pub fn with_counts(mut self, counts: &'a dyn CountSource) -> Self {
        self.counts = Some(counts);
        self
    }

    /// Collect both partitions up to the window end, merge, sort, and slice.
    ///
    /// Identifiers are unique within a partition only. A record that moved
    /// between partitions while they were being paged shows up once per
    /// partition, and the timestamp tie-break puts the newer copy first.
    /// A failing partition is treated as exhausted; the other keeps going.
    /// A failing count endpoint leaves `counts` empty and falls back to the
    /// collected size for totals.
    pub fn merge_streams(&self, request: &PageRequest, window: PageWindow) -> MergedWindow {
        let kind = request.kind;
        let counts = self.fetch_counts(request);
        let target = window.collect_target();

        let streams = match self.config.mode {
            MergeMode::Interleaved => self.collect_interleaved(request, target),
            MergeMode::Concurrent => self.collect_concurrent(request, target),
        };
        let mut buffer = Vec::new();
        let mut partitions = Vec::with_capacity(streams.len());
        for stream in streams {
            let (records, report) = stream.into_parts();
            buffer.extend(records);
            partitions.push(report);
        }
        buffer.sort_by(|left, right| compare_descending(kind, left, right));
        let collected = buffer.len();
        let records: Vec<Record> = buffer
            .into_iter()
            .skip(window.start())
            .take(window.page_size)
            .collect();

        let total_count = counts
            .map(|counts| counts.total())
            .unwrap_or(collected as u64);
        let total_pages = if window.page_size == 0 {
            0
        } else {
            total_count.div_ceil(window.page_size as u64)
        };
        debug!(
            resource = %kind,
            collected,
            returned = records.len(),
            total_count,
            exact_total = counts.is_some(),
            "dual-stream merge done"
        );
        MergedWindow {
            records,
            collected,
            counts,
            total_count,
            total_pages,
            partitions,
        }
    }

    fn fetch_counts(&self, request: &PageRequest) -> Option<StatusCounts> {
        let counts = self.counts?;
        match counts.status_counts(&request.scope) {
            Ok(counts) => Some(counts),
            Err(err) => {
                warn!(resource = %request.kind, error = %err, "status counts unavailable");
                None
            }
        }
    }

    fn collect_interleaved(&self, request: &PageRequest, target: usize) -> Vec<PartitionStream> {
        let kind = request.kind;
        let mut streams: Vec<PartitionStream> = StatusPartition::ALL
            .into_iter()
            .map(|status| PartitionStream::new(status, kind))
            .collect();
        while buffered(&streams) < target && streams.iter().any(|stream| stream.has_more) {
            for stream in streams.iter_mut().filter(|stream| stream.has_more) {
                self.fetch_partition_page(request, stream);
            }
        }
        streams
    }

    fn collect_concurrent(&self, request: &PageRequest, target: usize) -> Vec<PartitionStream> {
        let kind = request.kind;
        thread::scope(|scope| {
            let handles: Vec<_> = StatusPartition::ALL
                .into_iter()
                .map(|status| {
                    scope.spawn(move || {
                        let mut stream = PartitionStream::new(status, kind);
                        while stream.has_more && stream.records.len() < target {
                            self.fetch_partition_page(request, &mut stream);
                        }
                        stream
                    })
                })
                .collect();
            StatusPartition::ALL
                .into_iter()
                .zip(handles)
                .map(|(status, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        let mut stream = PartitionStream::new(status, kind);
                        stream.has_more = false;
                        stream.failure = Some(AggregateError::transport(
                            kind,
                            format!("{status} partition worker panicked"),
                        ));
                        stream
                    })
                })
                .collect()
        })
    }

    fn fetch_partition_page(&self, request: &PageRequest, stream: &mut PartitionStream) {
        let kind = request.kind;
        let call = request.at(stream.cursor).with_status(stream.status);
        stream.fetches += 1;
        let page = match self.source.fetch_page(&call) {
            Ok(page) if page.success => page,
            Ok(page) => {
                let message = page
                    .message
                    .unwrap_or_else(|| UNSPECIFIED_FAILURE.to_string());
                self.exhaust_with(stream, AggregateError::logical(kind, message));
                return;
            }
            Err(err) => {
                self.exhaust_with(stream, err);
                return;
            }
        };
        if page.is_empty() {
            stream.has_more = false;
            return;
        }
        let lowest = page.records.iter().filter_map(|record| record.id(kind)).min();
        let advancer = CursorAdvancer::new(kind, self.gap_jump_step);
        let (cursor, how) = advancer.advance_to(stream.cursor, lowest);
        stream.cursor = cursor;
        stream.records.merge(page.records);
        if how == Advance::Exhausted || stream.fetches >= self.config.max_partition_iterations {
            stream.has_more = false;
        }
    }

    fn exhaust_with(&self, stream: &mut PartitionStream, err: AggregateError) {
        warn!(
            partition = %stream.status,
            error = %err,
            "partition fetch failed; treating partition as exhausted"
        );
        stream.has_more = false;
        stream.failure = Some(err);
    }
}

fn buffered(streams: &[PartitionStream]) -> usize {
    streams.iter().map(|stream| stream.records.len()).sum()
}

/// Identifier descending, then timestamp descending.
pub fn compare_descending(kind: ResourceKind, left: &Record, right: &Record) -> Ordering {
    right
        .id(kind)
        .cmp(&left.id(kind))
        .then_with(|| right.timestamp_key(kind).cmp(&left.timestamp_key(kind)))
}
