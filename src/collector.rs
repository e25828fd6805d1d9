//! Generic batch collector.
//!
//! One collector loop serves every resource: the resource-specific parts are
//! the [`RecordSource`] it calls and the identifier field of the request's
//! [`crate::ResourceKind`]. Each iteration issues exactly one source call, so
//! pages are always fetched in cursor order.

use tracing::{debug, warn};

use crate::config::CollectorConfig;
use crate::constants::transport::UNSPECIFIED_FAILURE;
use crate::cursor::{Advance, Cursor, CursorAdvancer};
use crate::data::Record;
use crate::dedup::Accumulator;
use crate::errors::AggregateError;
use crate::governor::{SafetyGovernor, StopReason};
use crate::source::{PageRequest, RecordSource};

/// Terminal state of a collection.
#[derive(Debug)]
pub enum CollectionOutcome {
    /// The loop ended normally; records may be fewer than requested.
    Done(StopReason),
    /// A source call failed; records hold everything gathered before it.
    Failed(AggregateError),
}

/// Counters describing how a collection went.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Source calls issued, including the failed one if any.
    pub iterations: usize,
    /// Pages received successfully.
    pub pages: usize,
    /// Pages received with zero records.
    pub empty_pages: usize,
    /// Records dropped as already seen.
    pub duplicates: usize,
    /// Records dropped for lacking an identifier.
    pub malformed: usize,
    /// Forced cursor jumps (empty page or stalled frontier).
    pub gap_jumps: usize,
}

/// Result of one [`BatchCollector::collect`] call.
#[derive(Debug)]
pub struct Collection {
    /// Deduplicated records in arrival order.
    pub records: Vec<Record>,
    /// Terminal state.
    pub outcome: CollectionOutcome,
    /// Loop counters.
    pub stats: CollectionStats,
    /// Cursor the next call would have used.
    pub cursor: Cursor,
}

impl Collection {
    /// Returns `true` when the loop ended in the `Failed` state.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CollectionOutcome::Failed(_))
    }

    /// Failure that ended the loop, if any.
    pub fn error(&self) -> Option<&AggregateError> {
        match &self.outcome {
            CollectionOutcome::Failed(err) => Some(err),
            CollectionOutcome::Done(_) => None,
        }
    }

    /// Why the loop ended normally, if it did.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.outcome {
            CollectionOutcome::Done(reason) => Some(reason),
            CollectionOutcome::Failed(_) => None,
        }
    }
}

/// Drives a record source through the cursor advancer until a limit is hit.
pub struct BatchCollector<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    config: &'a CollectorConfig,
}

impl<'a, S: RecordSource + ?Sized> BatchCollector<'a, S> {
    /// Collector over `source` bounded by `config`.
    pub fn new(source: &'a S, config: &'a CollectorConfig) -> Self {
        Self { source, config }
    }

    /// Collect up to `target` unique records starting at `request.cursor`.
    ///
    /// Stops when the accumulator reaches `target` or the safety cap, after
    /// `empty_streak_limit` consecutive empty pages, once `max_iterations`
    /// calls were spent, or when the cursor can no longer move past the end
    /// of the identifier range. A short (but non-empty) page never ends
    /// collection.
    /// Failures end the loop but keep what was already gathered.
    pub fn collect(&self, request: &PageRequest, target: usize) -> Collection {
        let kind = request.kind;
        let advancer = CursorAdvancer::new(kind, self.config.gap_jump_step);
        let mut governor = SafetyGovernor::new(self.config);
        let mut accumulator = Accumulator::new(kind);
        let mut stats = CollectionStats::default();
        let mut cursor = request.cursor;

        let outcome = loop {
            if let Some(reason) = governor.before_fetch(accumulator.len(), target) {
                break CollectionOutcome::Done(reason);
            }
            let page = match self.source.fetch_page(&request.at(cursor)) {
                Ok(page) if page.success => page,
                Ok(page) => {
                    governor.observe_failure();
                    let message = page
                        .message
                        .unwrap_or_else(|| UNSPECIFIED_FAILURE.to_string());
                    break CollectionOutcome::Failed(AggregateError::logical(kind, message));
                }
                Err(err) => {
                    governor.observe_failure();
                    break CollectionOutcome::Failed(err);
                }
            };
            stats.pages += 1;
            let page_len = page.len();
            if page_len == 0 {
                stats.empty_pages += 1;
            }
            let (next, how) = advancer.advance_explained(cursor, &page);
            if matches!(how, Advance::EmptyGap | Advance::Stalled) {
                stats.gap_jumps += 1;
            }
            let merged = accumulator.merge(page.records);
            stats.duplicates += merged.duplicates;
            stats.malformed += merged.malformed;
            cursor = next;
            if let Some(reason) = governor.observe_page(page_len, accumulator.len(), target) {
                break CollectionOutcome::Done(reason);
            }
            if how == Advance::Exhausted {
                break CollectionOutcome::Done(StopReason::CursorExhausted);
            }
        };
        stats.iterations = governor.iterations();

        match &outcome {
            CollectionOutcome::Done(reason) => debug!(
                resource = %kind,
                reason = reason.as_str(),
                iterations = stats.iterations,
                records = accumulator.len(),
                empty_pages = stats.empty_pages,
                gap_jumps = stats.gap_jumps,
                "batch collection done"
            ),
            CollectionOutcome::Failed(err) => warn!(
                resource = %kind,
                iterations = stats.iterations,
                records = accumulator.len(),
                error = %err,
                "batch collection failed; keeping partial result"
            ),
        }

        Collection {
            records: accumulator.into_records(),
            outcome,
            stats,
            cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Page, ResourceKind, ScanDirection, Scope};
    use crate::source::ScriptedSource;
    use serde_json::json;

    fn page(ids: &[i64]) -> Page {
        Page::ok(
            ids.iter()
                .map(|id| Record::from_value(json!({"project_id": id})).unwrap())
                .collect(),
        )
    }

    fn request() -> PageRequest {
        PageRequest::new(ResourceKind::Project, Scope::company("1"))
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .filter_map(|r| r.id(ResourceKind::Project))
            .collect()
    }

    #[test]
    fn stops_once_target_is_reached() {
        let source =
            ScriptedSource::from_pages(vec![page(&[1, 2, 3]), page(&[4, 5, 6]), page(&[7])]);
        let config = CollectorConfig::default();
        let collection = BatchCollector::new(&source, &config).collect(&request(), 5);
        assert_eq!(collection.stop_reason(), Some(StopReason::TargetReached));
        assert_eq!(ids(&collection.records), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn short_pages_do_not_end_collection() {
        let source = ScriptedSource::from_pages(vec![page(&[1]), page(&[3]), page(&[9, 10])]);
        let config = CollectorConfig::default();
        let collection = BatchCollector::new(&source, &config).collect(&request(), 4);
        assert_eq!(ids(&collection.records), vec![1, 3, 9, 10]);
        assert_eq!(collection.stats.empty_pages, 0);
    }

    #[test]
    fn empty_pages_advance_by_gap_jumps() {
        let source = ScriptedSource::from_pages(vec![page(&[1, 2]), page(&[]), page(&[])]);
        let config = CollectorConfig {
            empty_streak_limit: 3,
            ..CollectorConfig::default()
        };
        let collection = BatchCollector::new(&source, &config).collect(&request(), 10);
        let positions: Vec<i64> = source.seen_cursors().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 2, 7, 12]);
        assert_eq!(collection.stop_reason(), Some(StopReason::EmptyStreak));
        assert_eq!(collection.cursor, Cursor::at(17, ScanDirection::Ascending));
        assert_eq!(collection.stats.gap_jumps, 3);
    }

    #[test]
    fn logical_failure_keeps_partial_records() {
        let source = ScriptedSource::new(vec![
            Ok(page(&[1, 2])),
            Ok(Page::failed("quota exceeded")),
            Ok(page(&[3])),
        ]);
        let config = CollectorConfig::default();
        let collection = BatchCollector::new(&source, &config).collect(&request(), 10);
        assert!(collection.is_failed());
        assert_eq!(ids(&collection.records), vec![1, 2]);
        assert!(
            collection
                .error()
                .is_some_and(|err| err.to_string().contains("quota exceeded"))
        );
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn transport_failure_on_first_call_returns_empty_failure() {
        let source = ScriptedSource::new(vec![Err(AggregateError::transport(
            ResourceKind::Project,
            "connection reset",
        ))]);
        let config = CollectorConfig::default();
        let collection = BatchCollector::new(&source, &config).collect(&request(), 10);
        assert!(collection.is_failed());
        assert!(collection.records.is_empty());
        assert_eq!(collection.stats.iterations, 1);
    }

    #[test]
    fn safety_cap_stops_below_target() {
        let source = ScriptedSource::from_pages(vec![page(&[1, 2, 3]), page(&[4, 5, 6])]);
        let config = CollectorConfig {
            safety_cap: 3,
            ..CollectorConfig::default()
        };
        let collection = BatchCollector::new(&source, &config).collect(&request(), 100);
        assert_eq!(collection.stop_reason(), Some(StopReason::SafetyCap));
        assert_eq!(collection.records.len(), 3);
    }

    #[test]
    fn zero_target_makes_no_calls() {
        let source = ScriptedSource::from_pages(vec![page(&[1])]);
        let config = CollectorConfig::default();
        let collection = BatchCollector::new(&source, &config).collect(&request(), 0);
        assert_eq!(collection.stop_reason(), Some(StopReason::TargetReached));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn stops_once_the_cursor_is_pinned_at_the_range_end() {
        let mut pages = vec![page(&[i64::MAX - 1, i64::MAX])];
        pages.extend((0..20).map(|_| page(&[])));
        let source = ScriptedSource::from_pages(pages);
        let config = CollectorConfig {
            empty_streak_limit: 15,
            ..CollectorConfig::default()
        };
        let collection = BatchCollector::new(&source, &config).collect(&request(), 10);

        assert_eq!(collection.stop_reason(), Some(StopReason::CursorExhausted));
        assert_eq!(ids(&collection.records), vec![i64::MAX - 1, i64::MAX]);
        assert_eq!(collection.cursor.position, i64::MAX);
        assert_eq!(source.calls(), 2);
    }
}
