use std::sync::Arc;

use pagewise::data::{Page, Record, ResourceKind, ScanDirection, Scope, StatusPartition};
use pagewise::{
    AggregateError, Aggregator, AggregatorConfig, BatchCollector, CollectorConfig, Cursor,
    CursorAdvancer, InMemorySource, PageRequest, ScriptedSource, StopReason,
};
use serde_json::json;

fn record(kind: ResourceKind, id: i64) -> Record {
    Record::from_value(json!({ kind.id_field(): id })).unwrap()
}

fn page(kind: ResourceKind, ids: &[i64]) -> Page {
    Page::ok(ids.iter().map(|id| record(kind, *id)).collect())
}

fn ids(kind: ResourceKind, records: &[Record]) -> Vec<i64> {
    records.iter().filter_map(|r| r.id(kind)).collect()
}

#[test]
fn empty_streak_ends_collection_before_a_late_page() {
    let kind = ResourceKind::Project;
    let source = ScriptedSource::from_pages(vec![
        page(kind, &[1, 2, 3]),
        page(kind, &[4, 5, 6]),
        page(kind, &[]),
        page(kind, &[]),
        page(kind, &[]),
        page(kind, &[]),
        page(kind, &[]),
        page(kind, &[7, 8, 9]),
    ]);
    let config = CollectorConfig {
        empty_streak_limit: 5,
        ..CollectorConfig::default()
    };
    let request = PageRequest::new(kind, Scope::company("1"));
    let collection = BatchCollector::new(&source, &config).collect(&request, 10);

    assert_eq!(collection.stop_reason(), Some(StopReason::EmptyStreak));
    assert_eq!(ids(kind, &collection.records), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(source.calls(), 7);
}

#[test]
fn overlapping_pages_merge_to_unique_records() {
    let kind = ResourceKind::Financial;
    let source = ScriptedSource::from_pages(vec![page(kind, &[1, 2, 3]), page(kind, &[3, 4, 5])]);
    let config = CollectorConfig::default();
    let request = PageRequest::new(kind, Scope::company("1"));
    let collection = BatchCollector::new(&source, &config).collect(&request, 5);

    assert_eq!(ids(kind, &collection.records), vec![1, 2, 3, 4, 5]);
    assert_eq!(collection.stats.duplicates, 1);
}

#[test]
fn stalled_frontier_jumps_forward() {
    let kind = ResourceKind::Project;
    let advancer = CursorAdvancer::new(kind, 5);
    let current = Cursor::at(40, ScanDirection::Ascending);
    let stalled = page(kind, &[current.position]);
    let next = advancer.advance(current, &stalled);
    assert_eq!(next.position, 45);
}

#[test]
fn open_and_closed_partitions_merge_descending() {
    let kind = ResourceKind::Request;
    let source = Arc::new(
        ScriptedSource::new(Vec::new())
            .with_partition(StatusPartition::Open, vec![Ok(page(kind, &[10, 8]))])
            .with_partition(StatusPartition::Closed, vec![Ok(page(kind, &[9, 7]))]),
    );
    let aggregator = Aggregator::new(source, AggregatorConfig::default()).unwrap();
    let response = aggregator.fetch_requests(&Scope::company("1"), 1, 4);

    assert!(response.success);
    assert_eq!(ids(kind, &response.data), vec![10, 9, 8, 7]);
    assert_eq!(response.total_count, Some(4));
    assert_eq!(response.total_pages, Some(1));
}

#[test]
fn one_failed_partition_still_serves_the_other() {
    let kind = ResourceKind::Request;
    let source = Arc::new(
        ScriptedSource::new(Vec::new())
            .with_partition(
                StatusPartition::Open,
                vec![Err(AggregateError::transport(kind, "timeout"))],
            )
            .with_partition(StatusPartition::Closed, vec![Ok(page(kind, &[9, 7]))]),
    );
    let aggregator = Aggregator::new(source, AggregatorConfig::default()).unwrap();
    let response = aggregator.fetch_requests(&Scope::company("1"), 1, 10);

    assert!(response.success);
    assert_eq!(ids(kind, &response.data), vec![9, 7]);
    assert!(response.error.is_some());
}

#[test]
fn sparse_identifiers_are_crossed_by_gap_jumps() {
    let kind = ResourceKind::Project;
    let records = [1, 2, 50].iter().map(|id| record(kind, *id)).collect();
    let source = InMemorySource::new(2)
        .with_records(kind, records)
        .with_scan_window(5);
    let request = PageRequest::new(kind, Scope::company("1"));

    let strict = CollectorConfig::default();
    let short = BatchCollector::new(&source, &strict).collect(&request, 10);
    assert_eq!(ids(kind, &short.records), vec![1, 2]);
    assert_eq!(short.stop_reason(), Some(StopReason::EmptyStreak));

    let patient = CollectorConfig {
        empty_streak_limit: 10,
        ..CollectorConfig::default()
    };
    let full = BatchCollector::new(&source, &patient).collect(&request, 10);
    assert_eq!(ids(kind, &full.records), vec![1, 2, 50]);
    assert!(full.stats.iterations <= patient.max_iterations);
}

#[test]
fn an_always_empty_source_terminates() {
    let kind = ResourceKind::Employee;
    let source = InMemorySource::new(10);
    let config = CollectorConfig::default();
    let request = PageRequest::new(kind, Scope::company("1"));
    let collection = BatchCollector::new(&source, &config).collect(&request, 20);

    assert!(collection.records.is_empty());
    assert_eq!(source.calls(), config.empty_streak_limit);
}

#[test]
fn a_never_ending_source_stops_at_the_iteration_budget() {
    let kind = ResourceKind::Project;
    let pages = (0..200).map(|n| page(kind, &[n * 2 + 1])).collect();
    let source = ScriptedSource::from_pages(pages);
    let config = CollectorConfig {
        max_iterations: 12,
        ..CollectorConfig::default()
    };
    let request = PageRequest::new(kind, Scope::company("1"));
    let collection = BatchCollector::new(&source, &config).collect(&request, 1_000);

    assert_eq!(collection.stop_reason(), Some(StopReason::IterationBudget));
    assert_eq!(source.calls(), 12);
    assert_eq!(collection.records.len(), 12);
}

#[test]
fn failure_mid_collection_reaches_the_ui_envelope() {
    let kind = ResourceKind::Financial;
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(page(kind, &[1, 2])),
        Ok(Page::failed("session expired")),
    ]));
    let aggregator = Aggregator::new(source, AggregatorConfig::default()).unwrap();
    let response = aggregator.fetch_financials(&Scope::company("1"), None, 10);

    assert!(!response.success);
    assert_eq!(ids(kind, &response.data), vec![1, 2]);
    assert!(
        response
            .error
            .as_deref()
            .is_some_and(|e| e.contains("session expired"))
    );
}
