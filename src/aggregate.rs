//! Per-resource entry points returning the uniform UI envelope.
//!
//! Data flow: cache lookup (hit returns) -> batch collector or dual-stream
//! merger -> size-bounded slice -> cache write -> [`AggregateResponse`].
//! Nothing here returns `Err` or panics on fetch failures; they surface as
//! `success: false` with an `error` string and whatever records were gathered.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheKey, ResultCache};
use crate::collector::{BatchCollector, Collection, CollectionOutcome};
use crate::config::{AggregatorConfig, HasMoreMode};
use crate::cursor::Cursor;
use crate::data::{AggregateResponse, Record, RecordId, ResourceKind, Scope};
use crate::errors::AggregateError;
use crate::merge::{DualStreamMerger, MergedWindow, PageWindow};
use crate::source::{CountSource, PageRequest, RecordSource};

/// Whether a call may be answered from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve fresh entries; write after a successful aggregation.
    UseCache,
    /// Skip the read, aggregate, and overwrite the entry.
    Refresh,
}

/// Cursor-paged request for a single-stream resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorQuery {
    /// Resource class.
    pub kind: ResourceKind,
    /// Owning company/branch and type filter.
    pub scope: Scope,
    /// Start after this identifier; `None` starts at the scan start.
    pub cursor: Option<RecordId>,
    /// Records wanted.
    pub size: usize,
    /// Forwarded to the backend's `disabled` parameter.
    pub include_disabled: bool,
}

impl CursorQuery {
    /// Query for the first `size` records of `kind` in `scope`.
    pub fn new(kind: ResourceKind, scope: Scope, size: usize) -> Self {
        Self {
            kind,
            scope,
            cursor: None,
            size,
            include_disabled: false,
        }
    }

    /// Continue after `cursor`.
    pub fn after(mut self, cursor: RecordId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Set the include-disabled flag.
    pub fn include_disabled(mut self, include_disabled: bool) -> Self {
        self.include_disabled = include_disabled;
        self
    }

    fn start_cursor(&self) -> Cursor {
        match self.cursor {
            Some(position) => Cursor::at(position, self.kind.direction()),
            None => Cursor::start_for(self.kind),
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            kind: self.kind,
            scope: self.scope.clone(),
            cursor: self.start_cursor().position,
            size: self.size,
            include_disabled: self.include_disabled,
        }
    }

    fn page_request(&self) -> PageRequest {
        PageRequest::new(self.kind, self.scope.clone())
            .at(self.start_cursor())
            .with_include_disabled(self.include_disabled)
    }
}

/// Read-side aggregation facade over one record source.
pub struct Aggregator {
    source: Arc<dyn RecordSource>,
    counts: Option<Arc<dyn CountSource>>,
    cache: Option<ResultCache>,
    config: AggregatorConfig,
}

impl Aggregator {
    /// Aggregator over `source`; rejects invalid configuration.
    pub fn new(
        source: Arc<dyn RecordSource>,
        config: AggregatorConfig,
    ) -> Result<Self, AggregateError> {
        config.validate()?;
        Ok(Self {
            source,
            counts: None,
            cache: None,
            config,
        })
    }

    /// Attach the open/closed count endpoint for dual-stream resources.
    pub fn with_counts(mut self, counts: Arc<dyn CountSource>) -> Self {
        self.counts = Some(counts);
        self
    }

    /// Front covered resources with `cache`.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Projects after `cursor` (exclusive), up to `size`.
    pub fn fetch_projects(
        &self,
        scope: &Scope,
        cursor: Option<RecordId>,
        size: usize,
    ) -> AggregateResponse {
        self.fetch_cursor(&with_cursor(
            CursorQuery::new(ResourceKind::Project, scope.clone(), size),
            cursor,
        ))
    }

    /// Employees after `cursor` (exclusive), up to `size`.
    pub fn fetch_employees(
        &self,
        scope: &Scope,
        cursor: Option<RecordId>,
        size: usize,
        include_disabled: bool,
    ) -> AggregateResponse {
        self.fetch_cursor(&with_cursor(
            CursorQuery::new(ResourceKind::Employee, scope.clone(), size)
                .include_disabled(include_disabled),
            cursor,
        ))
    }

    /// Employees, bypassing any cached entry and overwriting it.
    pub fn refresh_employees(
        &self,
        scope: &Scope,
        cursor: Option<RecordId>,
        size: usize,
        include_disabled: bool,
    ) -> AggregateResponse {
        self.fetch_cursor_with(
            &with_cursor(
                CursorQuery::new(ResourceKind::Employee, scope.clone(), size)
                    .include_disabled(include_disabled),
                cursor,
            ),
            CachePolicy::Refresh,
        )
    }

    /// Financial lines after `cursor` (exclusive), up to `size`.
    pub fn fetch_financials(
        &self,
        scope: &Scope,
        cursor: Option<RecordId>,
        size: usize,
    ) -> AggregateResponse {
        self.fetch_cursor(&with_cursor(
            CursorQuery::new(ResourceKind::Financial, scope.clone(), size),
            cursor,
        ))
    }

    /// One page of requests merged from the open and closed partitions.
    pub fn fetch_requests(
        &self,
        scope: &Scope,
        page: usize,
        page_size: usize,
    ) -> AggregateResponse {
        self.fetch_requests_with(scope, page, page_size, CachePolicy::UseCache)
    }

    /// Requests page, bypassing any cached entry and overwriting it.
    pub fn refresh_requests(
        &self,
        scope: &Scope,
        page: usize,
        page_size: usize,
    ) -> AggregateResponse {
        self.fetch_requests_with(scope, page, page_size, CachePolicy::Refresh)
    }

    /// Generic cursor-paged aggregation with the default cache policy.
    pub fn fetch_cursor(&self, query: &CursorQuery) -> AggregateResponse {
        self.fetch_cursor_with(query, CachePolicy::UseCache)
    }

    /// Generic cursor-paged aggregation.
    pub fn fetch_cursor_with(&self, query: &CursorQuery, policy: CachePolicy) -> AggregateResponse {
        if query.kind.is_dual_stream() {
            return failure(
                Vec::new(),
                AggregateError::Configuration(format!(
                    "'{}' is paginated by status partition; use fetch_requests",
                    query.kind
                )),
            );
        }
        let cache = self.cache_for(query.kind);
        let key = query.cache_key();
        if let (Some(cache), CachePolicy::UseCache) = (cache, policy) {
            if let Some(hit) = cache.get::<AggregateResponse>(&key) {
                return hit;
            }
        }

        let lookahead = self.config.has_more == HasMoreMode::Lookahead;
        let target = query.size.saturating_add(usize::from(lookahead));
        let collector_config = self.config.collector_for(query.kind);
        let collection = BatchCollector::new(self.source.as_ref(), collector_config)
            .collect(&query.page_request(), target);
        let response = cursor_response(collection, query.size, lookahead);

        if response.success {
            if let Some(cache) = cache {
                cache.put(&key, &response);
            }
        }
        response
    }

    fn fetch_requests_with(
        &self,
        scope: &Scope,
        page: usize,
        page_size: usize,
        policy: CachePolicy,
    ) -> AggregateResponse {
        let kind = ResourceKind::Request;
        let window = PageWindow::new(page, page_size)
            .with_lookahead(self.config.has_more == HasMoreMode::Lookahead);
        let key = CacheKey {
            kind,
            scope: scope.clone(),
            cursor: window.page as RecordId,
            size: page_size,
            include_disabled: false,
        };
        let cache = self.cache_for(kind);
        if let (Some(cache), CachePolicy::UseCache) = (cache, policy) {
            if let Some(hit) = cache.get::<AggregateResponse>(&key) {
                return hit;
            }
        }

        let gap_jump_step = self.config.collector_for(kind).gap_jump_step;
        let mut merger =
            DualStreamMerger::new(self.source.as_ref(), &self.config.merge, gap_jump_step);
        if let Some(counts) = self.counts.as_deref() {
            merger = merger.with_counts(counts);
        }
        let request = PageRequest::new(kind, scope.clone());
        let merged = merger.merge_streams(&request, window);
        let response = requests_response(merged, &window);

        if response.success {
            if let Some(cache) = cache {
                cache.put(&key, &response);
            }
        }
        response
    }

    fn cache_for(&self, kind: ResourceKind) -> Option<&ResultCache> {
        self.cache
            .as_ref()
            .filter(|_| self.config.cache.covers(kind))
    }
}

fn with_cursor(query: CursorQuery, cursor: Option<RecordId>) -> CursorQuery {
    match cursor {
        Some(cursor) => query.after(cursor),
        None => query,
    }
}

fn cursor_response(collection: Collection, size: usize, lookahead: bool) -> AggregateResponse {
    let Collection {
        mut records,
        outcome,
        ..
    } = collection;
    let collected = records.len();
    records.truncate(size);
    if let CollectionOutcome::Failed(err) = outcome {
        return failure(records, err);
    }
    let has_more = if lookahead {
        collected > size
    } else {
        records.len() == size
    };
    AggregateResponse {
        success: true,
        data: records,
        has_more: Some(has_more),
        total_count: None,
        total_pages: None,
        error: None,
    }
}

fn requests_response(merged: MergedWindow, window: &PageWindow) -> AggregateResponse {
    let has_more = if window.lookahead {
        merged.collected_past(window)
    } else {
        merged.records.len() == window.page_size
    };
    let error = merged.first_failure().map(ToString::to_string);
    let success = !merged.all_failed();
    debug!(
        page = window.page,
        returned = merged.records.len(),
        success,
        "requests page assembled"
    );
    AggregateResponse {
        success,
        has_more: Some(has_more),
        total_count: Some(merged.total_count),
        total_pages: Some(merged.total_pages),
        error,
        data: merged.records,
    }
}

fn failure(records: Vec<Record>, err: AggregateError) -> AggregateResponse {
    AggregateResponse {
        success: false,
        data: records,
        has_more: None,
        total_count: None,
        total_pages: None,
        error: Some(err.to_string()),
    }
}
