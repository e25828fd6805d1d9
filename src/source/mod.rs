//! Record source interfaces and adapters.
//!
//! Ownership model:
//! - `RecordSource` is the collector-facing interface that returns one page
//!   per call. Page size is chosen by the implementation, never the caller.
//! - `CountSource` exposes the auxiliary open/closed totals used by
//!   dual-stream resources.
//! - `FnSource` adapts a plain closure so each resource path can plug its own
//!   fetch function into the generic collector.

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::data::{Page, ResourceKind, Scope, StatusCounts, StatusPartition};
use crate::errors::AggregateError;

/// In-memory record source emulating the backend's paging quirks.
pub mod memory;
/// Replays canned pages; used to drive collectors through exact sequences.
pub mod scripted;

pub use memory::InMemorySource;
pub use scripted::ScriptedSource;

/// Parameters of one "forward fetch from cursor" call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Resource class being paged.
    pub kind: ResourceKind,
    /// Owning company/branch and type filter.
    pub scope: Scope,
    /// Watermark; the source returns records strictly past it.
    pub cursor: Cursor,
    /// Status partition, for dual-stream resources.
    pub status: Option<StatusPartition>,
    /// Forwarded verbatim to the backend's `disabled` parameter.
    pub include_disabled: bool,
}

impl PageRequest {
    /// Request for `kind` within `scope`, starting at the scan start.
    pub fn new(kind: ResourceKind, scope: Scope) -> Self {
        Self {
            kind,
            scope,
            cursor: Cursor::start_for(kind),
            status: None,
            include_disabled: false,
        }
    }

    /// Same request positioned at `cursor`.
    pub fn at(&self, cursor: Cursor) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    /// Restrict the request to one status partition.
    pub fn with_status(mut self, status: StatusPartition) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the include-disabled flag.
    pub fn with_include_disabled(mut self, include_disabled: bool) -> Self {
        self.include_disabled = include_disabled;
        self
    }
}

/// One page of records per call, given a cursor and page intent.
///
/// Implementations return `Ok(Page)` with `success = false` for logical
/// failures reported by the backend and `Err` for transport failures.
pub trait RecordSource: Send + Sync {
    /// Fetch the page strictly past `request.cursor`.
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError>;
}

/// Auxiliary open/closed count endpoint.
pub trait CountSource: Send + Sync {
    /// Totals for `scope`.
    fn status_counts(&self, scope: &Scope) -> Result<StatusCounts, AggregateError>;
}

impl<T: RecordSource + ?Sized> RecordSource for Arc<T> {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError> {
        (**self).fetch_page(request)
    }
}

impl<T: RecordSource + ?Sized> RecordSource for &T {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError> {
        (**self).fetch_page(request)
    }
}

impl<T: CountSource + ?Sized> CountSource for Arc<T> {
    fn status_counts(&self, scope: &Scope) -> Result<StatusCounts, AggregateError> {
        (**self).status_counts(scope)
    }
}

impl<T: CountSource + ?Sized> CountSource for &T {
    fn status_counts(&self, scope: &Scope) -> Result<StatusCounts, AggregateError> {
        (**self).status_counts(scope)
    }
}

/// `RecordSource` adapter over a fetch closure.
pub struct FnSource<F> {
    fetch: F,
}

impl<F> FnSource<F>
where
    F: Fn(&PageRequest) -> Result<Page, AggregateError> + Send + Sync,
{
    /// Wrap `fetch`.
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> RecordSource for FnSource<F>
where
    F: Fn(&PageRequest) -> Result<Page, AggregateError> + Send + Sync,
{
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError> {
        (self.fetch)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, ScanDirection};
    use serde_json::json;

    #[test]
    fn request_defaults_to_scan_start() {
        let request = PageRequest::new(ResourceKind::Request, Scope::company("1"));
        assert_eq!(request.cursor.direction, ScanDirection::Descending);
        assert!(request.cursor.is_start());
        let moved = request.at(Cursor::at(40, ScanDirection::Descending));
        assert_eq!(moved.cursor.position, 40);
        assert_eq!(moved.scope, request.scope);
    }

    #[test]
    fn closure_sources_see_the_request() {
        let source = FnSource::new(|request: &PageRequest| {
            let id = request.cursor.position + 1;
            Ok(Page::ok(vec![
                Record::from_value(json!({ request.kind.id_field(): id })).unwrap(),
            ]))
        });
        let request = PageRequest::new(ResourceKind::Project, Scope::company("1"));
        let page = source.fetch_page(&request).unwrap();
        assert_eq!(page.records[0].id(ResourceKind::Project), Some(1));

        let shared: Arc<dyn RecordSource> = Arc::new(source);
        assert_eq!(shared.fetch_page(&request).unwrap().len(), 1);
    }
}
