//! JSON transport adapter.
//!
//! The HTTP client, authentication, and header injection live outside this
//! crate behind [`JsonTransport`]. [`EnvelopeSource`] turns a [`PageRequest`]
//! into per-resource query parameters and parses the backend's envelopes:
//! `{ success, data: [...], message? }` for pages and
//! `{ data: { Open, Close } }` for status counts.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::constants::transport::{
    PARAM_BRANCH, PARAM_COMPANY, PARAM_CURSOR, PARAM_DIRECTION, PARAM_DISABLED, PARAM_KIND,
    PARAM_STATUS, UNSPECIFIED_FAILURE,
};
use crate::data::{Page, Record, ResourceKind, ScanDirection, Scope, StatusCounts};
use crate::errors::AggregateError;
use crate::source::{CountSource, PageRequest, RecordSource};

/// Ordered query parameters for one call.
pub type Query = Vec<(String, String)>;

/// Issues one GET and returns the parsed JSON body.
pub trait JsonTransport: Send + Sync {
    /// Fetch `path` with `query`; network/HTTP failures map to `Err`.
    fn get_json(&self, path: &str, query: &Query) -> Result<Value, AggregateError>;
}

/// Paths of the record and count endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    records: HashMap<ResourceKind, String>,
    counts: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        let records = [
            (ResourceKind::Project, "/projects"),
            (ResourceKind::Employee, "/employees"),
            (ResourceKind::Financial, "/finances"),
            (ResourceKind::Request, "/requests"),
        ]
        .into_iter()
        .map(|(kind, path)| (kind, path.to_string()))
        .collect();
        Self {
            records,
            counts: "/requests/count".to_string(),
        }
    }
}

impl Endpoints {
    /// Override the path for `kind`.
    pub fn with_records_path(mut self, kind: ResourceKind, path: impl Into<String>) -> Self {
        self.records.insert(kind, path.into());
        self
    }

    /// Override the count endpoint path.
    pub fn with_counts_path(mut self, path: impl Into<String>) -> Self {
        self.counts = path.into();
        self
    }

    /// Path for `kind`.
    pub fn records_path(&self, kind: ResourceKind) -> &str {
        self.records
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.as_str())
    }

    /// Path of the count endpoint.
    pub fn counts_path(&self) -> &str {
        &self.counts
    }
}

#[derive(Deserialize)]
struct RecordEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct CountEnvelope {
    data: StatusCounts,
}

/// Record and count source backed by a [`JsonTransport`].
pub struct EnvelopeSource<T> {
    transport: T,
    endpoints: Endpoints,
}

impl<T: JsonTransport> EnvelopeSource<T> {
    /// Source over `transport` with default endpoint paths.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            endpoints: Endpoints::default(),
        }
    }

    /// Replace the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Query parameters for `request`.
///
/// A descending scan at its start sends no cursor ("newest first").
pub fn page_query(request: &PageRequest) -> Query {
    let mut query = scope_query(&request.scope);
    let descending_start =
        request.cursor.direction == ScanDirection::Descending && request.cursor.is_start();
    if !descending_start {
        query.push((PARAM_CURSOR.to_string(), request.cursor.position.to_string()));
    }
    query.push((
        PARAM_DIRECTION.to_string(),
        request.cursor.direction.as_str().to_string(),
    ));
    if let Some(status) = request.status {
        query.push((PARAM_STATUS.to_string(), status.as_str().to_string()));
    }
    if request.kind == ResourceKind::Employee {
        query.push((
            PARAM_DISABLED.to_string(),
            request.include_disabled.to_string(),
        ));
    }
    query
}

fn scope_query(scope: &Scope) -> Query {
    let mut query = vec![(PARAM_COMPANY.to_string(), scope.company_id.clone())];
    if let Some(branch) = &scope.branch_id {
        query.push((PARAM_BRANCH.to_string(), branch.clone()));
    }
    if let Some(filter) = &scope.kind_filter {
        query.push((PARAM_KIND.to_string(), filter.clone()));
    }
    query
}

/// Parse a page envelope for `kind`.
///
/// Non-object entries in `data` are dropped; a missing `data` array on a
/// successful envelope reads as an empty page.
pub fn parse_page(kind: ResourceKind, body: Value) -> Result<Page, AggregateError> {
    let envelope: RecordEnvelope = serde_json::from_value(body)?;
    if !envelope.success {
        let message = envelope
            .message
            .or(envelope.error)
            .unwrap_or_else(|| UNSPECIFIED_FAILURE.to_string());
        return Ok(Page::failed(message));
    }
    let records = match envelope.data {
        Some(Value::Array(items)) => items.into_iter().filter_map(Record::from_value).collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(AggregateError::logical(
                kind,
                format!("expected an array of records, got {}", json_type(&other)),
            ));
        }
    };
    Ok(Page::ok(records))
}

/// Parse a status-count envelope.
pub fn parse_counts(body: Value) -> Result<StatusCounts, AggregateError> {
    serde_json::from_value::<CountEnvelope>(body)
        .map(|envelope| envelope.data)
        .map_err(|err| AggregateError::CountUnavailable {
            reason: err.to_string(),
        })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<T: JsonTransport> RecordSource for EnvelopeSource<T> {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError> {
        let body = self
            .transport
            .get_json(self.endpoints.records_path(request.kind), &page_query(request))?;
        parse_page(request.kind, body)
    }
}

impl<T: JsonTransport> CountSource for EnvelopeSource<T> {
    fn status_counts(&self, scope: &Scope) -> Result<StatusCounts, AggregateError> {
        let body = self
            .transport
            .get_json(self.endpoints.counts_path(), &scope_query(scope))
            .map_err(|err| AggregateError::CountUnavailable {
                reason: err.to_string(),
            })?;
        parse_counts(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::data::StatusPartition;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingTransport {
        calls: Mutex<Vec<(String, Query)>>,
        body: Value,
    }

    impl JsonTransport for RecordingTransport {
        fn get_json(&self, path: &str, query: &Query) -> Result<Value, AggregateError> {
            self.calls
                .lock()
                .expect("recording transport poisoned")
                .push((path.to_string(), query.clone()));
            Ok(self.body.clone())
        }
    }

    fn param<'a>(query: &'a Query, name: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn descending_start_omits_cursor() {
        let request = PageRequest::new(ResourceKind::Request, Scope::company("4"))
            .with_status(StatusPartition::Closed);
        let query = page_query(&request);
        assert_eq!(param(&query, PARAM_CURSOR), None);
        assert_eq!(param(&query, PARAM_STATUS), Some("closed"));
        assert_eq!(param(&query, PARAM_DIRECTION), Some("desc"));

        let moved = request.at(Cursor::at(90, ScanDirection::Descending));
        assert_eq!(param(&page_query(&moved), PARAM_CURSOR), Some("90"));
    }

    #[test]
    fn employee_queries_forward_disabled_flag_verbatim() {
        let request = PageRequest::new(
            ResourceKind::Employee,
            Scope::company("4").with_branch("9"),
        )
        .with_include_disabled(true);
        let query = page_query(&request);
        assert_eq!(param(&query, PARAM_DISABLED), Some("true"));
        assert_eq!(param(&query, PARAM_BRANCH), Some("9"));
        assert_eq!(param(&query, PARAM_CURSOR), Some("0"));
    }

    #[test]
    fn parses_success_and_failure_envelopes() {
        let ok = parse_page(
            ResourceKind::Project,
            json!({"success": true, "data": [{"project_id": 1}, 7]}),
        )
        .unwrap();
        assert!(ok.success);
        assert_eq!(ok.len(), 1);

        let failed = parse_page(
            ResourceKind::Project,
            json!({"success": false, "message": "forbidden"}),
        )
        .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.message.as_deref(), Some("forbidden"));

        let odd = parse_page(ResourceKind::Project, json!({"success": true, "data": "x"}));
        assert!(odd.is_err());
    }

    #[test]
    fn parses_count_envelope() {
        let counts = parse_counts(json!({"data": {"Open": 2, "Close": 5}})).unwrap();
        assert_eq!(counts.total(), 7);
        assert!(matches!(
            parse_counts(json!({"oops": true})),
            Err(AggregateError::CountUnavailable { .. })
        ));
    }

    #[test]
    fn envelope_source_uses_resource_paths() {
        let transport = RecordingTransport {
            calls: Mutex::new(Vec::new()),
            body: json!({"success": true, "data": [{"finance_id": 3}]}),
        };
        let source = EnvelopeSource::new(transport).with_endpoints(
            Endpoints::default().with_records_path(ResourceKind::Financial, "/v2/finance"),
        );
        let request = PageRequest::new(
            ResourceKind::Financial,
            Scope::company("1").with_kind_filter("income"),
        );
        let page = source.fetch_page(&request).unwrap();
        assert_eq!(page.records[0].id(ResourceKind::Financial), Some(3));
        let calls = source.transport().calls.lock().unwrap();
        assert_eq!(calls[0].0, "/v2/finance");
        assert_eq!(param(&calls[0].1, PARAM_KIND), Some("income"));
    }
}
