use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use crate::types::{FieldName, KindFilter, RecordId, ScopeId};

/// Resource classes served by the dashboard backend.
///
/// Each kind fixes its identifier field, its timestamp field, and the scan
/// direction the record source paginates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Projects owned by a company or branch.
    Project,
    /// Employees of a company or branch.
    Employee,
    /// Financial lines (income/expense entries).
    Financial,
    /// Requests/tickets, split server-side into open and closed streams.
    Request,
}

impl ResourceKind {
    /// All resource kinds in canonical order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Project,
        ResourceKind::Employee,
        ResourceKind::Financial,
        ResourceKind::Request,
    ];

    /// Stable lowercase name used in cache keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Employee => "employee",
            ResourceKind::Financial => "financial",
            ResourceKind::Request => "request",
        }
    }

    /// Field carrying the cursor identifier.
    pub fn id_field(self) -> FieldName {
        match self {
            ResourceKind::Project => "project_id",
            ResourceKind::Employee => "employee_id",
            ResourceKind::Financial => "finance_id",
            ResourceKind::Request => "request_id",
        }
    }

    /// Secondary timestamp field used as a sort tie-break.
    pub fn timestamp_field(self) -> FieldName {
        match self {
            ResourceKind::Project => "created_at",
            ResourceKind::Employee => "created_at",
            ResourceKind::Financial => "date",
            ResourceKind::Request => "request_date",
        }
    }

    /// Scan direction dictated by the record source contract.
    pub fn direction(self) -> ScanDirection {
        match self {
            ResourceKind::Request => ScanDirection::Descending,
            _ => ScanDirection::Ascending,
        }
    }

    /// Returns `true` for resources paginated as two status partitions.
    pub fn is_dual_stream(self) -> bool {
        matches!(self, ResourceKind::Request)
    }

    /// Whether the backend's `disabled` field actually marks an active record.
    ///
    /// The employee endpoint stores `disabled = true` for active staff. This
    /// mirrors what the system of record does today and is not corrected here.
    pub fn disabled_means_active(self) -> bool {
        matches!(self, ResourceKind::Employee)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which a record source returns identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanDirection {
    /// Records with identifiers strictly greater than the cursor, ascending.
    Ascending,
    /// Records with identifiers strictly less than the cursor, descending.
    Descending,
}

impl ScanDirection {
    /// Wire name forwarded to the record source.
    pub fn as_str(self) -> &'static str {
        match self {
            ScanDirection::Ascending => "asc",
            ScanDirection::Descending => "desc",
        }
    }
}

/// Status partition of a dual-stream resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusPartition {
    /// Items still awaiting action.
    Open,
    /// Items that were resolved.
    Closed,
}

impl StatusPartition {
    /// Both partitions in the order the merger polls them.
    pub const ALL: [StatusPartition; 2] = [StatusPartition::Open, StatusPartition::Closed];

    /// Wire name forwarded to the record source.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusPartition::Open => "open",
            StatusPartition::Closed => "closed",
        }
    }
}

impl fmt::Display for StatusPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource-scope identifiers attached to every source call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Owning company.
    pub company_id: ScopeId,
    /// Owning branch, when the view is branch-scoped.
    pub branch_id: Option<ScopeId>,
    /// Optional server-side type filter (for example `income`).
    pub kind_filter: Option<KindFilter>,
}

impl Scope {
    /// Company-wide scope.
    pub fn company(company_id: impl Into<ScopeId>) -> Self {
        Self {
            company_id: company_id.into(),
            branch_id: None,
            kind_filter: None,
        }
    }

    /// Narrow the scope to a branch.
    pub fn with_branch(mut self, branch_id: impl Into<ScopeId>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Attach a server-side type filter.
    pub fn with_kind_filter(mut self, filter: impl Into<KindFilter>) -> Self {
        self.kind_filter = Some(filter.into());
        self
    }
}

/// One record as returned by the backend: an opaque field map.
///
/// Records are never mutated by the aggregation layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Wrap a field map.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value; non-objects are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Borrow a raw field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Borrow the full field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Identifier for `kind`, accepting numeric or numeric-string encodings.
    pub fn id(&self, kind: ResourceKind) -> Option<RecordId> {
        match self.fields.get(kind.id_field())? {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Sortable timestamp for `kind` in epoch milliseconds.
    ///
    /// RFC 3339 strings and plain numbers are understood; anything else sorts
    /// last under a descending order.
    pub fn timestamp_key(&self, kind: ResourceKind) -> i64 {
        match self.fields.get(kind.timestamp_field()) {
            Some(Value::Number(number)) => number.as_i64().unwrap_or(i64::MIN),
            Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.timestamp_millis())
                .unwrap_or(i64::MIN),
            _ => i64::MIN,
        }
    }

    /// Effective "active" state, honoring the kind's `disabled` polarity.
    ///
    /// Records without a `disabled` field count as active.
    pub fn is_active(&self, kind: ResourceKind) -> bool {
        let Some(disabled) = self.fields.get("disabled").and_then(Value::as_bool) else {
            return true;
        };
        if kind.disabled_means_active() {
            disabled
        } else {
            !disabled
        }
    }

    /// Consume the record and return its field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// Response to one record source call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    /// Records in source order (size chosen by the server).
    pub records: Vec<Record>,
    /// `false` when the envelope reported a logical failure.
    pub success: bool,
    /// Optional server message accompanying a failure.
    pub message: Option<String>,
}

impl Page {
    /// Successful page holding `records`.
    pub fn ok(records: Vec<Record>) -> Self {
        Self {
            records,
            success: true,
            message: None,
        }
    }

    /// Logical failure page.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            success: false,
            message: Some(message.into()),
        }
    }

    /// Returns `true` when the page carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records in the page.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Open/closed totals reported by the auxiliary count endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Open item count.
    #[serde(rename = "Open", default)]
    pub open: u64,
    /// Closed item count.
    #[serde(rename = "Close", default)]
    pub closed: u64,
}

impl StatusCounts {
    /// Combined total across both partitions.
    pub fn total(&self) -> u64 {
        self.open.saturating_add(self.closed)
    }
}

/// Uniform envelope handed to the UI layer for every resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    /// `false` when a fetch error interrupted aggregation.
    pub success: bool,
    /// Collected records (possibly partial on failure).
    pub data: Vec<Record>,
    /// Whether the UI should enable "next".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    /// Total item count, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Total page count, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
