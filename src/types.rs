/// Resource-specific record identifier used as the pagination cursor.
/// Examples: `101`, `4087`
pub type RecordId = i64;
/// Identifier of the owning company or branch a request is scoped to.
/// Examples: `12`, `branch-7`
pub type ScopeId = String;
/// Server-side type/kind filter forwarded to the record source.
/// Examples: `income`, `expense`, `internal`
pub type KindFilter = String;
/// Fully namespaced, deterministic cache key.
/// Example: `pagewise:v1:employee:c=12:b=3:t=-:cur=0:n=20:dis=0`
pub type CacheKeyString = String;
/// Field name inside a record payload.
/// Examples: `project_id`, `created_at`
pub type FieldName = &'static str;
/// Epoch milliseconds used for cache entry timestamps.
/// Example: `1760572800000`
pub type TimestampMs = i64;
