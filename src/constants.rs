/// Constants used by the cursor advancer and batch collector.
pub mod collector {
    /// Forced cursor increment applied on empty pages and stalled frontiers.
    pub const GAP_JUMP_STEP: i64 = 5;
    /// Consecutive empty pages treated as end-of-data.
    pub const EMPTY_STREAK_LIMIT: usize = 5;
    /// Maximum source calls per collection.
    pub const MAX_ITERATIONS: usize = 50;
    /// Absolute cap on accumulated records per collection.
    pub const SAFETY_CAP: usize = 1_000;
    /// Cursor position an ascending scan starts from.
    pub const ASCENDING_START: i64 = 0;
    /// Cursor position a descending scan starts from ("no upper bound").
    pub const DESCENDING_START: i64 = i64::MAX;
}

/// Constants used by the dual-stream merger.
pub mod merge {
    /// Maximum page fetches per partition during one merge.
    pub const MAX_PARTITION_ITERATIONS: usize = 50;
}

/// Constants used by the local result cache and its persisted layout.
pub mod cache {
    /// Freshness window for cached aggregation results, in seconds.
    pub const DEFAULT_TTL_SECS: u64 = 120;
    /// Namespace prefix for every persisted cache key.
    pub const KEY_NAMESPACE: &str = "pagewise";
    /// Current cache payload format version, part of every key.
    pub const KEY_VERSION: &str = "v1";
    /// Placeholder written into keys for absent scope parts.
    pub const KEY_ABSENT: &str = "-";
    /// Default directory for the file-backed store.
    pub const DEFAULT_STORE_DIR: &str = ".pagewise_cache";
    /// Default data file name for the file-backed store.
    pub const DEFAULT_STORE_FILENAME: &str = "result_cache.bin";
}

/// Constants used by the JSON transport adapter.
pub mod transport {
    /// Query parameter carrying the cursor.
    pub const PARAM_CURSOR: &str = "lastId";
    /// Query parameter carrying the scan direction.
    pub const PARAM_DIRECTION: &str = "order";
    /// Query parameter carrying the owning company.
    pub const PARAM_COMPANY: &str = "companyId";
    /// Query parameter carrying the owning branch.
    pub const PARAM_BRANCH: &str = "branchId";
    /// Query parameter carrying the type filter.
    pub const PARAM_KIND: &str = "type";
    /// Query parameter carrying the status partition.
    pub const PARAM_STATUS: &str = "status";
    /// Query parameter carrying the include-disabled flag.
    pub const PARAM_DISABLED: &str = "disabled";
    /// Fallback message when a failed envelope carries none.
    pub const UNSPECIFIED_FAILURE: &str = "request was not successful";
}
