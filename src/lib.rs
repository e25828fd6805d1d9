#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Per-resource entry points returning the UI envelope.
pub mod aggregate;
/// Result cache, cache stores, and clocks.
pub mod cache;
/// Generic cursor-driven batch collection loop.
pub mod collector;
/// Aggregation configuration types.
pub mod config;
/// Centralized constants used across collectors, merger, cache, and transport.
pub mod constants;
/// Cursor position and advancement rules.
pub mod cursor;
/// Record, page, scope, and response envelope types.
pub mod data;
/// Identifier-keyed accumulation.
pub mod dedup;
/// Reusable example runners shared by demos.
pub mod example_apps;
/// Loop termination limits.
pub mod governor;
/// Open/closed partition merging for status-split resources.
pub mod merge;
/// Record source traits and built-in sources.
pub mod source;
/// JSON envelope transport adapter.
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use aggregate::{Aggregator, CachePolicy, CursorQuery};
pub use cache::{
    CacheKey, CacheStore, Clock, FileCacheStore, ManualClock, MemoryCacheStore, ResultCache,
    SystemClock,
};
pub use collector::{BatchCollector, Collection, CollectionOutcome, CollectionStats};
pub use config::{
    AggregatorConfig, CacheConfig, CollectorConfig, HasMoreMode, MergeConfig, MergeMode,
};
pub use cursor::{Advance, Cursor, CursorAdvancer};
pub use data::{
    AggregateResponse, Page, Record, ResourceKind, ScanDirection, Scope, StatusCounts,
    StatusPartition,
};
pub use dedup::{Accumulator, MergeOutcome};
pub use errors::AggregateError;
pub use governor::{SafetyGovernor, StopReason};
pub use merge::{DualStreamMerger, MergedWindow, PageWindow, PartitionReport};
pub use source::{CountSource, FnSource, InMemorySource, PageRequest, RecordSource, ScriptedSource};
pub use transport::{EnvelopeSource, JsonTransport};
pub use types::{CacheKeyString, KindFilter, RecordId, ScopeId, TimestampMs};
