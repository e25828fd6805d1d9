use std::collections::HashMap;
use std::time::Duration;

use crate::constants::cache::{DEFAULT_TTL_SECS, KEY_VERSION};
use crate::constants::collector::{
    EMPTY_STREAK_LIMIT, GAP_JUMP_STEP, MAX_ITERATIONS, SAFETY_CAP,
};
use crate::constants::merge::MAX_PARTITION_ITERATIONS;
use crate::data::ResourceKind;
use crate::errors::AggregateError;

/// Termination and cursoring limits for one batch collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Source calls allowed before the collector stops regardless of size.
    pub max_iterations: usize,
    /// Consecutive empty pages treated as end-of-data.
    pub empty_streak_limit: usize,
    /// Hard cap on accumulated records.
    pub safety_cap: usize,
    /// Forced cursor step for empty pages and stalled frontiers.
    pub gap_jump_step: i64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            empty_streak_limit: EMPTY_STREAK_LIMIT,
            safety_cap: SAFETY_CAP,
            gap_jump_step: GAP_JUMP_STEP,
        }
    }
}

impl CollectorConfig {
    /// Reject limits that would make a collection meaningless.
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.max_iterations == 0 {
            return Err(AggregateError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.empty_streak_limit == 0 {
            return Err(AggregateError::Configuration(
                "empty_streak_limit must be at least 1".into(),
            ));
        }
        if self.safety_cap == 0 {
            return Err(AggregateError::Configuration(
                "safety_cap must be at least 1".into(),
            ));
        }
        if self.gap_jump_step <= 0 {
            return Err(AggregateError::Configuration(
                "gap_jump_step must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// How the dual-stream merger drives its two partitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Alternate open/closed page fetches until the shared buffer is full.
    #[default]
    Interleaved,
    /// Collect each partition on its own scoped thread, then merge.
    Concurrent,
}

/// Dual-stream merger settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeConfig {
    /// Partition scheduling strategy.
    pub mode: MergeMode,
    /// Page fetches allowed per partition.
    pub max_partition_iterations: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            mode: MergeMode::default(),
            max_partition_iterations: MAX_PARTITION_ITERATIONS,
        }
    }
}

/// Strategy for computing the `hasMore` flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HasMoreMode {
    /// `hasMore = collected == requested` (may misreport at the true end).
    #[default]
    SizeHeuristic,
    /// Collect one record past the requested size and trim it.
    Lookahead,
}

/// Local result cache settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Master switch; disabled caches never read or write.
    pub enabled: bool,
    /// Freshness window.
    pub ttl: Duration,
    /// Key format version; bump to orphan old entries.
    pub key_version: String,
    /// Resources fronted by the cache.
    pub resources: Vec<ResourceKind>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            key_version: KEY_VERSION.to_string(),
            resources: vec![ResourceKind::Employee],
        }
    }
}

impl CacheConfig {
    /// Returns `true` when `kind` should be served through the cache.
    pub fn covers(&self, kind: ResourceKind) -> bool {
        self.enabled && self.resources.contains(&kind)
    }
}

/// Top-level aggregation configuration, injected per [`crate::Aggregator`].
#[derive(Clone, Debug, Default)]
pub struct AggregatorConfig {
    /// Limits applied to every resource without an override.
    pub collector: CollectorConfig,
    /// Per-resource collector overrides.
    pub overrides: HashMap<ResourceKind, CollectorConfig>,
    /// Dual-stream merger settings.
    pub merge: MergeConfig,
    /// Result cache settings.
    pub cache: CacheConfig,
    /// `hasMore` strategy.
    pub has_more: HasMoreMode,
}

impl AggregatorConfig {
    /// Collector limits for `kind`, honoring overrides.
    pub fn collector_for(&self, kind: ResourceKind) -> &CollectorConfig {
        self.overrides.get(&kind).unwrap_or(&self.collector)
    }

    /// Install a per-resource override.
    pub fn with_override(mut self, kind: ResourceKind, config: CollectorConfig) -> Self {
        self.overrides.insert(kind, config);
        self
    }

    /// Validate every collector config and the merge budget.
    pub fn validate(&self) -> Result<(), AggregateError> {
        self.collector.validate()?;
        for config in self.overrides.values() {
            config.validate()?;
        }
        if self.merge.max_partition_iterations == 0 {
            return Err(AggregateError::Configuration(
                "max_partition_iterations must be at least 1".into(),
            ));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(AggregateError::Configuration(
                "cache ttl must be non-zero when the cache is enabled".into(),
            ));
        }
        Ok(())
    }
}
