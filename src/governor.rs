use crate::config::CollectorConfig;

/// Why a collection reached its `Done` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The accumulator reached the requested size.
    TargetReached,
    /// The accumulator reached the absolute safety cap.
    SafetyCap,
    /// `empty_streak_limit` consecutive empty pages were returned.
    EmptyStreak,
    /// `max_iterations` source calls were spent.
    IterationBudget,
    /// The cursor reached the end of the identifier range.
    CursorExhausted,
}

impl StopReason {
    /// Stable label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::TargetReached => "target_reached",
            StopReason::SafetyCap => "safety_cap",
            StopReason::EmptyStreak => "empty_streak",
            StopReason::IterationBudget => "iteration_budget",
            StopReason::CursorExhausted => "cursor_exhausted",
        }
    }
}

/// Enforces the iteration, record-count, and empty-streak limits.
///
/// The collector reports every page through [`SafetyGovernor::observe_page`];
/// once that returns a [`StopReason`] the loop must end.
#[derive(Clone, Debug)]
pub struct SafetyGovernor {
    max_iterations: usize,
    empty_streak_limit: usize,
    safety_cap: usize,
    iterations: usize,
    empty_streak: usize,
}

impl SafetyGovernor {
    /// Governor enforcing `config`'s limits.
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
            empty_streak_limit: config.empty_streak_limit.max(1),
            safety_cap: config.safety_cap.max(1),
            iterations: 0,
            empty_streak: 0,
        }
    }

    /// Check limits that apply before the next source call.
    pub fn before_fetch(&self, accumulated: usize, target: usize) -> Option<StopReason> {
        if accumulated >= target {
            return Some(StopReason::TargetReached);
        }
        if accumulated >= self.safety_cap {
            return Some(StopReason::SafetyCap);
        }
        if self.iterations >= self.max_iterations {
            return Some(StopReason::IterationBudget);
        }
        None
    }

    /// Record one received page and decide whether collection is done.
    pub fn observe_page(
        &mut self,
        page_len: usize,
        accumulated: usize,
        target: usize,
    ) -> Option<StopReason> {
        self.iterations += 1;
        if page_len == 0 {
            self.empty_streak += 1;
            if self.empty_streak >= self.empty_streak_limit {
                return Some(StopReason::EmptyStreak);
            }
        } else {
            self.empty_streak = 0;
        }
        self.before_fetch(accumulated, target)
    }

    /// Record a failed call against the iteration budget.
    pub fn observe_failure(&mut self) {
        self.iterations += 1;
    }

    /// Source calls made so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Current run of consecutive empty pages.
    pub fn empty_streak(&self) -> usize {
        self.empty_streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(
        max_iterations: usize,
        empty_streak_limit: usize,
        safety_cap: usize,
    ) -> SafetyGovernor {
        SafetyGovernor::new(&CollectorConfig {
            max_iterations,
            empty_streak_limit,
            safety_cap,
            ..CollectorConfig::default()
        })
    }

    #[test]
    fn empty_streak_resets_on_non_empty_page() {
        let mut gov = governor(50, 3, 100);
        assert_eq!(gov.observe_page(0, 0, 10), None);
        assert_eq!(gov.observe_page(0, 0, 10), None);
        assert_eq!(gov.observe_page(2, 2, 10), None);
        assert_eq!(gov.empty_streak(), 0);
        assert_eq!(gov.observe_page(0, 2, 10), None);
        assert_eq!(gov.observe_page(0, 2, 10), None);
        assert_eq!(gov.observe_page(0, 2, 10), Some(StopReason::EmptyStreak));
    }

    #[test]
    fn iteration_budget_bounds_calls() {
        let mut gov = governor(2, 10, 100);
        assert_eq!(gov.observe_page(1, 1, 10), None);
        assert_eq!(gov.observe_page(1, 2, 10), Some(StopReason::IterationBudget));
        assert_eq!(gov.iterations(), 2);
    }

    #[test]
    fn target_wins_over_safety_cap_when_both_hit() {
        let gov = governor(10, 10, 5);
        assert_eq!(gov.before_fetch(5, 5), Some(StopReason::TargetReached));
        assert_eq!(gov.before_fetch(5, 8), Some(StopReason::SafetyCap));
        assert_eq!(gov.before_fetch(4, 8), None);
    }

    #[test]
    fn failures_consume_budget() {
        let mut gov = governor(1, 10, 100);
        gov.observe_failure();
        assert_eq!(gov.before_fetch(0, 10), Some(StopReason::IterationBudget));
    }
}
