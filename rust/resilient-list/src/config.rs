//! List configuration and the fixed storage thresholds.

use resilient_budget_tracker::Budget;
use resilient_common::{Result, verify_arg};

/// Number of slots in one page of a resilient chunk. This is the unit that can be
/// lost individually when a chunk is reclaimed.
pub const CHUNK_SIZE: usize = 1024;

/// Growth requests of at least this many slots are served by a resilient
/// (chunked, reclaimable) segment; smaller ones by a dense segment.
pub const THRESHOLD: usize = CHUNK_SIZE + (CHUNK_SIZE >> 1);

/// Capacity of the dense segment created by the first append.
pub const INITIAL_CAPACITY: usize = 10;

/// Configuration for a `ResilientList`.
#[derive(Debug, Clone)]
pub struct ResilientListConfig {
    /// Capacity of the first segment, allocated lazily on the first append.
    pub initial_capacity: usize,
    /// Budget every segment allocation is charged against. Exhausting it is
    /// treated exactly like a failed system allocation.
    pub budget: Budget,
    /// Upper bound, in bytes, on reclaimable chunk memory kept by the chunk cache.
    /// Registering a chunk beyond this bound evicts older chunks. `None` means
    /// chunks are only reclaimed on an explicit memory-pressure signal.
    pub reclaim_budget: Option<u64>,
}

impl Default for ResilientListConfig {
    fn default() -> Self {
        Self {
            initial_capacity: INITIAL_CAPACITY,
            budget: Budget::unlimited(),
            reclaim_budget: None,
        }
    }
}

impl ResilientListConfig {
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_reclaim_budget(mut self, bytes: u64) -> Self {
        self.reclaim_budget = Some(bytes);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(initial_capacity, self.initial_capacity > 0);
        verify_arg!(reclaim_budget, self.reclaim_budget != Some(0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use resilient_common::ErrorKind;

    use super::*;

    #[test]
    fn test_thresholds() {
        assert_eq!(THRESHOLD, 1536);
        assert_eq!(INITIAL_CAPACITY, 10);
    }

    #[test]
    fn test_default_is_valid() {
        let config = ResilientListConfig::default();
        config.validate().unwrap();
        assert_eq!(config.initial_capacity, INITIAL_CAPACITY);
        assert_eq!(config.budget.remaining(), u64::MAX);
        assert!(config.reclaim_budget.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let err = ResilientListConfig::default()
            .with_initial_capacity(0)
            .validate()
            .unwrap_err();
        match err.kind() {
            ErrorKind::InvalidArgument { name, .. } => assert_eq!(name, "initial_capacity"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_reclaim_budget() {
        assert!(
            ResilientListConfig::default()
                .with_reclaim_budget(0)
                .validate()
                .is_err()
        );
    }
}
