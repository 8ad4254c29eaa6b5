//! Configuration for the collections
//!
//! Each structure takes a configuration record at construction. The records
//! collect the tunables that do not need monomorphization; comparators and
//! hashers remain type parameters on the structures themselves.

use shoal_core::{BackOffKind, BitReversal, CounterKind, Error, MemoryModel, Result};

/// Configuration options for the ordered lists
///
/// # Example
///
/// ```
/// use shoal_collections::ListConfig;
/// use shoal_core::MemoryModel;
///
/// let config = ListConfig {
///     memory_model: MemoryModel::SequentialConsistent,
///     stat: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ListConfig {
    /// Memory-ordering model for the list atomics
    pub memory_model: MemoryModel,
    /// Live-item counter flavor
    pub counter: CounterKind,
    /// Back-off strategy on contention
    pub back_off: BackOffKind,
    /// Collect internal event statistics
    pub stat: bool,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            memory_model: MemoryModel::default(),
            counter: CounterKind::default(),
            back_off: BackOffKind::default(),
            stat: false,
        }
    }
}

/// Configuration options for the split-ordered map and set
///
/// `expected_item_count` and `load_factor` size the bucket index: the
/// worst-case bucket count is the smallest power of two not below
/// `expected_item_count / load_factor`. The expandable table starts at two
/// buckets and doubles when the item count crosses
/// `load_factor × bucket_count`; the fixed table is allocated at the
/// worst-case size up front and never grows.
///
/// # Example
///
/// ```
/// use shoal_collections::SplitMapConfig;
///
/// let config = SplitMapConfig {
///     expected_item_count: 10_000,
///     load_factor: 2,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SplitMapConfig {
    /// Expected number of live items
    pub expected_item_count: usize,
    /// Target average items per bucket; growth trigger
    pub load_factor: usize,
    /// Expandable (true, default) or fixed bucket index
    pub dynamic_bucket_table: bool,
    /// Memory-ordering model for list and index atomics
    pub memory_model: MemoryModel,
    /// Live-item counter flavor; [`CounterKind::None`] is rejected because
    /// `is_empty()` is defined in terms of the counter
    pub counter: CounterKind,
    /// Back-off strategy on contention
    pub back_off: BackOffKind,
    /// Algorithm for reversing hash bits
    pub bit_reversal: BitReversal,
    /// Collect internal event statistics
    pub stat: bool,
}

impl Default for SplitMapConfig {
    fn default() -> Self {
        Self {
            expected_item_count: 1024,
            load_factor: 1,
            dynamic_bucket_table: true,
            memory_model: MemoryModel::default(),
            counter: CounterKind::default(),
            back_off: BackOffKind::default(),
            bit_reversal: BitReversal::default(),
            stat: false,
        }
    }
}

impl SplitMapConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.counter == CounterKind::None {
            return Err(Error::InvalidConfiguration(
                "split-ordered set requires an item counter".to_string(),
            ));
        }
        if self.load_factor == 0 {
            return Err(Error::InvalidConfiguration(
                "load factor must be at least 1".to_string(),
            ));
        }
        if self.expected_item_count == 0 {
            return Err(Error::InvalidConfiguration(
                "expected item count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Worst-case bucket count implied by this configuration
    pub(crate) fn max_bucket_count(&self) -> usize {
        let want = self.expected_item_count.div_ceil(self.load_factor).max(2);
        want.next_power_of_two()
    }
}

/// Configuration options for the skip-list set
#[derive(Debug, Clone)]
pub struct SkipListConfig {
    /// Memory-ordering model for the tower atomics
    pub memory_model: MemoryModel,
    /// Live-item counter flavor
    pub counter: CounterKind,
    /// Back-off strategy on contention
    pub back_off: BackOffKind,
    /// Collect internal event statistics
    pub stat: bool,
    /// Denominator of the tower growth probability: a node reaches height
    /// `h + 1` with probability `1 / branching` (default 2, the geometric
    /// distribution with p = 1/2)
    pub branching: u32,
}

impl Default for SkipListConfig {
    fn default() -> Self {
        Self {
            memory_model: MemoryModel::default(),
            counter: CounterKind::default(),
            back_off: BackOffKind::default(),
            stat: false,
            branching: 2,
        }
    }
}

impl SkipListConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.branching < 2 {
            return Err(Error::InvalidConfiguration(
                "branching must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_config_rejects_disabled_counter() {
        let config = SplitMapConfig {
            counter: CounterKind::None,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_split_config_rejects_zero_load_factor() {
        let config = SplitMapConfig {
            load_factor: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_bucket_count_rounds_up_to_power_of_two() {
        let config = SplitMapConfig {
            expected_item_count: 100,
            load_factor: 1,
            ..Default::default()
        };
        assert_eq!(config.max_bucket_count(), 128);

        let config = SplitMapConfig {
            expected_item_count: 100,
            load_factor: 3,
            ..Default::default()
        };
        assert_eq!(config.max_bucket_count(), 64);
    }

    #[test]
    fn test_skiplist_config_rejects_degenerate_branching() {
        let config = SkipListConfig {
            branching: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
