//! Level to review-delay mapping.

use crate::error::ConfigError;
use crate::models::MAX_LEVEL;
use chrono::Duration;

/// Number of levels, and so of table entries.
pub const LEVEL_COUNT: usize = MAX_LEVEL as usize + 1;

/// Longest delay a table may hold.
pub const MAX_INTERVAL_DAYS: i64 = 365 * 100;

/// Default delays in hours: 4h, 8h, 1d, 3d, then doubling weeks.
const DEFAULT_HOURS: [i64; LEVEL_COUNT] = [4, 8, 24, 72, 168, 336, 672, 1344, 2688, 5376];

/// Strictly increasing table of review delays, one per SRS level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalPolicy {
    steps: Vec<Duration>,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            steps: DEFAULT_HOURS.iter().map(|h| Duration::hours(*h)).collect(),
        }
    }
}

impl IntervalPolicy {
    /// Build a policy, rejecting tables that are the wrong length,
    /// non-positive, not strictly increasing or longer than
    /// [`MAX_INTERVAL_DAYS`].
    pub fn new(steps: Vec<Duration>) -> Result<Self, ConfigError> {
        if steps.len() != LEVEL_COUNT {
            return Err(ConfigError::Invalid(format!(
                "interval table needs {} entries, got {}",
                LEVEL_COUNT,
                steps.len()
            )));
        }
        if let Some(first) = steps.first() {
            if *first <= Duration::zero() {
                return Err(ConfigError::Invalid(
                    "interval for level 0 must be positive".to_string(),
                ));
            }
        }
        for (level, pair) in steps.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(ConfigError::Invalid(format!(
                    "interval for level {} must be longer than level {}",
                    level + 1,
                    level
                )));
            }
        }
        if let Some(last) = steps.last() {
            if *last > Duration::days(MAX_INTERVAL_DAYS) {
                return Err(ConfigError::Invalid(format!(
                    "interval for level {MAX_LEVEL} exceeds {MAX_INTERVAL_DAYS} days"
                )));
            }
        }
        Ok(Self { steps })
    }

    /// Build a policy from whole seconds, as written in the config file.
    pub fn from_secs(secs: &[u64]) -> Result<Self, ConfigError> {
        let steps = secs
            .iter()
            .map(|s| {
                i64::try_from(*s)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| ConfigError::Invalid(format!("interval {s}s out of range")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(steps)
    }

    /// Delay before the next review at `level`. Levels above the table clamp
    /// to the longest delay.
    pub fn interval(&self, level: u8) -> Duration {
        let idx = usize::from(level).min(self.steps.len() - 1);
        self.steps[idx]
    }

    /// Shortest delay, used for items that have no level yet.
    pub fn shortest(&self) -> Duration {
        self.steps[0]
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_table() {
        let policy = IntervalPolicy::default();
        assert_eq!(policy.steps().len(), LEVEL_COUNT);
        assert_eq!(policy.interval(0), Duration::hours(4));
        assert_eq!(policy.interval(2), Duration::days(1));
        assert_eq!(policy.interval(MAX_LEVEL), Duration::weeks(32));
        assert_eq!(policy.shortest(), policy.interval(0));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(IntervalPolicy::new(vec![Duration::hours(1); 3]).is_err());
    }

    #[test]
    fn test_rejects_non_monotonic() {
        let mut steps: Vec<Duration> = (1..=10).map(Duration::hours).collect();
        steps[5] = steps[4];
        assert!(IntervalPolicy::new(steps).is_err());
    }

    #[test]
    fn test_rejects_zero_first_step() {
        assert!(IntervalPolicy::from_secs(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).is_err());
    }

    #[test]
    fn test_rejects_interval_past_ceiling() {
        let secs: Vec<u64> = (0..10).map(|i| 9_000_000_000_000 + i).collect();
        assert!(matches!(
            IntervalPolicy::from_secs(&secs),
            Err(ConfigError::Invalid(_))
        ));

        let mut steps: Vec<Duration> = (1..=10).map(Duration::days).collect();
        steps[9] = Duration::days(MAX_INTERVAL_DAYS);
        assert!(IntervalPolicy::new(steps.clone()).is_ok());
        steps[9] = Duration::days(MAX_INTERVAL_DAYS + 1);
        assert!(IntervalPolicy::new(steps).is_err());
    }

    #[test]
    fn test_compressed_table() {
        let policy = IntervalPolicy::from_secs(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
        assert_eq!(policy.interval(4), Duration::seconds(5));
    }

    #[test]
    fn test_level_above_table_clamps() {
        let policy = IntervalPolicy::default();
        assert_eq!(policy.interval(200), policy.interval(MAX_LEVEL));
    }

    proptest! {
        #[test]
        fn test_default_is_monotonic(level in 0..MAX_LEVEL) {
            let policy = IntervalPolicy::default();
            prop_assert!(policy.interval(level) < policy.interval(level + 1));
        }

        #[test]
        fn test_accepted_tables_are_monotonic(
            mut secs in proptest::collection::vec(1u64..10_000_000, LEVEL_COUNT)
        ) {
            secs.sort_unstable();
            secs.dedup();
            prop_assume!(secs.len() == LEVEL_COUNT);

            let policy = IntervalPolicy::from_secs(&secs).unwrap();
            for level in 0..MAX_LEVEL {
                prop_assert!(policy.interval(level) < policy.interval(level + 1));
            }
        }
    }
}
