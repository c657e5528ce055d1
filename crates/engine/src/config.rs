//! Engine configuration.

use chrono::{NaiveDate, Utc};
use tracing::warn;

use crate::placement::PlacementPolicy;

pub const ENV_START_DATE: &str = "STOWAGE_START_DATE";
pub const ENV_DEEP_STORAGE_THRESHOLD: &str = "STOWAGE_DEEP_STORAGE_THRESHOLD";
pub const ENV_LEDGER_CAPACITY: &str = "STOWAGE_LEDGER_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Mission date the simulated clock starts from.
    pub start_date: NaiveDate,
    /// Priority at or above which items are kept near the open face.
    pub deep_storage_threshold: u8,
    /// Maximum number of ledger entries; unbounded when `None`.
    pub ledger_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_date: Utc::now().date_naive(),
            deep_storage_threshold: PlacementPolicy::default().deep_storage_threshold,
            ledger_capacity: None,
        }
    }
}

impl EngineConfig {
    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn with_deep_storage_threshold(mut self, threshold: u8) -> Self {
        self.deep_storage_threshold = threshold;
        self
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = Some(capacity);
        self
    }

    /// Defaults overridden by `STOWAGE_*` environment variables. Malformed
    /// values are reported and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(date) = parse_var(&lookup, ENV_START_DATE) {
            config.start_date = date;
        }
        if let Some(threshold) = parse_var::<u8>(&lookup, ENV_DEEP_STORAGE_THRESHOLD) {
            if (1..=100).contains(&threshold) {
                config.deep_storage_threshold = threshold;
            } else {
                warn!(var = ENV_DEEP_STORAGE_THRESHOLD, threshold, "threshold outside 1-100, using default");
            }
        }
        if let Some(capacity) = parse_var(&lookup, ENV_LEDGER_CAPACITY) {
            config.ledger_capacity = Some(capacity);
        }
        config
    }

    pub fn placement_policy(&self) -> PlacementPolicy {
        PlacementPolicy {
            deep_storage_threshold: self.deep_storage_threshold,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(var = key, value = %raw, error = %e, "ignoring malformed configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_all_variables() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_START_DATE, "2025-03-01"),
            (ENV_DEEP_STORAGE_THRESHOLD, "70"),
            (ENV_LEDGER_CAPACITY, "1000"),
        ]));
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(config.deep_storage_threshold, 70);
        assert_eq!(config.ledger_capacity, Some(1000));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_START_DATE, "yesterday"),
            (ENV_DEEP_STORAGE_THRESHOLD, "250"),
            (ENV_LEDGER_CAPACITY, "-4"),
        ]));
        assert_eq!(config.deep_storage_threshold, 50);
        assert_eq!(config.ledger_capacity, None);
    }

    #[test]
    fn builders_override_defaults() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let config = EngineConfig::default()
            .with_start_date(date)
            .with_deep_storage_threshold(30)
            .with_ledger_capacity(5);
        assert_eq!(config.start_date, date);
        assert_eq!(config.placement_policy().deep_storage_threshold, 30);
        assert_eq!(config.ledger_capacity, Some(5));
    }
}
