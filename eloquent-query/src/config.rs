//! Client configuration.
//!
//! ```rust
//! use eloquent_query::{Dialect, EloquentConfig};
//!
//! let config = EloquentConfig::from_toml_str(
//!     r#"
//!     dialect = "mysql"
//!     count_suffix = "Total"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.dialect, Dialect::MySql);
//! assert!(config.quirks().case_insensitive_strings);
//! ```

use chrono::{NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::sql::Dialect;

/// Precision the storage engine keeps for date-time columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPrecision {
    /// Sub-second parts are rounded to the nearest whole second.
    Seconds,
    /// Milliseconds survive a round trip.
    Milliseconds,
}

impl TimestampPrecision {
    /// Round a date-time the way storage would.
    ///
    /// Half a unit or more rounds up, then the remainder is truncated.
    pub fn round(&self, value: NaiveDateTime) -> NaiveDateTime {
        let unit = match self {
            Self::Seconds => 1_000_000_000,
            Self::Milliseconds => 1_000_000,
        };
        let nanos = value.and_utc().timestamp_subsec_nanos() % 1_000_000_000;
        let remainder = nanos % unit;
        let truncated = value - TimeDelta::nanoseconds(remainder as i64);
        if remainder * 2 >= unit {
            truncated + TimeDelta::nanoseconds(unit as i64)
        } else {
            truncated
        }
    }

    /// The current UTC time at this precision.
    pub fn now(&self) -> NaiveDateTime {
        self.round(Utc::now().naive_utc())
    }
}

/// Storage engine behaviour the loader and bulk writer rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuirks {
    /// A multi-row insert reports its first generated id and ids are contiguous.
    pub sequential_ids: bool,
    /// Date-time precision kept by storage.
    pub timestamp_precision: TimestampPrecision,
    /// Booleans read back as 0/1.
    pub booleans_as_integers: bool,
    /// Default string comparison folds case.
    pub case_insensitive_strings: bool,
}

/// Configuration for an [`Eloquent`](crate::Eloquent) client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EloquentConfig {
    /// Target SQL dialect.
    pub dialect: Dialect,
    /// Suffix appended to derived `with_count` column names.
    pub count_suffix: String,
    /// Maximum rows per bulk statement.
    pub bulk_chunk_size: usize,
    /// Overrides for the dialect's storage quirks.
    pub storage: Option<StorageQuirks>,
}

impl Default for EloquentConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            count_suffix: "Count".to_string(),
            bulk_chunk_size: 500,
            storage: None,
        }
    }
}

impl EloquentConfig {
    /// Default configuration for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> QueryResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| {
            QueryError::invalid_configuration(format!("Invalid configuration: {}", e))
                .with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the `with_count` suffix.
    pub fn count_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.count_suffix = suffix.into();
        self
    }

    /// Set the bulk chunk size.
    pub fn bulk_chunk_size(mut self, rows: usize) -> Self {
        self.bulk_chunk_size = rows;
        self
    }

    /// Override storage quirks.
    pub fn storage(mut self, quirks: StorageQuirks) -> Self {
        self.storage = Some(quirks);
        self
    }

    /// Effective storage quirks.
    pub fn quirks(&self) -> StorageQuirks {
        self.storage.unwrap_or_else(|| self.dialect.default_quirks())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> QueryResult<()> {
        if self.bulk_chunk_size == 0 {
            return Err(QueryError::invalid_configuration(
                "bulk_chunk_size must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_defaults() {
        let config = EloquentConfig::default();
        assert_eq!(config.count_suffix, "Count");
        assert_eq!(config.bulk_chunk_size, 500);
        assert_eq!(config.quirks(), Dialect::Sqlite.default_quirks());
    }

    #[test]
    fn test_storage_override_from_toml() {
        let config = EloquentConfig::from_toml_str(
            r#"
            dialect = "sqlite"
            bulk_chunk_size = 50

            [storage]
            sequential_ids = false
            timestamp_precision = "milliseconds"
            booleans_as_integers = true
            case_insensitive_strings = true
            "#,
        )
        .unwrap();

        assert_eq!(config.bulk_chunk_size, 50);
        let quirks = config.quirks();
        assert!(!quirks.sequential_ids);
        assert_eq!(quirks.timestamp_precision, TimestampPrecision::Milliseconds);
    }

    #[test]
    fn test_round_to_nearest_second() {
        let base = chrono::NaiveDate::from_ymd_opt(2017, 6, 3)
            .and_then(|d| d.and_hms_milli_opt(11, 5, 1, 499))
            .unwrap();
        let up = base + TimeDelta::milliseconds(1);

        assert_eq!(TimestampPrecision::Seconds.round(base).and_utc().timestamp_subsec_nanos(), 0);
        assert_eq!(
            TimestampPrecision::Seconds.round(up),
            base.with_nanosecond(0).unwrap() + TimeDelta::seconds(1)
        );
        assert_eq!(TimestampPrecision::Milliseconds.round(base), base);
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let err = EloquentConfig::from_toml_str("bulk_chunk_size = 0").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::InvalidConfiguration);
    }
}
