use std::time::Duration;

use serde::Deserialize;

use crate::error::{PgFmtError, Result};
use crate::template::DEFAULT_QUERY_CAPACITY;

/// How hard a connection tries to (re)connect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up, unless keep-trying is on
    pub max_attempts: u32,
    pub backoff_floor_ms: u64,
    pub backoff_ceiling_ms: u64,
}

impl RetryPolicy {
    /// Sleep after failed attempt number `attempt` (1-based): one more second
    /// per attempt, starting at the floor and capped at the ceiling.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let step = u64::from(attempt.saturating_sub(1)).saturating_mul(1000);
        let ms = self
            .backoff_floor_ms
            .saturating_add(step)
            .min(self.backoff_ceiling_ms);
        Duration::from_millis(ms)
    }

    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_floor_ms: 0,
            backoff_ceiling_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_floor_ms: 2_000,
            backoff_ceiling_ms: 30_000,
        }
    }
}

/// Settings for one [`Connection`](crate::Connection).
///
/// ```
/// use pgfmt::ConnectionConfig;
///
/// let config = ConnectionConfig::from_toml_str(r#"
///     dbname = "gateway"
///     user = "gw"
///     notices = false
///
///     [retry]
///     max_attempts = 5
/// "#)?;
/// assert_eq!(config.conninfo().as_deref(), Some("dbname=gateway user=gw"));
/// # Ok::<(), pgfmt::PgFmtError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub dbname: Option<String>,
    pub user: Option<String>,
    /// Full libpq-style connection string; wins over `dbname` and `user`
    pub conninfo: Option<String>,
    /// Log plain `NOTICE` messages from the server
    pub notices: bool,
    /// Retry connecting forever instead of `retry.max_attempts` times
    pub keep_trying: bool,
    /// Size of the query buffer in bytes
    pub query_capacity: usize,
    pub retry: RetryPolicy,
}

impl ConnectionConfig {
    pub fn new(dbname: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            dbname: Some(dbname.into()),
            user: Some(user.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PgFmtError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_capacity < 2 {
            return Err(PgFmtError::Config(format!(
                "query_capacity {} is too small",
                self.query_capacity
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(PgFmtError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_floor_ms > self.retry.backoff_ceiling_ms {
            return Err(PgFmtError::Config(
                "retry.backoff_floor_ms exceeds retry.backoff_ceiling_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection string handed to the driver, `None` if nothing identifies
    /// the database.
    pub fn conninfo(&self) -> Option<String> {
        if let Some(conninfo) = &self.conninfo {
            return Some(conninfo.clone());
        }
        let parts: Vec<String> = [("dbname", &self.dbname), ("user", &self.user)]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key}={v}")))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dbname: None,
            user: None,
            conninfo: None,
            notices: true,
            keep_trying: false,
            query_capacity: DEFAULT_QUERY_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conninfo_from_parts() {
        assert_eq!(
            ConnectionConfig::new("db", "me").conninfo().as_deref(),
            Some("dbname=db user=me")
        );

        let only_db = ConnectionConfig {
            dbname: Some("db".to_string()),
            ..ConnectionConfig::default()
        };
        assert_eq!(only_db.conninfo().as_deref(), Some("dbname=db"));

        assert_eq!(ConnectionConfig::default().conninfo(), None);
    }

    #[test]
    fn test_explicit_conninfo_wins() {
        let config = ConnectionConfig {
            conninfo: Some("host=/run/postgresql dbname=x".to_string()),
            ..ConnectionConfig::new("db", "me")
        };
        assert_eq!(
            config.conninfo().as_deref(),
            Some("host=/run/postgresql dbname=x")
        );
    }

    #[test]
    fn test_toml_defaults() {
        let config = ConnectionConfig::from_toml_str("dbname = \"db\"").unwrap();
        assert!(config.notices);
        assert!(!config.keep_trying);
        assert_eq!(config.query_capacity, DEFAULT_QUERY_CAPACITY);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_toml_rejects_bad_values() {
        assert!(matches!(
            ConnectionConfig::from_toml_str("query_capacity = \"big\""),
            Err(PgFmtError::Config(_))
        ));
        assert!(matches!(
            ConnectionConfig::from_toml_str("[retry]\nmax_attempts = 0"),
            Err(PgFmtError::Config(_))
        ));
    }

    #[test]
    fn test_backoff_grows_within_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(3));
        assert_eq!(policy.backoff(28), Duration::from_secs(29));
        assert_eq!(policy.backoff(29), Duration::from_secs(30));
        assert_eq!(policy.backoff(500), Duration::from_secs(30));
        assert_eq!(RetryPolicy::immediate(3).backoff(7), Duration::ZERO);
    }
}
