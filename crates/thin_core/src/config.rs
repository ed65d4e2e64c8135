//! Store configuration.
//!
//! # Responsibility
//! - Describe where the submission store lives and how the pool is sized.
//! - Read that description from the process environment.
//!
//! # Invariants
//! - `DATABASE_URL` is mandatory; everything else has a default.
//! - `pool_size` is always at least 1.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Location of the store: a plain path or a `sqlite://<path>` URL.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Maximum number of pooled connections.
pub const POOL_SIZE_VAR: &str = "THIN_POOL_SIZE";
/// Milliseconds to wait for a pooled connection before failing.
pub const ACQUIRE_TIMEOUT_VAR: &str = "THIN_ACQUIRE_TIMEOUT_MS";

const DEFAULT_POOL_SIZE: usize = 16;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(30_000);
const SQLITE_URL_PREFIX: &str = "sqlite://";
const FILE_URI_PREFIX: &str = "file:";
const IN_MEMORY_PATH: &str = ":memory:";

/// Configuration error raised while reading the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    Missing(&'static str),
    /// A variable is set but cannot be parsed.
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "{var} not set"),
            Self::Invalid { var, value, reason } => {
                write!(f, "invalid {var} value `{value}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Store and pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Maximum open connections.
    pub pool_size: usize,
    /// Wait bound for [`ConnectionPool::acquire`](crate::db::ConnectionPool::acquire).
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    /// Creates a config with default pool settings.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Overrides the pool size (clamped to at least 1).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Overrides the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(DATABASE_URL_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
        let mut config = Self::new(parse_database_url(&url)?);

        if let Some(raw) = lookup(POOL_SIZE_VAR) {
            let size = parse_number(POOL_SIZE_VAR, &raw)?;
            if size == 0 {
                return Err(ConfigError::Invalid {
                    var: POOL_SIZE_VAR,
                    value: raw,
                    reason: "must be at least 1",
                });
            }
            config.pool_size = size as usize;
        }

        if let Some(raw) = lookup(ACQUIRE_TIMEOUT_VAR) {
            config.acquire_timeout = Duration::from_millis(parse_number(ACQUIRE_TIMEOUT_VAR, &raw)?);
        }

        Ok(config)
    }
}

fn parse_database_url(url: &str) -> Result<PathBuf, ConfigError> {
    let path = match url.strip_prefix(SQLITE_URL_PREFIX) {
        Some(rest) => rest,
        None if url.contains("://") => {
            return Err(ConfigError::Invalid {
                var: DATABASE_URL_VAR,
                value: url.to_string(),
                reason: "only sqlite:// URLs or plain paths are supported",
            })
        }
        None => url,
    };
    if path.is_empty() {
        return Err(ConfigError::Invalid {
            var: DATABASE_URL_VAR,
            value: url.to_string(),
            reason: "database path cannot be empty",
        });
    }
    // Each pooled connection would open its own private database.
    if is_in_memory(path) {
        return Err(ConfigError::Invalid {
            var: DATABASE_URL_VAR,
            value: url.to_string(),
            reason: "in-memory databases cannot back a connection pool",
        });
    }
    Ok(PathBuf::from(path))
}

fn is_in_memory(path: &str) -> bool {
    if path == IN_MEMORY_PATH {
        return true;
    }
    match path.strip_prefix(FILE_URI_PREFIX) {
        Some(uri) => {
            let (target, query) = uri.split_once('?').unwrap_or((uri, ""));
            target.is_empty()
                || target == IN_MEMORY_PATH
                || query.split('&').any(|param| param == "mode=memory")
        }
        None => false,
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: "expected a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, DATABASE_URL_VAR};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(DATABASE_URL_VAR));
        assert_eq!(err.to_string(), "DATABASE_URL not set");
    }

    #[test]
    fn sqlite_url_and_plain_path_are_accepted() {
        let from_url =
            StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "sqlite:///tmp/thin.db")]))
                .unwrap();
        assert_eq!(from_url.database_path, PathBuf::from("/tmp/thin.db"));

        let from_path =
            StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "data/thin.db")])).unwrap();
        assert_eq!(from_path.database_path, PathBuf::from("data/thin.db"));
        assert_eq!(from_path.pool_size, 16);
        assert_eq!(from_path.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn in_memory_databases_are_rejected() {
        for url in [
            ":memory:",
            "sqlite://:memory:",
            "file::memory:",
            "file:thin?mode=memory&cache=shared",
            "sqlite://file:thin.db?mode=memory",
        ] {
            let err = StoreConfig::from_lookup(lookup(&[("DATABASE_URL", url)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { .. }),
                "{url} should be rejected"
            );
        }

        let on_disk =
            StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "file:thin.db?mode=rwc")]))
                .unwrap();
        assert_eq!(on_disk.database_path, PathBuf::from("file:thin.db?mode=rwc"));
    }

    #[test]
    fn foreign_url_scheme_is_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[(
            "DATABASE_URL",
            "postgresql://localhost/thin",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn pool_settings_are_parsed_and_validated() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "thin.db"),
            ("THIN_POOL_SIZE", "4"),
            ("THIN_ACQUIRE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));

        let zero = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "thin.db"),
            ("THIN_POOL_SIZE", "0"),
        ]));
        assert!(matches!(zero, Err(ConfigError::Invalid { .. })));

        let garbage = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "thin.db"),
            ("THIN_ACQUIRE_TIMEOUT_MS", "soon"),
        ]));
        assert!(matches!(garbage, Err(ConfigError::Invalid { .. })));
    }
}
