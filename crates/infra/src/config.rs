//! Configuration loading and representation.
//!
//! Read from the process environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `USE_PERSISTENT_STORES` | `false` | Use Postgres instead of the in-memory store |
//! | `DATABASE_URL` | unset | Postgres URL; required when persistent stores are on |
//! | `HEMOBANK_DB_MAX_CONNECTIONS` | `5` | Pool size |
//! | `HEMOBANK_COMPATIBILITY_FILE` | unset | JSON rules used when there is no database |

use std::path::PathBuf;

use anyhow::{Context, bail};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub compatibility_file: Option<PathBuf>,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            use_persistent_stores: false,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            compatibility_file: None,
        }
    }
}

impl InfraConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_persistent_stores = non_empty("USE_PERSISTENT_STORES")
            .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
            .unwrap_or(false);

        let database_url = non_empty("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }

        let max_connections = match non_empty("HEMOBANK_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("HEMOBANK_DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            bail!("HEMOBANK_DB_MAX_CONNECTIONS must be at least 1");
        }

        let compatibility_file = non_empty("HEMOBANK_COMPATIBILITY_FILE").map(PathBuf::from);

        Ok(Self {
            use_persistent_stores,
            database_url,
            max_connections,
            compatibility_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_in_memory() {
        let config = InfraConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, InfraConfig::default());
    }

    #[test]
    fn persistent_stores_require_database_url() {
        let err = InfraConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn reads_all_settings() {
        let config = InfraConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "1"),
            ("DATABASE_URL", "postgres://bank@localhost/hemobank"),
            ("HEMOBANK_DB_MAX_CONNECTIONS", "12"),
            ("HEMOBANK_COMPATIBILITY_FILE", "/etc/hemobank/compat.json"),
        ]))
        .unwrap();

        assert!(config.use_persistent_stores);
        assert_eq!(config.database_url.as_deref(), Some("postgres://bank@localhost/hemobank"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.compatibility_file, Some(PathBuf::from("/etc/hemobank/compat.json")));
    }

    #[test]
    fn rejects_bad_pool_size() {
        assert!(InfraConfig::from_lookup(lookup(&[("HEMOBANK_DB_MAX_CONNECTIONS", "lots")])).is_err());
        assert!(InfraConfig::from_lookup(lookup(&[("HEMOBANK_DB_MAX_CONNECTIONS", "0")])).is_err());
    }
}
