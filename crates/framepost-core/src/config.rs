//! Runtime-tunable configuration.
//!
//! A fixed table of keys, each with a type and bounds. Writes are validated
//! against the table; reads come through typed getters so call sites never
//! parse strings. The operator console mutates this through `/set`, `/config`
//! and `/reset`.
//!
//! Values are stored as strings (they arrive from and are displayed to a
//! text console); the definition table is the single source of truth for
//! types, bounds, and defaults.

use std::{collections::HashMap, time::Duration};

use crate::error::ConfigError;

/// Value type of a configuration key.
#[derive(Debug, Clone, Copy)]
enum ConfigKind {
    /// Integer with inclusive bounds
    Int {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },
    /// Boolean (`true`/`false`/`1`/`0` accepted on write)
    Bool,
}

/// Definition of one key: type, bounds, default.
#[derive(Debug, Clone, Copy)]
struct ConfigDef {
    key: &'static str,
    kind: ConfigKind,
    default: &'static str,
}

const fn int(key: &'static str, default: &'static str, min: i64, max: i64) -> ConfigDef {
    ConfigDef { key, kind: ConfigKind::Int { min, max }, default }
}

const fn flag(key: &'static str, default: &'static str) -> ConfigDef {
    ConfigDef { key, kind: ConfigKind::Bool, default }
}

/// The full key table. Order here is the display order of `/config`.
const DEFINITIONS: &[ConfigDef] = &[
    int("HEARTBEAT_INTERVAL_S", "30", 5, 3600),
    int("HEARTBEAT_CHECK_DELAY_S", "5", 1, 60),
    int("HEARTBEAT_TIMEOUT_S", "90", 10, 3600),
    int("CLIENT_TIMEOUT_S", "120", 10, 3600),
    int("MAX_QUEUE_SIZE", "10000", 10, 100000),
    int("THREAD_POOL_SIZE", "12", 1, 128),
    int("MAX_USERNAME_LENGTH", "32", 3, 100),
    int("MAX_SUBJECT_LENGTH", "100", 10, 500),
    flag("AUTO_STOP_WHEN_NO_CLIENTS", "false"),
];

/// Runtime configuration store.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    values: HashMap<&'static str, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfig {
    /// Create a config holding every key at its default.
    pub fn new() -> Self {
        let values =
            DEFINITIONS.iter().map(|def| (def.key, def.default.to_string())).collect();
        Self { values }
    }

    /// Set a key from its string form, validating type and bounds.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownKey`] for a key not in the table
    /// - [`ConfigError::InvalidValue`] when the value does not parse
    /// - [`ConfigError::OutOfRange`] when an integer is outside its bounds
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let def = DEFINITIONS
            .iter()
            .find(|def| def.key == key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        match def.kind {
            ConfigKind::Bool => {
                if !matches!(value, "true" | "false" | "1" | "0") {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        expected: "true/false/1/0",
                    });
                }
            },
            ConfigKind::Int { min, max } => {
                let parsed: i64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    expected: "integer",
                })?;

                if parsed < min || parsed > max {
                    return Err(ConfigError::OutOfRange { key: key.to_string(), min, max });
                }
            },
        }

        self.values.insert(def.key, value.to_string());
        Ok(())
    }

    /// All keys with their current values, in table order.
    pub fn list_all(&self) -> Vec<(&'static str, String)> {
        DEFINITIONS
            .iter()
            .map(|def| (def.key, self.values[def.key].clone()))
            .collect()
    }

    /// Reset every key to its default.
    pub fn reset(&mut self) {
        for def in DEFINITIONS {
            self.values.insert(def.key, def.default.to_string());
        }
    }

    fn get_int(&self, key: &str) -> i64 {
        // INVARIANT: only called with keys from DEFINITIONS, and set()
        // guarantees the stored string parses.
        self.values[key].parse().unwrap_or(0)
    }

    fn get_bool(&self, key: &str) -> bool {
        matches!(self.values[key].as_str(), "true" | "1")
    }

    /// Interval between heartbeat PING rounds.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.get_int("HEARTBEAT_INTERVAL_S") as u64)
    }

    /// Grace delay between the PING round and the timeout sweep.
    pub fn heartbeat_check_delay(&self) -> Duration {
        Duration::from_secs(self.get_int("HEARTBEAT_CHECK_DELAY_S") as u64)
    }

    /// Silence threshold after which a client is evicted.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.get_int("HEARTBEAT_TIMEOUT_S") as u64)
    }

    /// Client-side inactivity timeout.
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.get_int("CLIENT_TIMEOUT_S") as u64)
    }

    /// Dispatcher queue capacity.
    pub fn max_queue_size(&self) -> usize {
        self.get_int("MAX_QUEUE_SIZE") as usize
    }

    /// Bound on concurrently running session tasks.
    pub fn thread_pool_size(&self) -> usize {
        self.get_int("THREAD_POOL_SIZE") as usize
    }

    /// Maximum accepted username length.
    pub fn max_username_length(&self) -> usize {
        self.get_int("MAX_USERNAME_LENGTH") as usize
    }

    /// Maximum accepted subject length.
    pub fn max_subject_length(&self) -> usize {
        self.get_int("MAX_SUBJECT_LENGTH") as usize
    }

    /// Stop the server when the last client disconnects.
    pub fn auto_stop_when_no_clients(&self) -> bool {
        self.get_bool("AUTO_STOP_WHEN_NO_CLIENTS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::new();

        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_check_delay(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(config.client_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_queue_size(), 10000);
        assert_eq!(config.thread_pool_size(), 12);
        assert_eq!(config.max_username_length(), 32);
        assert_eq!(config.max_subject_length(), 100);
        assert!(!config.auto_stop_when_no_clients());
    }

    #[test]
    fn set_validates_bounds() {
        let mut config = RuntimeConfig::new();

        assert!(config.set("HEARTBEAT_INTERVAL_S", "5").is_ok());
        assert!(config.set("HEARTBEAT_INTERVAL_S", "3600").is_ok());

        assert_eq!(
            config.set("HEARTBEAT_INTERVAL_S", "4"),
            Err(ConfigError::OutOfRange {
                key: "HEARTBEAT_INTERVAL_S".to_string(),
                min: 5,
                max: 3600
            })
        );
        assert!(config.set("HEARTBEAT_INTERVAL_S", "3601").is_err());

        // Failed writes leave the previous value in place
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_types() {
        let mut config = RuntimeConfig::new();

        assert_eq!(
            config.set("NO_SUCH_KEY", "1"),
            Err(ConfigError::UnknownKey("NO_SUCH_KEY".to_string()))
        );
        assert!(matches!(
            config.set("MAX_QUEUE_SIZE", "plenty"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set("AUTO_STOP_WHEN_NO_CLIENTS", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bool_accepts_all_four_spellings() {
        let mut config = RuntimeConfig::new();

        for (value, expected) in [("true", true), ("1", true), ("false", false), ("0", false)] {
            config.set("AUTO_STOP_WHEN_NO_CLIENTS", value).unwrap();
            assert_eq!(config.auto_stop_when_no_clients(), expected);
        }
    }

    #[test]
    fn reset_restores_defaults() {
        let mut config = RuntimeConfig::new();

        config.set("MAX_QUEUE_SIZE", "50").unwrap();
        config.set("AUTO_STOP_WHEN_NO_CLIENTS", "true").unwrap();

        config.reset();

        assert_eq!(config.max_queue_size(), 10000);
        assert!(!config.auto_stop_when_no_clients());
    }

    #[test]
    fn list_all_is_in_table_order() {
        let config = RuntimeConfig::new();
        let listed = config.list_all();

        assert_eq!(listed.len(), 9);
        assert_eq!(listed[0].0, "HEARTBEAT_INTERVAL_S");
        assert_eq!(listed[8], ("AUTO_STOP_WHEN_NO_CLIENTS", "false".to_string()));
    }
}
