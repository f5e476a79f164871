//! Coordination configuration

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default heartbeat staleness threshold.
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 60;
/// Default heartbeat scan period.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
/// Default age after which an open transfer record is abandoned.
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 600;
/// Default transfer reap period.
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 60;
/// Default number of re-reads after a lost CAS race.
pub const DEFAULT_CAS_RETRY_LIMIT: u32 = 3;
/// Default maximum stale hosts handled per scan.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 500;

/// Timeouts, intervals and budgets for host ownership coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Hosts whose heartbeat is older than this are timed out
    pub ping_timeout: Duration,

    /// How often the heartbeat scanner runs
    pub scan_interval: Duration,

    /// Transfer records older than this are reaped
    pub transfer_timeout: Duration,

    /// How often the transfer reaper runs
    pub reap_interval: Duration,

    /// Re-reads allowed after a `Raced` outcome in `apply_with_retry`
    pub cas_retry_limit: u32,

    /// Maximum stale hosts returned per scan
    pub scan_batch_size: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            transfer_timeout: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            cas_retry_limit: DEFAULT_CAS_RETRY_LIMIT,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl CoordinationConfig {
    /// Create CoordinationConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATUS_PING_TIMEOUT_SECS` (default: 60)
    /// - `STRATUS_SCAN_INTERVAL_SECS` (default: 10)
    /// - `STRATUS_TRANSFER_TIMEOUT_SECS` (default: 600)
    /// - `STRATUS_REAP_INTERVAL_SECS` (default: 60)
    /// - `STRATUS_CAS_RETRY_LIMIT` (default: 3)
    /// - `STRATUS_SCAN_BATCH_SIZE` (default: 500)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self {
            ping_timeout: Duration::from_secs(env_or(
                "STRATUS_PING_TIMEOUT_SECS",
                DEFAULT_PING_TIMEOUT_SECS,
            )),
            scan_interval: Duration::from_secs(env_or(
                "STRATUS_SCAN_INTERVAL_SECS",
                DEFAULT_SCAN_INTERVAL_SECS,
            )),
            transfer_timeout: Duration::from_secs(env_or(
                "STRATUS_TRANSFER_TIMEOUT_SECS",
                DEFAULT_TRANSFER_TIMEOUT_SECS,
            )),
            reap_interval: Duration::from_secs(env_or(
                "STRATUS_REAP_INTERVAL_SECS",
                DEFAULT_REAP_INTERVAL_SECS,
            )),
            cas_retry_limit: env_or("STRATUS_CAS_RETRY_LIMIT", DEFAULT_CAS_RETRY_LIMIT),
            scan_batch_size: env_or("STRATUS_SCAN_BATCH_SIZE", DEFAULT_SCAN_BATCH_SIZE),
        }
    }

    /// Short timeouts for local clusters and tests.
    pub fn development() -> Self {
        Self {
            ping_timeout: Duration::from_secs(15),
            scan_interval: Duration::from_secs(3),
            transfer_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(10),
            cas_retry_limit: DEFAULT_CAS_RETRY_LIMIT,
            scan_batch_size: 50,
        }
    }

    /// Conservative timeouts for large fleets.
    pub fn production() -> Self {
        Self {
            ping_timeout: Duration::from_secs(90),
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            transfer_timeout: Duration::from_secs(1800),
            reap_interval: Duration::from_secs(120),
            cas_retry_limit: 5,
            scan_batch_size: 2000,
        }
    }

    /// Reject configurations that would make the scanner misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("ping_timeout", self.ping_timeout),
            ("scan_interval", self.scan_interval),
            ("transfer_timeout", self.transfer_timeout),
            ("reap_interval", self.reap_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0s".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.scan_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        // A timeout shorter than one heartbeat tick can never be observed.
        if self.ping_timeout < Duration::from_millis(1 << crate::HEARTBEAT_TICK_SHIFT) {
            return Err(ConfigError::InvalidValue {
                field: "ping_timeout".to_string(),
                value: format!("{:?}", self.ping_timeout),
                reason: "must cover at least one heartbeat tick".to_string(),
            });
        }

        if self.scan_interval > self.ping_timeout {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "scan_interval".to_string(),
                option_b: "ping_timeout".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        CoordinationConfig::default().validate().unwrap();
        CoordinationConfig::development().validate().unwrap();
        CoordinationConfig::production().validate().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = CoordinationConfig {
            scan_interval: Duration::ZERO,
            ..CoordinationConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "scan_interval"));
    }

    #[test]
    fn test_sub_tick_ping_timeout_rejected() {
        let config = CoordinationConfig {
            ping_timeout: Duration::from_millis(500),
            scan_interval: Duration::from_millis(100),
            ..CoordinationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_slower_than_timeout_rejected() {
        let config = CoordinationConfig {
            ping_timeout: Duration::from_secs(5),
            scan_interval: Duration::from_secs(30),
            ..CoordinationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn test_from_env_defaults() {
        // Only asserts fields no other test sets through the environment.
        let config = CoordinationConfig::from_env();
        assert_eq!(config.cas_retry_limit, DEFAULT_CAS_RETRY_LIMIT);
    }
}
