//! Process configuration.

use std::net::SocketAddr;
use stratus_core::{ConfigError, CoordinationConfig, ManagementServerId};
use stratus_pg::DbConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9090";

/// Everything one management server process needs at start-up.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identity written into `management_server_id` by this process.
    /// Must survive restarts so the process can keep the hosts it owns.
    pub ms_id: ManagementServerId,
    /// Address for `/metrics`, `/health` and `/status`
    pub bind_addr: SocketAddr,
    /// Apply the schema migration before starting the jobs
    pub migrate: bool,
    pub coordination: CoordinationConfig,
    pub db: DbConfig,
}

impl NodeConfig {
    /// Read configuration from the environment.
    ///
    /// # Environment Variables
    /// - `STRATUS_MS_ID`: UUID of this process (required)
    /// - `STRATUS_BIND` (default: 0.0.0.0:9090)
    /// - `STRATUS_MIGRATE` (default: true)
    /// - `STRATUS_*` coordination timings, see `CoordinationConfig::from_env`
    /// - `STRATUS_DB_*` pool settings, see `DbConfig::from_env`
    pub fn from_env() -> Result<Self, ConfigError> {
        let ms_id = parse_ms_id(std::env::var("STRATUS_MS_ID").ok())?;

        let bind = std::env::var("STRATUS_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind.parse().map_err(|e| ConfigError::InvalidValue {
            field: "STRATUS_BIND".to_string(),
            value: bind.clone(),
            reason: format!("{e}"),
        })?;

        let migrate = std::env::var("STRATUS_MIGRATE")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(true);

        let config = Self {
            ms_id,
            bind_addr,
            migrate,
            coordination: CoordinationConfig::from_env(),
            db: DbConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordination.validate()?;
        self.db.validate()
    }
}

/// A fresh id on every start would orphan the hosts owned under the previous
/// one until a peer fences them, so the id is never generated here.
fn parse_ms_id(raw: Option<String>) -> Result<ManagementServerId, ConfigError> {
    let raw = raw.ok_or_else(|| ConfigError::MissingRequired {
        field: "STRATUS_MS_ID".to_string(),
    })?;
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: "STRATUS_MS_ID".to_string(),
        value: raw.clone(),
        reason: "expected a UUID".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::EntityIdType;

    #[test]
    fn test_default_bind_addr_parses() {
        let addr: SocketAddr = DEFAULT_BIND_ADDR.parse().unwrap();
        assert_eq!(addr.port(), 9090);
    }

    #[test]
    fn test_ms_id_is_required() {
        assert!(matches!(
            parse_ms_id(None),
            Err(ConfigError::MissingRequired { ref field }) if field == "STRATUS_MS_ID"
        ));
    }

    #[test]
    fn test_ms_id_is_stable_across_parses() {
        let id = ManagementServerId::now_v7();
        let first = parse_ms_id(Some(id.to_string())).unwrap();
        let second = parse_ms_id(Some(format!(" {id}\n"))).unwrap();
        assert_eq!(first, id);
        assert_eq!(second, id);
        assert!(matches!(
            parse_ms_id(Some("ms-5".to_string())),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_checks_coordination() {
        let config = NodeConfig {
            ms_id: ManagementServerId::now_v7(),
            bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
            migrate: false,
            coordination: CoordinationConfig {
                scan_batch_size: 0,
                ..CoordinationConfig::default()
            },
            db: DbConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
