//! Enum types for STRATUS entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Host,
    Transfer,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityType::Host => "Host",
            EntityType::Transfer => "Transfer",
        };
        f.write_str(value)
    }
}

// ============================================================================
// HOST STATUS
// ============================================================================

/// Connectivity status of a host as recorded in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    /// Registered, agent has never connected
    Creating,
    /// Agent connected to an MS, not yet ready for commands
    Connecting,
    /// Agent connected and ready
    Up,
    /// Agent is being upgraded by its owner
    Updating,
    /// Owner is handing the agent to another MS
    Rebalancing,
    /// Host is in maintenance, agent still connected
    Maintenance,
    /// No MS holds the agent connection
    Disconnected,
    /// Host is known to be down
    Down,
    /// Heartbeat lost, host state unknown
    Alert,
    /// Decommissioned (terminal, soft-removed)
    Removed,
}

impl HostStatus {
    /// Every status, in declaration order.
    pub const ALL: [HostStatus; 10] = [
        HostStatus::Creating,
        HostStatus::Connecting,
        HostStatus::Up,
        HostStatus::Updating,
        HostStatus::Rebalancing,
        HostStatus::Maintenance,
        HostStatus::Disconnected,
        HostStatus::Down,
        HostStatus::Alert,
        HostStatus::Removed,
    ];

    /// Statuses scanned for stale heartbeats.
    pub const LIVE: [HostStatus; 4] = [
        HostStatus::Up,
        HostStatus::Updating,
        HostStatus::Disconnected,
        HostStatus::Down,
    ];

    /// Statuses that imply a live agent connection held by some MS.
    ///
    /// A host record has a non-null owner exactly when its status is in this set.
    pub fn is_owned(&self) -> bool {
        matches!(
            self,
            HostStatus::Connecting
                | HostStatus::Up
                | HostStatus::Updating
                | HostStatus::Rebalancing
                | HostStatus::Maintenance
        )
    }

    /// Whether the heartbeat scanner looks at hosts in this status.
    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HostStatus::Creating => "Creating",
            HostStatus::Connecting => "Connecting",
            HostStatus::Up => "Up",
            HostStatus::Updating => "Updating",
            HostStatus::Rebalancing => "Rebalancing",
            HostStatus::Maintenance => "Maintenance",
            HostStatus::Disconnected => "Disconnected",
            HostStatus::Down => "Down",
            HostStatus::Alert => "Alert",
            HostStatus::Removed => "Removed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, HostStatusParseError> {
        match s.to_lowercase().as_str() {
            "creating" => Ok(HostStatus::Creating),
            "connecting" => Ok(HostStatus::Connecting),
            "up" => Ok(HostStatus::Up),
            "updating" => Ok(HostStatus::Updating),
            "rebalancing" => Ok(HostStatus::Rebalancing),
            "maintenance" => Ok(HostStatus::Maintenance),
            "disconnected" => Ok(HostStatus::Disconnected),
            "down" => Ok(HostStatus::Down),
            "alert" => Ok(HostStatus::Alert),
            "removed" => Ok(HostStatus::Removed),
            _ => Err(HostStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for HostStatus {
    type Err = HostStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid host status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatusParseError(pub String);

impl fmt::Display for HostStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid host status: {}", self.0)
    }
}

impl std::error::Error for HostStatusParseError {}

// ============================================================================
// HOST EVENT
// ============================================================================

/// Connectivity event that drives a host through the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostEvent {
    /// Agent opened a connection to the requesting MS
    AgentConnected,
    /// Heartbeat received by the requesting MS
    Ping,
    /// Agent finished its startup handshake
    Ready,
    /// Owner started an agent upgrade
    StartUpdate,
    /// Owner put the host into maintenance
    StartMaintenance,
    /// Owner took the host out of maintenance
    CancelMaintenance,
    /// Owner began handing the agent to another MS
    StartAgentRebalance,
    /// Hand-off aborted, owner keeps the agent
    RebalanceFailed,
    /// Owner released the agent to its future owner
    RebalanceCompleted,
    /// Agent connection to the owner dropped
    AgentDisconnected,
    /// Owner MS is shutting down gracefully
    ManagementServerDown,
    /// Heartbeat went stale
    PingTimeout,
    /// Agent did not come back on its own
    WaitedTooLong,
    /// Investigation concluded the host is down
    HostDown,
    /// Host is being decommissioned
    Remove,
}

impl HostEvent {
    /// Every event, in declaration order.
    pub const ALL: [HostEvent; 15] = [
        HostEvent::AgentConnected,
        HostEvent::Ping,
        HostEvent::Ready,
        HostEvent::StartUpdate,
        HostEvent::StartMaintenance,
        HostEvent::CancelMaintenance,
        HostEvent::StartAgentRebalance,
        HostEvent::RebalanceFailed,
        HostEvent::RebalanceCompleted,
        HostEvent::AgentDisconnected,
        HostEvent::ManagementServerDown,
        HostEvent::PingTimeout,
        HostEvent::WaitedTooLong,
        HostEvent::HostDown,
        HostEvent::Remove,
    ];

    /// The CAS predicate must also match the requesting MS (or a null owner).
    /// Implies `pins_heartbeat`.
    pub fn check_management_server(&self) -> bool {
        !matches!(
            self,
            HostEvent::PingTimeout
                | HostEvent::WaitedTooLong
                | HostEvent::HostDown
                | HostEvent::Remove
        )
    }

    /// The CAS predicate must match the heartbeat the caller observed.
    ///
    /// Every owner-checked event pins it. Timeout and down verdicts pin it too,
    /// so a ping that lands after the caller's read voids the verdict.
    pub fn pins_heartbeat(&self) -> bool {
        self.check_management_server()
            || matches!(
                self,
                HostEvent::PingTimeout | HostEvent::WaitedTooLong | HostEvent::HostDown
            )
    }

    /// The update writes `management_server_id`.
    pub fn updates_management_server(&self) -> bool {
        matches!(self, HostEvent::AgentConnected | HostEvent::Ping) || self.loses_connection()
    }

    /// The update clears ownership instead of assigning it to the requester.
    pub fn loses_connection(&self) -> bool {
        matches!(
            self,
            HostEvent::RebalanceCompleted
                | HostEvent::AgentDisconnected
                | HostEvent::ManagementServerDown
                | HostEvent::PingTimeout
                | HostEvent::WaitedTooLong
                | HostEvent::HostDown
                | HostEvent::Remove
        )
    }

    /// The event proves the agent is alive and refreshes `last_pinged`.
    pub fn is_liveness(&self) -> bool {
        matches!(self, HostEvent::AgentConnected | HostEvent::Ping)
    }

    /// The event permanently decommissions the host (clears guid and placement).
    pub fn is_decommission(&self) -> bool {
        matches!(self, HostEvent::Remove)
    }

    /// Convert to database/log string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            HostEvent::AgentConnected => "AgentConnected",
            HostEvent::Ping => "Ping",
            HostEvent::Ready => "Ready",
            HostEvent::StartUpdate => "StartUpdate",
            HostEvent::StartMaintenance => "StartMaintenance",
            HostEvent::CancelMaintenance => "CancelMaintenance",
            HostEvent::StartAgentRebalance => "StartAgentRebalance",
            HostEvent::RebalanceFailed => "RebalanceFailed",
            HostEvent::RebalanceCompleted => "RebalanceCompleted",
            HostEvent::AgentDisconnected => "AgentDisconnected",
            HostEvent::ManagementServerDown => "ManagementServerDown",
            HostEvent::PingTimeout => "PingTimeout",
            HostEvent::WaitedTooLong => "WaitedTooLong",
            HostEvent::HostDown => "HostDown",
            HostEvent::Remove => "Remove",
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

// ============================================================================
// TRANSFER STATE
// ============================================================================

/// State of an ownership transfer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferState {
    /// Balancer asked for the move, current owner has not acted yet
    TransferRequested,
    /// Current owner started releasing the host
    TransferStarted,
}

impl TransferState {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TransferState::TransferRequested => "TransferRequested",
            TransferState::TransferStarted => "TransferStarted",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TransferStateParseError> {
        match s.to_lowercase().as_str() {
            "transferrequested" | "requested" => Ok(TransferState::TransferRequested),
            "transferstarted" | "started" => Ok(TransferState::TransferStarted),
            _ => Err(TransferStateParseError(s.to_string())),
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TransferState {
    type Err = TransferStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid transfer state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStateParseError(pub String);

impl fmt::Display for TransferStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid transfer state: {}", self.0)
    }
}

impl std::error::Error for TransferStateParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_status_roundtrip() {
        for status in HostStatus::ALL {
            let parsed = HostStatus::from_db_str(status.as_db_str()).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_host_status_parse_is_case_insensitive() {
        assert_eq!("UP".parse::<HostStatus>().unwrap(), HostStatus::Up);
        assert!("Sleeping".parse::<HostStatus>().is_err());
    }

    #[test]
    fn test_live_set_excludes_removed_and_maintenance() {
        assert!(!HostStatus::Removed.is_live());
        assert!(!HostStatus::Maintenance.is_live());
        assert!(HostStatus::Down.is_live());
    }

    #[test]
    fn test_losing_connection_implies_ownership_update() {
        for event in HostEvent::ALL {
            if event.loses_connection() {
                assert!(event.updates_management_server(), "{event}");
            }
        }
    }

    #[test]
    fn test_liveness_events_check_and_assign_owner() {
        for event in HostEvent::ALL.into_iter().filter(HostEvent::is_liveness) {
            assert!(event.check_management_server());
            assert!(event.updates_management_server());
            assert!(!event.loses_connection());
        }
    }

    #[test]
    fn test_staleness_verdicts_pin_heartbeat_only() {
        for event in [
            HostEvent::PingTimeout,
            HostEvent::WaitedTooLong,
            HostEvent::HostDown,
        ] {
            assert!(event.pins_heartbeat(), "{event}");
            assert!(!event.check_management_server(), "{event}");
        }
        assert!(!HostEvent::Remove.pins_heartbeat());
        for event in HostEvent::ALL {
            if event.check_management_server() {
                assert!(event.pins_heartbeat(), "{event}");
            }
        }
    }

    #[test]
    fn test_transfer_state_roundtrip() {
        for state in [TransferState::TransferRequested, TransferState::TransferStarted] {
            assert_eq!(TransferState::from_db_str(state.as_db_str()).unwrap(), state);
        }
        assert!(TransferState::from_db_str("done").is_err());
    }
}
