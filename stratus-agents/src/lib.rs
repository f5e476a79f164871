//! STRATUS Agents - Host Ownership Coordination
//!
//! Coordination primitives run by every management-server process:
//! - Ownership compare-and-swap over the shared host store
//! - Heartbeat scanning for hosts whose agent went quiet
//! - Ownership transfer records for agent rebalancing
//! - Per-host advisory locks (single process only)
//! - Background jobs and injected counters

pub mod heartbeat;
pub mod jobs;
pub mod locks;
pub mod metrics;
pub mod ownership;
pub mod transfer;

pub use heartbeat::{HeartbeatScanner, ScanReport};
pub use jobs::{heartbeat_scan_task, transfer_reap_task};
pub use locks::{HostLockGuard, HostLocks};
pub use metrics::{CoordinationMetrics, CoordinationSnapshot};
pub use ownership::{CasOutcome, OwnershipCas};
pub use transfer::TransferCoordinator;
