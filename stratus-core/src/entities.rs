//! Entity structures

use crate::{
    ClusterId, DataCenterId, EntityIdType, HeartbeatTick, HostId, HostStatus,
    ManagementServerId, PodId, Timestamp, TransferState,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// HOST
// ============================================================================

/// One physical host as recorded in the shared store.
///
/// `management_server_id` is set exactly when `status.is_owned()`. Rows are
/// mutated only through conditional updates and are never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    /// Agent-supplied identity, cleared on removal
    pub guid: Option<String>,
    pub name: String,
    pub status: HostStatus,
    pub management_server_id: Option<ManagementServerId>,
    pub last_pinged: HeartbeatTick,
    /// Per-host command counter, advanced independently of status
    pub sequence: i64,
    pub cluster_id: Option<ClusterId>,
    pub pod_id: Option<PodId>,
    pub data_center_id: DataCenterId,
    pub disconnected_on: Option<Timestamp>,
    pub removed: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Host {
    /// A freshly registered host: `Creating`, unowned, never pinged.
    ///
    /// `now` comes from the caller's clock and stamps both audit columns.
    pub fn new(name: impl Into<String>, data_center_id: DataCenterId, now: Timestamp) -> Self {
        Self {
            id: HostId::now_v7(),
            guid: None,
            name: name.into(),
            status: HostStatus::Creating,
            management_server_id: None,
            last_pinged: HeartbeatTick::ZERO,
            sequence: 1,
            cluster_id: None,
            pod_id: None,
            data_center_id,
            disconnected_on: None,
            removed: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    pub fn with_placement(mut self, pod_id: PodId, cluster_id: ClusterId) -> Self {
        self.pod_id = Some(pod_id);
        self.cluster_id = Some(cluster_id);
        self
    }

    /// Place the host in an owned or unowned status directly.
    ///
    /// Only for seeding stores; live transitions go through the CAS path.
    pub fn with_state(
        mut self,
        status: HostStatus,
        owner: Option<ManagementServerId>,
        last_pinged: HeartbeatTick,
    ) -> Self {
        self.status = status;
        self.management_server_id = owner;
        self.last_pinged = last_pinged;
        self
    }

    /// Whether the owner column agrees with the status.
    pub fn ownership_consistent(&self) -> bool {
        self.status.is_owned() == self.management_server_id.is_some()
    }

    pub fn is_owned_by(&self, ms: ManagementServerId) -> bool {
        self.management_server_id == Some(ms)
    }

    pub fn is_removed(&self) -> bool {
        self.status == HostStatus::Removed
    }
}

// ============================================================================
// TRANSFER RECORD
// ============================================================================

/// Advisory record of an in-flight ownership hand-off.
///
/// Never changes `Host::management_server_id` by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub host_id: HostId,
    pub initial_owner: ManagementServerId,
    pub future_owner: ManagementServerId,
    pub state: TransferState,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl TransferRecord {
    pub fn requested(
        host_id: HostId,
        initial_owner: ManagementServerId,
        future_owner: ManagementServerId,
        now: Timestamp,
    ) -> Self {
        Self {
            host_id,
            initial_owner,
            future_owner,
            state: TransferState::TransferRequested,
            created: now,
            updated: now,
        }
    }

    /// Created strictly before `cutoff`.
    pub fn is_older_than(&self, cutoff: Timestamp) -> bool {
        self.created < cutoff
    }
}
