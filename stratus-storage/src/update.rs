//! Conditional host update payload.
//!
//! A `ConditionalUpdate` is the row-level compare-and-swap issued by the
//! ownership protocol: a predicate over the stored row plus the columns to
//! write when it matches. Stores translate it into one atomic statement.

use stratus_core::{HeartbeatTick, Host, HostId, HostStatus, ManagementServerId, Timestamp};

/// Extra predicate for events that verify the requester's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipCheck {
    /// Stored owner must be null or this MS
    pub requester: ManagementServerId,
}

/// What happens to `management_server_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerChange {
    /// Column untouched
    Keep,
    /// Requester becomes the owner
    Assign(ManagementServerId),
    /// Owner cleared and `disconnected_on` stamped
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalUpdate {
    pub host_id: HostId,
    pub expected_status: HostStatus,
    /// Heartbeat the caller observed; must still be the stored one
    pub expected_last_pinged: Option<HeartbeatTick>,
    pub ownership_check: Option<OwnershipCheck>,
    pub new_status: HostStatus,
    pub owner: OwnerChange,
    /// New heartbeat for liveness events
    pub last_pinged: Option<HeartbeatTick>,
    /// Clear guid and cluster placement, stamp `removed`
    pub decommission: bool,
    pub now: Timestamp,
}

impl ConditionalUpdate {
    /// Whether the stored row satisfies the predicate.
    pub fn matches(&self, stored: &Host) -> bool {
        if stored.id != self.host_id || stored.status != self.expected_status {
            return false;
        }
        if self
            .expected_last_pinged
            .is_some_and(|tick| stored.last_pinged != tick)
        {
            return false;
        }
        match self.ownership_check {
            None => true,
            Some(check) => stored
                .management_server_id
                .map_or(true, |owner| owner == check.requester),
        }
    }

    /// Write the new column values into `host`. Does not check the predicate.
    pub fn apply_to(&self, host: &mut Host) {
        host.status = self.new_status;
        match self.owner {
            OwnerChange::Keep => {}
            OwnerChange::Assign(ms) => host.management_server_id = Some(ms),
            OwnerChange::Release => {
                host.management_server_id = None;
                host.disconnected_on = Some(self.now);
            }
        }
        if let Some(tick) = self.last_pinged {
            host.last_pinged = tick;
        }
        if self.decommission {
            host.guid = None;
            host.cluster_id = None;
            host.pod_id = None;
            host.removed = Some(self.now);
        }
        host.updated_at = self.now;
    }

    /// Requester named by the ownership predicate or the owner assignment.
    pub fn requester(&self) -> Option<ManagementServerId> {
        match (self.ownership_check, self.owner) {
            (Some(check), _) => Some(check.requester),
            (None, OwnerChange::Assign(ms)) => Some(ms),
            _ => None,
        }
    }
}
