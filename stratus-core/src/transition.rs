//! Host status transition table.
//!
//! Maps `(current status, event)` to the next status. Pairs without an entry
//! have no transition and the caller is told so; nothing is silently ignored.

use crate::{HostEvent, HostStatus};
use std::collections::HashMap;

use HostEvent::*;
use HostStatus::*;

/// Edges of the standard table, grouped by source status.
const STANDARD_EDGES: &[(HostStatus, &[(HostEvent, HostStatus)])] = &[
    (Creating, &[(AgentConnected, Connecting), (Remove, Removed)]),
    (
        Connecting,
        &[
            (AgentConnected, Connecting),
            (Ping, Connecting),
            (Ready, Up),
            (AgentDisconnected, Disconnected),
            (ManagementServerDown, Disconnected),
            (PingTimeout, Alert),
            (HostDown, Down),
            (Remove, Removed),
        ],
    ),
    (
        Up,
        &[
            (Ping, Up),
            (AgentConnected, Connecting),
            (StartUpdate, Updating),
            (StartMaintenance, Maintenance),
            (StartAgentRebalance, Rebalancing),
            (AgentDisconnected, Disconnected),
            (ManagementServerDown, Disconnected),
            (PingTimeout, Alert),
            (HostDown, Down),
            (Remove, Removed),
        ],
    ),
    (
        Updating,
        &[
            (Ping, Updating),
            (Ready, Up),
            (AgentConnected, Connecting),
            (AgentDisconnected, Disconnected),
            (ManagementServerDown, Disconnected),
            (PingTimeout, Alert),
            (HostDown, Down),
            (Remove, Removed),
        ],
    ),
    (
        Rebalancing,
        &[
            (Ping, Rebalancing),
            (RebalanceFailed, Up),
            (RebalanceCompleted, Disconnected),
            (AgentDisconnected, Disconnected),
            (ManagementServerDown, Disconnected),
            (PingTimeout, Alert),
            (Remove, Removed),
        ],
    ),
    (
        Maintenance,
        &[
            (Ping, Maintenance),
            (CancelMaintenance, Up),
            (AgentDisconnected, Disconnected),
            (ManagementServerDown, Disconnected),
            (Remove, Removed),
        ],
    ),
    (
        Disconnected,
        &[
            (AgentConnected, Connecting),
            (Ping, Up),
            (PingTimeout, Alert),
            (WaitedTooLong, Alert),
            (HostDown, Down),
            (Remove, Removed),
        ],
    ),
    (Down, &[(AgentConnected, Connecting), (Remove, Removed)]),
    (
        Alert,
        &[
            (AgentConnected, Connecting),
            (Ping, Up),
            (HostDown, Down),
            (Remove, Removed),
        ],
    ),
    (Removed, &[]),
];

/// Pure lookup `(status, event) -> next status`.
///
/// Built once at start-up and shared by reference (usually behind an `Arc`).
#[derive(Debug, Clone)]
pub struct StatusTransitionTable {
    edges: HashMap<(HostStatus, HostEvent), HostStatus>,
}

impl StatusTransitionTable {
    /// The standard host connectivity table.
    pub fn standard() -> Self {
        let edges = STANDARD_EDGES
            .iter()
            .flat_map(|(from, outgoing)| {
                outgoing
                    .iter()
                    .map(move |(event, to)| ((*from, *event), *to))
            })
            .collect();
        Self { edges }
    }

    /// Next status, or `None` when the event is not accepted in `current`.
    pub fn next(&self, current: HostStatus, event: HostEvent) -> Option<HostStatus> {
        self.edges.get(&(current, event)).copied()
    }

    /// Events accepted in `status`.
    pub fn accepted_events(&self, status: HostStatus) -> Vec<HostEvent> {
        HostEvent::ALL
            .into_iter()
            .filter(|event| self.edges.contains_key(&(status, *event)))
            .collect()
    }

    /// Iterate every edge as `(from, event, to)`.
    pub fn edges(&self) -> impl Iterator<Item = (HostStatus, HostEvent, HostStatus)> + '_ {
        self.edges
            .iter()
            .map(|((from, event), to)| (*from, *event, *to))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for StatusTransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(status: HostStatus, event: HostEvent) -> Option<HostStatus> {
        match (status, event) {
            (Creating, AgentConnected) => Some(Connecting),
            (Creating, Remove) => Some(Removed),

            (Connecting, AgentConnected | Ping) => Some(Connecting),
            (Connecting, Ready) => Some(Up),
            (Connecting, AgentDisconnected | ManagementServerDown) => Some(Disconnected),
            (Connecting, PingTimeout) => Some(Alert),
            (Connecting, HostDown) => Some(Down),
            (Connecting, Remove) => Some(Removed),

            (Up, Ping) => Some(Up),
            (Up, AgentConnected) => Some(Connecting),
            (Up, StartUpdate) => Some(Updating),
            (Up, StartMaintenance) => Some(Maintenance),
            (Up, StartAgentRebalance) => Some(Rebalancing),
            (Up, AgentDisconnected | ManagementServerDown) => Some(Disconnected),
            (Up, PingTimeout) => Some(Alert),
            (Up, HostDown) => Some(Down),
            (Up, Remove) => Some(Removed),

            (Updating, Ping) => Some(Updating),
            (Updating, Ready) => Some(Up),
            (Updating, AgentConnected) => Some(Connecting),
            (Updating, AgentDisconnected | ManagementServerDown) => Some(Disconnected),
            (Updating, PingTimeout) => Some(Alert),
            (Updating, HostDown) => Some(Down),
            (Updating, Remove) => Some(Removed),

            (Rebalancing, Ping) => Some(Rebalancing),
            (Rebalancing, RebalanceFailed) => Some(Up),
            (
                Rebalancing,
                RebalanceCompleted | AgentDisconnected | ManagementServerDown,
            ) => Some(Disconnected),
            (Rebalancing, PingTimeout) => Some(Alert),
            (Rebalancing, Remove) => Some(Removed),

            (Maintenance, Ping) => Some(Maintenance),
            (Maintenance, CancelMaintenance) => Some(Up),
            (Maintenance, AgentDisconnected | ManagementServerDown) => Some(Disconnected),
            (Maintenance, Remove) => Some(Removed),

            (Disconnected, AgentConnected) => Some(Connecting),
            (Disconnected, Ping) => Some(Up),
            (Disconnected, PingTimeout | WaitedTooLong) => Some(Alert),
            (Disconnected, HostDown) => Some(Down),
            (Disconnected, Remove) => Some(Removed),

            (Down, AgentConnected) => Some(Connecting),
            (Down, Remove) => Some(Removed),

            (Alert, AgentConnected) => Some(Connecting),
            (Alert, Ping) => Some(Up),
            (Alert, HostDown) => Some(Down),
            (Alert, Remove) => Some(Removed),

            _ => None,
        }
    }

    #[test]
    fn test_every_pair_matches_reference() {
        let table = StatusTransitionTable::standard();
        for status in HostStatus::ALL {
            for event in HostEvent::ALL {
                assert_eq!(
                    table.next(status, event),
                    expected(status, event),
                    "{status} + {event}"
                );
            }
        }
    }

    #[test]
    fn test_edges_respect_ownership_invariant() {
        // Owned targets must be reached by assigning the requester or by
        // keeping an existing owner; unowned targets must clear it.
        let table = StatusTransitionTable::standard();
        for (from, event, to) in table.edges() {
            if to.is_owned() {
                assert!(!event.loses_connection(), "{from} + {event} -> {to}");
                assert!(
                    event.updates_management_server() || from.is_owned(),
                    "{from} + {event} -> {to} leaves no owner"
                );
            } else {
                assert!(
                    event.loses_connection() || !from.is_owned(),
                    "{from} + {event} -> {to} keeps a stale owner"
                );
            }
        }
    }

    #[test]
    fn test_removed_is_terminal() {
        let table = StatusTransitionTable::standard();
        assert!(table.accepted_events(Removed).is_empty());
    }

    #[test]
    fn test_down_host_ignores_ping_timeout() {
        let table = StatusTransitionTable::standard();
        assert_eq!(table.next(Down, PingTimeout), None);
        assert_eq!(table.next(Disconnected, AgentDisconnected), None);
    }

    #[test]
    fn test_remove_accepted_everywhere_but_removed() {
        let table = StatusTransitionTable::standard();
        for status in HostStatus::ALL {
            let next = table.next(status, Remove);
            if status == Removed {
                assert_eq!(next, None);
            } else {
                assert_eq!(next, Some(Removed));
            }
        }
    }

    #[test]
    fn test_edge_count() {
        let table = StatusTransitionTable::standard();
        let listed: usize = STANDARD_EDGES.iter().map(|(_, e)| e.len()).sum();
        assert_eq!(table.len(), listed);
        assert_eq!(table.len(), 52);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = HostStatus> {
        proptest::sample::select(HostStatus::ALL.to_vec())
    }

    fn any_event() -> impl Strategy<Value = HostEvent> {
        proptest::sample::select(HostEvent::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_event_sequences_keep_ownership_consistent(
            events in prop::collection::vec(any_event(), 0..40),
            start in any_status(),
        ) {
            let table = StatusTransitionTable::standard();
            // Model the owner column as a bool and replay the write rules.
            let mut status = start;
            let mut owned = start.is_owned();
            for event in events {
                if let Some(next) = table.next(status, event) {
                    if event.updates_management_server() {
                        owned = !event.loses_connection();
                    }
                    status = next;
                    prop_assert_eq!(owned, status.is_owned());
                }
            }
        }

        #[test]
        fn prop_lookup_is_deterministic(status in any_status(), event in any_event()) {
            let a = StatusTransitionTable::standard();
            let b = StatusTransitionTable::default();
            prop_assert_eq!(a.next(status, event), b.next(status, event));
        }
    }
}
