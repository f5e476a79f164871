//! STRATUS Test Utilities
//!
//! Shared test infrastructure for the STRATUS workspace:
//! - Proptest generators for ids, statuses, events and hosts
//! - Fixtures for common ownership scenarios
//! - Assertions for the host ownership invariant

// Re-export mock storage from its source crate
pub use stratus_storage::MockStorage;

// Re-export core types for convenience
pub use stratus_core::{
    Clock, ClusterId, CoordinationConfig, CoordinationError, DataCenterId, EntityIdType,
    HeartbeatTick, Host, HostEvent, HostId, HostStatus, ManagementServerId, ManualClock, PodId,
    StatusTransitionTable, StorageError, StratusError, StratusResult, Timestamp, TransferRecord,
    TransferState,
};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for STRATUS types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_ms_id() -> impl Strategy<Value = ManagementServerId> {
        arb_uuid().prop_map(ManagementServerId::new)
    }

    pub fn arb_host_status() -> impl Strategy<Value = HostStatus> {
        proptest::sample::select(HostStatus::ALL.to_vec())
    }

    pub fn arb_host_event() -> impl Strategy<Value = HostEvent> {
        proptest::sample::select(HostEvent::ALL.to_vec())
    }

    pub fn arb_tick() -> impl Strategy<Value = HeartbeatTick> {
        (0i64..1_000_000).prop_map(HeartbeatTick::from_raw)
    }

    /// A host whose owner column agrees with its status.
    pub fn arb_consistent_host() -> impl Strategy<Value = Host> {
        (arb_host_status(), arb_ms_id(), arb_tick()).prop_map(|(status, ms, tick)| {
            let owner = status.is_owned().then_some(ms);
            Host::new("kvm-prop", DataCenterId::now_v7(), fixtures::epoch())
                .with_state(status, owner, tick)
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built hosts, stores and clocks.

    use super::*;
    use chrono::{TimeZone, Utc};

    /// Fixed start instant so tick arithmetic in tests is exact.
    /// 1_700_000_000_000 ms is a multiple of 1024, so it starts a tick.
    pub fn epoch() -> Timestamp {
        Utc.timestamp_millis_opt(1_700_000_000_000)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn manual_clock() -> ManualClock {
        ManualClock::starting_at(epoch())
    }

    pub fn ms() -> ManagementServerId {
        ManagementServerId::now_v7()
    }

    /// Unowned host that has never connected.
    pub fn registered_host() -> Host {
        Host::new("kvm-fixture", DataCenterId::now_v7(), epoch())
            .with_guid("agent-guid")
            .with_placement(PodId::now_v7(), ClusterId::now_v7())
    }

    /// Host `Up` and owned by `owner`, last pinged at `tick`.
    pub fn up_host(owner: ManagementServerId, tick: HeartbeatTick) -> Host {
        registered_host().with_state(HostStatus::Up, Some(owner), tick)
    }

    /// Host in `status` with an owner iff the status is owned.
    pub fn host_in(status: HostStatus, owner: ManagementServerId, tick: HeartbeatTick) -> Host {
        registered_host().with_state(status, status.is_owned().then_some(owner), tick)
    }

    /// Store seeded with `hosts`.
    pub fn store_with(hosts: impl IntoIterator<Item = Host>) -> MockStorage {
        match MockStorage::new().with_hosts(hosts) {
            Ok(store) => store,
            Err(e) => panic!("seeding mock storage failed: {e}"),
        }
    }

    pub fn fast_config() -> CoordinationConfig {
        CoordinationConfig::development()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for STRATUS invariants.

    use super::*;

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &StratusResult<T>) {
        match result {
            Err(StratusError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Owner column is set exactly when the status is owned.
    #[track_caller]
    pub fn assert_ownership_consistent(host: &Host) {
        assert!(
            host.ownership_consistent(),
            "host {} is {} with owner {:?}",
            host.id,
            host.status,
            host.management_server_id
        );
    }

    /// Every host in the store satisfies the ownership invariant.
    #[track_caller]
    pub fn assert_store_consistent(store: &MockStorage) {
        let hosts = match store.all_hosts() {
            Ok(hosts) => hosts,
            Err(e) => panic!("reading mock storage failed: {e}"),
        };
        for host in &hosts {
            assert_ownership_consistent(host);
        }
    }

    #[track_caller]
    pub fn assert_host_state(
        host: &Host,
        status: HostStatus,
        owner: Option<ManagementServerId>,
    ) {
        assert_eq!(host.status, status, "status of host {}", host.id);
        assert_eq!(
            host.management_server_id, owner,
            "owner of host {}",
            host.id
        );
    }
}
