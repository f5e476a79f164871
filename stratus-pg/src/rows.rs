//! Row to entity mapping.

use stratus_core::{
    ClusterId, DataCenterId, EntityIdType, EntityType, HeartbeatTick, Host, HostId, HostStatus,
    ManagementServerId, PodId, StratusResult, Timestamp, TransferRecord, TransferState,
};
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::corrupt_row;

pub(crate) const HOST_COLUMNS: &str = "id, guid, name, status, management_server_id, \
     last_pinged, sequence, cluster_id, pod_id, data_center_id, disconnected_on, removed, \
     created_at, updated_at";

pub(crate) const TRANSFER_COLUMNS: &str = "id, initial_owner, future_owner, state, created, updated";

fn column<'a, T: FromSql<'a>>(
    row: &'a Row,
    entity_type: EntityType,
    name: &str,
) -> StratusResult<T> {
    row.try_get(name)
        .map_err(|e| corrupt_row(entity_type, format!("column {name}: {e}")))
}

fn id<T: EntityIdType>(row: &Row, entity_type: EntityType, name: &str) -> StratusResult<T> {
    column::<Uuid>(row, entity_type, name).map(T::new)
}

fn opt_id<T: EntityIdType>(
    row: &Row,
    entity_type: EntityType,
    name: &str,
) -> StratusResult<Option<T>> {
    column::<Option<Uuid>>(row, entity_type, name).map(|v| v.map(T::new))
}

pub(crate) fn host_from_row(row: &Row) -> StratusResult<Host> {
    let e = EntityType::Host;
    let status: String = column(row, e, "status")?;
    let status = HostStatus::from_db_str(&status).map_err(|err| corrupt_row(e, err.to_string()))?;

    Ok(Host {
        id: id::<HostId>(row, e, "id")?,
        guid: column(row, e, "guid")?,
        name: column(row, e, "name")?,
        status,
        management_server_id: opt_id::<ManagementServerId>(row, e, "management_server_id")?,
        last_pinged: HeartbeatTick::from_raw(column(row, e, "last_pinged")?),
        sequence: column(row, e, "sequence")?,
        cluster_id: opt_id::<ClusterId>(row, e, "cluster_id")?,
        pod_id: opt_id::<PodId>(row, e, "pod_id")?,
        data_center_id: id::<DataCenterId>(row, e, "data_center_id")?,
        disconnected_on: column::<Option<Timestamp>>(row, e, "disconnected_on")?,
        removed: column::<Option<Timestamp>>(row, e, "removed")?,
        created_at: column(row, e, "created_at")?,
        updated_at: column(row, e, "updated_at")?,
    })
}

pub(crate) fn transfer_from_row(row: &Row) -> StratusResult<TransferRecord> {
    let e = EntityType::Transfer;
    let state: String = column(row, e, "state")?;
    let state =
        TransferState::from_db_str(&state).map_err(|err| corrupt_row(e, err.to_string()))?;

    Ok(TransferRecord {
        host_id: id::<HostId>(row, e, "id")?,
        initial_owner: id::<ManagementServerId>(row, e, "initial_owner")?,
        future_owner: id::<ManagementServerId>(row, e, "future_owner")?,
        state,
        created: column(row, e, "created")?,
        updated: column(row, e, "updated")?,
    })
}

pub(crate) fn hosts_from_rows(rows: &[Row]) -> StratusResult<Vec<Host>> {
    rows.iter().map(host_from_row).collect()
}

pub(crate) fn transfers_from_rows(rows: &[Row]) -> StratusResult<Vec<TransferRecord>> {
    rows.iter().map(transfer_from_row).collect()
}
