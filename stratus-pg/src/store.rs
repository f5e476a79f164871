//! PostgreSQL implementation of the host and transfer stores.

use ::async_trait::async_trait;
use deadpool_postgres::Pool;
use stratus_core::{
    CoordinationError, EntityIdType, EntityType, HeartbeatTick, Host, HostId, HostStatus,
    ManagementServerId, StorageError, StratusResult, Timestamp, TransferRecord, TransferState,
};
use stratus_storage::{ConditionalUpdate, HostStore, TransferStore};

use crate::error::{is_unique_violation, pool_failed, query_failed, transaction_failed};
use crate::rows::{
    host_from_row, hosts_from_rows, transfer_from_row, transfers_from_rows, HOST_COLUMNS,
    TRANSFER_COLUMNS,
};
use crate::statement::Statement;
use crate::DbConfig;

/// Schema for the host and transfer tables. Idempotent.
pub const MIGRATION: &str = include_str!("../sql/V1__host_ownership.sql");

fn status_names(statuses: &[HostStatus]) -> Vec<&'static str> {
    statuses.iter().map(HostStatus::as_db_str).collect()
}

/// Store backed by a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> StratusResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    async fn get_conn(&self) -> StratusResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_failed)
    }

    /// Create the tables and indexes if they do not exist.
    pub async fn migrate(&self) -> StratusResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(MIGRATION).await.map_err(query_failed)?;
        tracing::info!("Host ownership schema applied");
        Ok(())
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgStore")
            .field("size", &status.size)
            .field("max_size", &status.max_size)
            .finish()
    }
}

// ============================================================================
// HOSTS
// ============================================================================

#[async_trait]
impl HostStore for PgStore {
    async fn get_host(&self, id: HostId) -> StratusResult<Option<Host>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &*format!("SELECT {HOST_COLUMNS} FROM host WHERE id = $1"),
                &[&id.as_uuid()],
            )
            .await
            .map_err(query_failed)?;
        row.as_ref().map(host_from_row).transpose()
    }

    async fn find_stale_hosts(
        &self,
        statuses: &[HostStatus],
        cutoff: HeartbeatTick,
        limit: usize,
    ) -> StratusResult<Vec<Host>> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(
                &*format!(
                    "SELECT {HOST_COLUMNS} FROM host \
                     WHERE status = ANY($1) AND last_pinged < $2 \
                     ORDER BY last_pinged, id \
                     LIMIT $3"
                ),
                &[&status_names(statuses), &cutoff.raw(), &limit],
            )
            .await
            .map_err(query_failed)?;
        hosts_from_rows(&rows)
    }

    async fn list_hosts_by_owner(&self, owner: ManagementServerId) -> StratusResult<Vec<Host>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &*format!(
                    "SELECT {HOST_COLUMNS} FROM host WHERE management_server_id = $1 ORDER BY id"
                ),
                &[&owner.as_uuid()],
            )
            .await
            .map_err(query_failed)?;
        hosts_from_rows(&rows)
    }

    async fn insert_host(&self, host: &Host) -> StratusResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            &*format!(
                "INSERT INTO host ({HOST_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ),
            &[
                &host.id.as_uuid(),
                &host.guid,
                &host.name,
                &host.status.as_db_str(),
                &host.management_server_id.map(|id| id.as_uuid()),
                &host.last_pinged.raw(),
                &host.sequence,
                &host.cluster_id.map(|id| id.as_uuid()),
                &host.pod_id.map(|id| id.as_uuid()),
                &host.data_center_id.as_uuid(),
                &host.disconnected_on,
                &host.removed,
                &host.created_at,
                &host.updated_at,
            ],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::InsertFailed {
                    entity_type: EntityType::Host,
                    reason: "already exists".to_string(),
                }
                .into()
            } else {
                query_failed(e)
            }
        })?;
        Ok(())
    }

    async fn update_host_conditional(&self, update: &ConditionalUpdate) -> StratusResult<u64> {
        let stmt = Statement::conditional_update(update);
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(transaction_failed)?;

        let rows = tx
            .execute(stmt.sql(), &stmt.params())
            .await
            .map_err(query_failed)?;

        if rows > 1 {
            tx.rollback().await.map_err(transaction_failed)?;
            tracing::error!(
                host_id = %update.host_id,
                rows,
                "Conditional host update matched several rows, rolled back"
            );
            return Ok(rows);
        }

        tx.commit().await.map_err(transaction_failed)?;
        Ok(rows)
    }

    async fn mark_hosts_disconnected(
        &self,
        owner: ManagementServerId,
        statuses: &[HostStatus],
        now: Timestamp,
    ) -> StratusResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE host \
             SET status = $1, management_server_id = NULL, disconnected_on = $2, updated_at = $2 \
             WHERE management_server_id = $3 AND status = ANY($4)",
            &[
                &HostStatus::Disconnected.as_db_str(),
                &now,
                &owner.as_uuid(),
                &status_names(statuses),
            ],
        )
        .await
        .map_err(query_failed)
    }

    async fn next_sequence(&self, id: HostId) -> StratusResult<i64> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "UPDATE host SET sequence = sequence + 1 WHERE id = $1 RETURNING sequence",
                &[&id.as_uuid()],
            )
            .await
            .map_err(query_failed)?;
        match row {
            Some(row) => row.try_get(0).map_err(query_failed),
            None => Err(StorageError::NotFound {
                entity_type: EntityType::Host,
                id: id.as_uuid(),
            }
            .into()),
        }
    }

    async fn health_check(&self) -> StratusResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_failed)?;
        Ok(())
    }
}

// ============================================================================
// TRANSFERS
// ============================================================================

#[async_trait]
impl TransferStore for PgStore {
    async fn insert_transfer(&self, record: &TransferRecord) -> StratusResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            &*format!("INSERT INTO host_transfer_map ({TRANSFER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"),
            &[
                &record.host_id.as_uuid(),
                &record.initial_owner.as_uuid(),
                &record.future_owner.as_uuid(),
                &record.state.as_db_str(),
                &record.created,
                &record.updated,
            ],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoordinationError::DuplicateTransfer {
                    host_id: record.host_id,
                }
                .into()
            } else {
                query_failed(e)
            }
        })?;
        Ok(())
    }

    async fn get_transfer(&self, host_id: HostId) -> StratusResult<Option<TransferRecord>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &*format!("SELECT {TRANSFER_COLUMNS} FROM host_transfer_map WHERE id = $1"),
                &[&host_id.as_uuid()],
            )
            .await
            .map_err(query_failed)?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn update_transfer_state(
        &self,
        host_id: HostId,
        expected: TransferState,
        new: TransferState,
        now: Timestamp,
    ) -> StratusResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE host_transfer_map SET state = $1, updated = $2 WHERE id = $3 AND state = $4",
            &[
                &new.as_db_str(),
                &now,
                &host_id.as_uuid(),
                &expected.as_db_str(),
            ],
        )
        .await
        .map_err(query_failed)
    }

    async fn delete_transfer(&self, host_id: HostId) -> StratusResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM host_transfer_map WHERE id = $1",
            &[&host_id.as_uuid()],
        )
        .await
        .map_err(query_failed)
    }

    async fn delete_transfer_created_before(
        &self,
        host_id: HostId,
        cutoff: Timestamp,
    ) -> StratusResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM host_transfer_map WHERE id = $1 AND created < $2",
            &[&host_id.as_uuid(), &cutoff],
        )
        .await
        .map_err(query_failed)
    }

    async fn list_transfers_by_initial_owner(
        &self,
        owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &*format!(
                    "SELECT {TRANSFER_COLUMNS} FROM host_transfer_map \
                     WHERE initial_owner = $1 ORDER BY created"
                ),
                &[&owner.as_uuid()],
            )
            .await
            .map_err(query_failed)?;
        transfers_from_rows(&rows)
    }

    async fn list_transfers_by_future_owner(
        &self,
        owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &*format!(
                    "SELECT {TRANSFER_COLUMNS} FROM host_transfer_map \
                     WHERE future_owner = $1 ORDER BY created"
                ),
                &[&owner.as_uuid()],
            )
            .await
            .map_err(query_failed)?;
        transfers_from_rows(&rows)
    }

    async fn find_transfers_created_before(
        &self,
        cutoff: Timestamp,
    ) -> StratusResult<Vec<TransferRecord>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &*format!(
                    "SELECT {TRANSFER_COLUMNS} FROM host_transfer_map \
                     WHERE created < $1 ORDER BY created, id"
                ),
                &[&cutoff],
            )
            .await
            .map_err(query_failed)?;
        transfers_from_rows(&rows)
    }
}
