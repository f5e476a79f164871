//! SQL for the conditional host update.
//!
//! The predicate and the assignments depend on the event's facets, so the
//! statement is assembled per call. Parameters are numbered in bind order.

use stratus_core::EntityIdType;
use stratus_storage::{ConditionalUpdate, OwnerChange};
use tokio_postgres::types::ToSql;

type Param = Box<dyn ToSql + Sync + Send>;

/// A parameterised statement with owned bind values.
#[derive(Default)]
pub(crate) struct Statement {
    sql: String,
    params: Vec<Param>,
}

impl Statement {
    /// Add a bind value and return its placeholder.
    fn bind<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    /// Build the compare-and-swap `UPDATE` for `update`.
    pub(crate) fn conditional_update(update: &ConditionalUpdate) -> Self {
        let mut stmt = Self::default();
        let now = stmt.bind(update.now);

        let mut set = vec![
            format!("status = {}", stmt.bind(update.new_status.as_db_str())),
            format!("updated_at = {now}"),
        ];
        match update.owner {
            OwnerChange::Keep => {}
            OwnerChange::Assign(ms) => {
                set.push(format!("management_server_id = {}", stmt.bind(ms.as_uuid())));
            }
            OwnerChange::Release => {
                set.push("management_server_id = NULL".to_string());
                set.push(format!("disconnected_on = {now}"));
            }
        }
        if let Some(tick) = update.last_pinged {
            set.push(format!("last_pinged = {}", stmt.bind(tick.raw())));
        }
        if update.decommission {
            set.push("guid = NULL".to_string());
            set.push("cluster_id = NULL".to_string());
            set.push("pod_id = NULL".to_string());
            set.push(format!("removed = {now}"));
        }

        let mut predicate = vec![
            format!("id = {}", stmt.bind(update.host_id.as_uuid())),
            format!("status = {}", stmt.bind(update.expected_status.as_db_str())),
        ];
        if let Some(tick) = update.expected_last_pinged {
            predicate.push(format!("last_pinged = {}", stmt.bind(tick.raw())));
        }
        if let Some(check) = update.ownership_check {
            let requester = stmt.bind(check.requester.as_uuid());
            predicate.push(format!(
                "(management_server_id IS NULL OR management_server_id = {requester})"
            ));
        }

        stmt.sql = format!(
            "UPDATE host SET {} WHERE {}",
            set.join(", "),
            predicate.join(" AND ")
        );
        stmt
    }
}
