//! Audit trail recorder. Every state-affecting operation appends one row
//! here, inside the same transaction as the mutation it describes, so the
//! trail can never show an action that was rolled back.

use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        audit_log::{self, Entity as AuditLog},
        user::{self, Entity as User},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// One audit event to be appended.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: Actor,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        action_type: &str,
        entity_type: &str,
        entity_id: impl ToString,
        actor: &Actor,
    ) -> Self {
        Self {
            action_type: action_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            actor: actor.clone(),
            before: None,
            after: None,
        }
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }
}

/// Filters for reading the trail back.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action_types: Vec<String>,
    pub limit: Option<u64>,
}

#[derive(Clone)]
pub struct AuditService {
    db_pool: Arc<DbPool>,
}

impl AuditService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Appends one audit row on the caller's connection. When called with a
    /// transaction handle the row commits or rolls back with the caller's
    /// own writes. Missing actor name/role are enriched from the user
    /// directory on a best-effort basis; a failed lookup logs a warning and
    /// the row is written without the enrichment.
    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry: AuditEntry,
    ) -> Result<audit_log::Model, ServiceError> {
        let mut name = entry.actor.name.clone();
        let mut role = Some(entry.actor.role.as_str().to_string());

        if name.is_none() {
            match User::find_by_id(entry.actor.employee_id).one(conn).await {
                Ok(Some(user)) => {
                    name = user.name;
                    role = Some(user.role);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        employee_id = %entry.actor.employee_id,
                        error = %e,
                        "Audit actor enrichment lookup failed; recording without name"
                    );
                }
            }
        }

        let row = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            action_type: Set(entry.action_type),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            performed_by_employee_id: Set(Some(entry.actor.employee_id)),
            performed_by_name: Set(name),
            performed_by_role: Set(role),
            before: Set(entry.before),
            after: Set(entry.after),
            timestamp: Set(Utc::now()),
        };

        row.insert(conn).await.map_err(ServiceError::db_error)
    }

    /// Reads the trail back, newest first.
    pub async fn list(&self, filter: AuditFilter) -> Result<Vec<audit_log::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = AuditLog::find();
        if let Some(entity_type) = filter.entity_type {
            query = query.filter(audit_log::Column::EntityType.eq(entity_type));
        }
        if let Some(entity_id) = filter.entity_id {
            query = query.filter(audit_log::Column::EntityId.eq(entity_id));
        }
        if !filter.action_types.is_empty() {
            query = query.filter(audit_log::Column::ActionType.is_in(filter.action_types));
        }

        query
            .order_by_desc(audit_log::Column::Timestamp)
            .limit(filter.limit.unwrap_or(100))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
