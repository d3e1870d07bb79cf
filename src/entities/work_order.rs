use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered progression of a service job. Manual updates may only move
/// forward; clock-in/clock-out and billing finalization advance it
/// automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrderStatus {
    Scheduled,
    InProgress,
    Completed,
    Closed,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Scheduled => "SCHEDULED",
            WorkOrderStatus::InProgress => "IN_PROGRESS",
            WorkOrderStatus::Completed => "COMPLETED",
            WorkOrderStatus::Closed => "CLOSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(WorkOrderStatus::Scheduled),
            "IN_PROGRESS" => Some(WorkOrderStatus::InProgress),
            "COMPLETED" => Some(WorkOrderStatus::Completed),
            "CLOSED" => Some(WorkOrderStatus::Closed),
            _ => None,
        }
    }

    /// Position in the forward-only progression.
    pub fn rank(&self) -> u8 {
        match self {
            WorkOrderStatus::Scheduled => 0,
            WorkOrderStatus::InProgress => 1,
            WorkOrderStatus::Completed => 2,
            WorkOrderStatus::Closed => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedEmployee {
    pub employee_id: Uuid,
    pub role_type: String,
}

/// Snapshot taken when a part is issued. The price and cost captured here
/// are what the customer is billed, regardless of later catalog edits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUsed {
    pub part_id: Uuid,
    pub qty: i32,
    pub selling_price_at_time: Decimal,
    pub cost_at_time: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherCharge {
    pub name: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderNote {
    pub author_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct AssignedEmployees(pub Vec<AssignedEmployee>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct PartsUsed(pub Vec<PartUsed>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct OtherCharges(pub Vec<OtherCharge>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct WorkOrderNotes(pub Vec<WorkOrderNote>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub complaint: Option<String>,
    pub status: String,
    #[sea_orm(column_type = "Json")]
    pub assigned_employees: AssignedEmployees,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub billable_labor_amount: Decimal,
    #[sea_orm(column_type = "Json")]
    pub parts_used: PartsUsed,
    #[sea_orm(column_type = "Json")]
    pub other_charges: OtherCharges,
    #[sea_orm(column_type = "Json")]
    pub notes: WorkOrderNotes,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status(&self) -> Option<WorkOrderStatus> {
        WorkOrderStatus::from_str(&self.status)
    }

    pub fn is_assigned(&self, employee_id: Uuid) -> bool {
        self.assigned_employees
            .0
            .iter()
            .any(|a| a.employee_id == employee_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
