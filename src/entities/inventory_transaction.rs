use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock-affecting events recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Receive,
    Adjustment,
    IssueToWorkOrder,
    CounterSale,
    Return,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Receive => "RECEIVE",
            TransactionType::Adjustment => "ADJUSTMENT",
            TransactionType::IssueToWorkOrder => "ISSUE_TO_WORK_ORDER",
            TransactionType::CounterSale => "COUNTER_SALE",
            TransactionType::Return => "RETURN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RECEIVE" => Some(TransactionType::Receive),
            "ADJUSTMENT" => Some(TransactionType::Adjustment),
            "ISSUE_TO_WORK_ORDER" => Some(TransactionType::IssueToWorkOrder),
            "COUNTER_SALE" => Some(TransactionType::CounterSale),
            "RETURN" => Some(TransactionType::Return),
            _ => None,
        }
    }
}

/// What caused a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceType {
    Purchase,
    Adjustment,
    WorkOrder,
    CounterSale,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Purchase => "PURCHASE",
            ReferenceType::Adjustment => "ADJUSTMENT",
            ReferenceType::WorkOrder => "WORK_ORDER",
            ReferenceType::CounterSale => "COUNTER_SALE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PURCHASE" => Some(ReferenceType::Purchase),
            "ADJUSTMENT" => Some(ReferenceType::Adjustment),
            "WORK_ORDER" => Some(ReferenceType::WorkOrder),
            "COUNTER_SALE" => Some(ReferenceType::CounterSale),
            _ => None,
        }
    }
}

/// Append-only ledger row, one per stock-quantity change. Never updated
/// after creation; a reversal is a new row pointing back at the original.
/// Cost and price columns are snapshots taken at transaction time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub r#type: String, // stored as string, converted to/from TransactionType
    pub part_id: Uuid,
    pub qty_change: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub unit_price: Option<Decimal>,
    pub payment_method: Option<String>,
    pub vendor_name: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub performed_by_employee_id: Uuid,
    pub performed_by_name: Option<String>,
    pub performed_by_role: Option<String>,
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
    #[sea_orm(unique)]
    pub reverses_transaction_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
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
