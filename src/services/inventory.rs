//! Inventory ledger. Owns every mutation of part stock fields and the
//! append-only transaction history. All quantity changes go through guarded
//! single-statement updates so concurrent callers cannot oversell, and
//! multi-row effects (part + ledger + expense/payable + audit) commit or
//! abort together.

use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        expense,
        inventory_transaction::{
            self, Entity as InventoryTransaction, ReferenceType, TransactionType,
        },
        part::{self, Entity as Part},
        payable::{self, PayableStatus},
    },
    errors::ServiceError,
    money,
    services::audit::{AuditEntry, AuditService},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// How a stock receipt was paid for. CASH books an expense immediately;
/// CREDIT opens a vendor payable linked to the ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Credit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Credit => "CREDIT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CASH" => Some(PaymentMethod::Cash),
            "CREDIT" => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiveInventoryInput {
    pub part_id: Uuid,
    pub qty: i32,
    pub unit_cost: f64,
    pub selling_price: Option<f64>,
    pub payment_method: String,
    pub vendor_name: Option<String>,
    pub notes: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdjustInventoryInput {
    pub part_id: Uuid,
    pub qty_change: i32,
    pub reason: String,
    pub idempotency_key: Option<String>,
}

/// Updated part snapshot plus the ledger row that changed it. On an
/// idempotent replay the row is the originally created one.
#[derive(Debug, Clone)]
pub struct LedgerOutcome {
    pub part: part::Model,
    pub transaction: inventory_transaction::Model,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub part_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub payment_method: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CreatePartInput {
    pub part_name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub vendor_name: Option<String>,
    pub unit: Option<String>,
    pub reorder_level: Option<i32>,
    pub purchase_price: f64,
    pub selling_price: f64,
}

/// Catalog attribute edits. Stock fields (`on_hand_qty`, `reserved_qty`,
/// `avg_cost`) are deliberately absent; those move only through the ledger.
#[derive(Debug, Clone, Default)]
pub struct UpdatePartInput {
    pub part_name: Option<String>,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub vendor_name: Option<String>,
    pub unit: Option<String>,
    pub reorder_level: Option<i32>,
    pub purchase_price: Option<f64>,
    pub selling_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PartPage {
    pub parts: Vec<part::Model>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    audit: AuditService,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        let audit = AuditService::new(db_pool.clone());
        Self { db_pool, audit }
    }

    /// Receives stock into a part: bumps `on_hand_qty`, recomputes the
    /// weighted-average cost, logs a RECEIVE ledger row, and books the
    /// purchase as an expense (CASH) or an open payable (CREDIT).
    #[instrument(skip(self, input))]
    pub async fn receive(
        &self,
        input: ReceiveInventoryInput,
        actor: &Actor,
    ) -> Result<LedgerOutcome, ServiceError> {
        money::ensure_positive_qty(input.qty, "qty")?;
        let unit_cost = money::ensure_money(input.unit_cost, "unitCost")?;
        let selling_price = input
            .selling_price
            .map(|p| money::ensure_money(p, "sellingPrice"))
            .transpose()?;
        let method = PaymentMethod::from_str(&input.payment_method).ok_or_else(|| {
            ServiceError::InvalidInput("paymentMethod must be CASH or CREDIT".to_string())
        })?;

        if let Some(existing) = self.replay_by_key(input.idempotency_key.as_deref()).await? {
            let part = self.get_part(existing.part_id).await?;
            info!(
                transaction_id = %existing.id,
                "Receive replayed by idempotency key; no mutation applied"
            );
            return Ok(LedgerOutcome {
                part,
                transaction: existing,
            });
        }

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, LedgerOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let part = Part::find_by_id(input.part_id)
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Part {} not found", input.part_id))
                    })?;

                let new_avg =
                    money::weighted_average_cost(part.avg_cost, part.on_hand_qty, unit_cost, input.qty);

                let mut update = Part::update_many()
                    .col_expr(
                        part::Column::OnHandQty,
                        Expr::col(part::Column::OnHandQty).add(input.qty),
                    )
                    .col_expr(part::Column::AvgCost, Expr::value(new_avg))
                    .col_expr(part::Column::PurchasePrice, Expr::value(unit_cost))
                    .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(part::Column::Id.eq(part.id));
                if let Some(price) = selling_price {
                    update = update.col_expr(part::Column::SellingPrice, Expr::value(price));
                }
                update.exec(txn).await.map_err(ServiceError::db_error)?;

                let part = Self::reload_part(txn, input.part_id).await?;

                let transaction = inventory_transaction::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    r#type: Set(TransactionType::Receive.as_str().to_string()),
                    part_id: Set(part.id),
                    qty_change: Set(input.qty),
                    unit_cost: Set(unit_cost),
                    unit_price: Set(selling_price),
                    payment_method: Set(Some(method.as_str().to_string())),
                    vendor_name: Set(input.vendor_name.clone()),
                    reference_type: Set(Some(ReferenceType::Purchase.as_str().to_string())),
                    reference_id: Set(None),
                    performed_by_employee_id: Set(actor.employee_id),
                    performed_by_name: Set(actor.name.clone()),
                    performed_by_role: Set(Some(actor.role.as_str().to_string())),
                    idempotency_key: Set(input.idempotency_key.clone()),
                    reverses_transaction_id: Set(None),
                    notes: Set(input.notes.clone()),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                let total_cost = unit_cost * Decimal::from(input.qty);
                match method {
                    PaymentMethod::Cash => {
                        expense::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            category: Set("Supplies".to_string()),
                            amount: Set(total_cost),
                            expense_date: Set(Utc::now()),
                            note: Set(Some(format!(
                                "Received {} x {} ({}) from {}",
                                input.qty,
                                part.part_name,
                                part.sku,
                                input.vendor_name.as_deref().unwrap_or("unknown vendor"),
                            ))),
                            created_at: Set(Utc::now()),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    }
                    PaymentMethod::Credit => {
                        payable::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            category: Set("Supplies".to_string()),
                            amount: Set(total_cost),
                            purchase_date: Set(Utc::now()),
                            status: Set(PayableStatus::Open.as_str().to_string()),
                            part_id: Set(Some(part.id)),
                            transaction_id: Set(Some(transaction.id)),
                            vendor_name: Set(input.vendor_name.clone()),
                            qty: Set(Some(input.qty)),
                            unit_cost: Set(Some(unit_cost)),
                            created_by_employee_id: Set(Some(actor.employee_id)),
                            created_by_name: Set(actor.name.clone()),
                            created_by_role: Set(Some(actor.role.as_str().to_string())),
                            note: Set(input.notes.clone()),
                            created_at: Set(Utc::now()),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    }
                }

                audit
                    .record(
                        txn,
                        AuditEntry::new("INVENTORY_RECEIVE", "PART", part.id, &actor).with_after(
                            serde_json::json!({
                                "transactionId": transaction.id,
                                "qty": input.qty,
                                "unitCost": money::to_f64(&unit_cost),
                                "paymentMethod": method.as_str(),
                                "onHandQty": part.on_hand_qty,
                                "avgCost": money::to_f64(&part.avg_cost),
                            }),
                        ),
                    )
                    .await?;

                info!(
                    part_id = %part.id,
                    qty = input.qty,
                    on_hand = part.on_hand_qty,
                    "Received stock"
                );

                Ok(LedgerOutcome { part, transaction })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Applies a signed manual correction under the non-negative guard.
    #[instrument(skip(self, input))]
    pub async fn adjust_inventory(
        &self,
        input: AdjustInventoryInput,
        actor: &Actor,
    ) -> Result<LedgerOutcome, ServiceError> {
        if input.qty_change == 0 {
            return Err(ServiceError::InvalidInput(
                "qtyChange must be non-zero".to_string(),
            ));
        }
        if input.reason.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "an adjustment reason is required".to_string(),
            ));
        }

        if let Some(existing) = self.replay_by_key(input.idempotency_key.as_deref()).await? {
            let part = self.get_part(existing.part_id).await?;
            info!(
                transaction_id = %existing.id,
                "Adjustment replayed by idempotency key; no mutation applied"
            );
            return Ok(LedgerOutcome {
                part,
                transaction: existing,
            });
        }

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, LedgerOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let mut update = Part::update_many()
                    .col_expr(
                        part::Column::OnHandQty,
                        Expr::col(part::Column::OnHandQty).add(input.qty_change),
                    )
                    .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(part::Column::Id.eq(input.part_id));
                if input.qty_change < 0 {
                    update = update.filter(part::Column::OnHandQty.gte(-input.qty_change));
                }

                let result = update.exec(txn).await.map_err(ServiceError::db_error)?;
                if result.rows_affected == 0 {
                    let part = Part::find_by_id(input.part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", input.part_id))
                        })?;
                    return Err(ServiceError::InsufficientStock(format!(
                        "cannot adjust by {}: only {} on hand",
                        input.qty_change, part.on_hand_qty
                    )));
                }

                let part = Self::reload_part(txn, input.part_id).await?;

                let transaction = inventory_transaction::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    r#type: Set(TransactionType::Adjustment.as_str().to_string()),
                    part_id: Set(part.id),
                    qty_change: Set(input.qty_change),
                    unit_cost: Set(part.avg_cost),
                    unit_price: Set(None),
                    payment_method: Set(None),
                    vendor_name: Set(None),
                    reference_type: Set(Some(ReferenceType::Adjustment.as_str().to_string())),
                    reference_id: Set(None),
                    performed_by_employee_id: Set(actor.employee_id),
                    performed_by_name: Set(actor.name.clone()),
                    performed_by_role: Set(Some(actor.role.as_str().to_string())),
                    idempotency_key: Set(input.idempotency_key.clone()),
                    reverses_transaction_id: Set(None),
                    notes: Set(Some(input.reason.clone())),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("INVENTORY_ADJUSTMENT", "PART", part.id, &actor)
                            .with_after(serde_json::json!({
                                "transactionId": transaction.id,
                                "qtyChange": input.qty_change,
                                "reason": input.reason,
                                "onHandQty": part.on_hand_qty,
                            })),
                    )
                    .await?;

                Ok(LedgerOutcome { part, transaction })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Puts stock on hold for a work order. Guarded by
    /// `on_hand_qty - reserved_qty >= qty`; not a ledger event because
    /// on-hand quantity does not change, but it is audit-logged.
    #[instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        part_id: Uuid,
        work_order_id: Uuid,
        qty: i32,
        actor: &Actor,
    ) -> Result<part::Model, ServiceError> {
        money::ensure_positive_qty(qty, "qty")?;

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, part::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let result = Part::update_many()
                    .col_expr(
                        part::Column::ReservedQty,
                        Expr::col(part::Column::ReservedQty).add(qty),
                    )
                    .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(part::Column::Id.eq(part_id))
                    .filter(
                        Expr::col(part::Column::OnHandQty)
                            .sub(Expr::col(part::Column::ReservedQty))
                            .gte(qty),
                    )
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if result.rows_affected == 0 {
                    let part = Part::find_by_id(part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", part_id))
                        })?;
                    return Err(ServiceError::InsufficientStock(format!(
                        "insufficient available stock to reserve: {} available",
                        part.available_qty()
                    )));
                }

                let part = Self::reload_part(txn, part_id).await?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("STOCK_RESERVE", "PART", part.id, &actor).with_after(
                            serde_json::json!({
                                "workOrderId": work_order_id,
                                "qty": qty,
                                "reservedQty": part.reserved_qty,
                            }),
                        ),
                    )
                    .await?;

                Ok(part)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Releases a prior hold. Guarded by `reserved_qty >= qty`.
    #[instrument(skip(self))]
    pub async fn release_reserved(
        &self,
        part_id: Uuid,
        work_order_id: Uuid,
        qty: i32,
        actor: &Actor,
    ) -> Result<part::Model, ServiceError> {
        money::ensure_positive_qty(qty, "qty")?;

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, part::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let result = Part::update_many()
                    .col_expr(
                        part::Column::ReservedQty,
                        Expr::col(part::Column::ReservedQty).sub(qty),
                    )
                    .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(part::Column::Id.eq(part_id))
                    .filter(part::Column::ReservedQty.gte(qty))
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if result.rows_affected == 0 {
                    let part = Part::find_by_id(part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", part_id))
                        })?;
                    return Err(ServiceError::InsufficientStock(format!(
                        "insufficient reserved stock to release: {} reserved",
                        part.reserved_qty
                    )));
                }

                let part = Self::reload_part(txn, part_id).await?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("STOCK_RELEASE", "PART", part.id, &actor).with_after(
                            serde_json::json!({
                                "workOrderId": work_order_id,
                                "qty": qty,
                                "reservedQty": part.reserved_qty,
                            }),
                        ),
                    )
                    .await?;

                Ok(part)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Negates a prior ledger row with a RETURN row linked back to it.
    /// A row may be reversed at most once; the unique index on
    /// `reverses_transaction_id` backs the in-transaction check.
    #[instrument(skip(self))]
    pub async fn reverse_transaction(
        &self,
        transaction_id: Uuid,
        actor: &Actor,
        idempotency_key: Option<String>,
    ) -> Result<LedgerOutcome, ServiceError> {
        if let Some(existing) = self.replay_by_key(idempotency_key.as_deref()).await? {
            let part = self.get_part(existing.part_id).await?;
            info!(
                transaction_id = %existing.id,
                "Reversal replayed by idempotency key; no mutation applied"
            );
            return Ok(LedgerOutcome {
                part,
                transaction: existing,
            });
        }

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, LedgerOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let original = InventoryTransaction::find_by_id(transaction_id)
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
                    })?;

                let already = InventoryTransaction::find()
                    .filter(
                        inventory_transaction::Column::ReversesTransactionId.eq(original.id),
                    )
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                if already.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "transaction {} has already been reversed",
                        original.id
                    )));
                }

                let reverse_qty = -original.qty_change;

                let mut update = Part::update_many()
                    .col_expr(
                        part::Column::OnHandQty,
                        Expr::col(part::Column::OnHandQty).add(reverse_qty),
                    )
                    .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(part::Column::Id.eq(original.part_id));
                if reverse_qty < 0 {
                    update = update.filter(part::Column::OnHandQty.gte(-reverse_qty));
                }

                let result = update.exec(txn).await.map_err(ServiceError::db_error)?;
                if result.rows_affected == 0 {
                    let part = Part::find_by_id(original.part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", original.part_id))
                        })?;
                    return Err(ServiceError::InsufficientStock(format!(
                        "reversal of {} units would drive stock negative: {} on hand",
                        -reverse_qty, part.on_hand_qty
                    )));
                }

                let part = Self::reload_part(txn, original.part_id).await?;

                let transaction = inventory_transaction::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    r#type: Set(TransactionType::Return.as_str().to_string()),
                    part_id: Set(part.id),
                    qty_change: Set(reverse_qty),
                    unit_cost: Set(original.unit_cost),
                    unit_price: Set(original.unit_price),
                    payment_method: Set(None),
                    vendor_name: Set(None),
                    reference_type: Set(original.reference_type.clone()),
                    reference_id: Set(original.reference_id.clone()),
                    performed_by_employee_id: Set(actor.employee_id),
                    performed_by_name: Set(actor.name.clone()),
                    performed_by_role: Set(Some(actor.role.as_str().to_string())),
                    idempotency_key: Set(idempotency_key.clone()),
                    reverses_transaction_id: Set(Some(original.id)),
                    notes: Set(Some(format!("Reversal of transaction {}", original.id))),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("INVENTORY_REVERSAL", "PART", part.id, &actor)
                            .with_before(serde_json::json!({
                                "originalTransactionId": original.id,
                                "originalQtyChange": original.qty_change,
                            }))
                            .with_after(serde_json::json!({
                                "transactionId": transaction.id,
                                "qtyChange": reverse_qty,
                                "onHandQty": part.on_hand_qty,
                            })),
                    )
                    .await?;

                Ok(LedgerOutcome { part, transaction })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Ledger history for the reporting layer, newest first.
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = InventoryTransaction::find();
        if let Some(part_id) = filter.part_id {
            query = query.filter(inventory_transaction::Column::PartId.eq(part_id));
        }
        if let Some(transaction_type) = filter.transaction_type {
            query = query.filter(
                inventory_transaction::Column::Type.eq(transaction_type.as_str()),
            );
        }
        if let Some(payment_method) = filter.payment_method {
            query = query.filter(inventory_transaction::Column::PaymentMethod.eq(payment_method));
        }
        if let Some(from) = filter.from {
            query = query.filter(inventory_transaction::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(inventory_transaction::Column::CreatedAt.lte(to));
        }

        query
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .limit(filter.limit.unwrap_or(100))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Parts whose on-hand quantity has fallen below their reorder level.
    pub async fn low_stock(&self) -> Result<Vec<part::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        Part::find()
            .filter(part::Column::ReorderLevel.is_not_null())
            .filter(
                Expr::col(part::Column::OnHandQty).lt(Expr::col(part::Column::ReorderLevel)),
            )
            .order_by_asc(part::Column::PartName)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_part(&self, part_id: Uuid) -> Result<part::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        Part::find_by_id(part_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))
    }

    /// Catalog listing with optional name/sku/barcode search and clamped
    /// paging.
    pub async fn list_parts(
        &self,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PartPage, ServiceError> {
        let db = self.db_pool.as_ref();
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = Part::find();
        if let Some(term) = search.filter(|s| !s.trim().is_empty()) {
            let term = term.trim().to_string();
            query = query.filter(
                part::Column::PartName
                    .contains(&term)
                    .or(part::Column::Sku.contains(&term))
                    .or(part::Column::Barcode.contains(&term)),
            );
        }

        let total = query
            .clone()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let parts = query
            .order_by_asc(part::Column::PartName)
            .offset((page - 1) * limit)
            .limit(limit)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(PartPage {
            parts,
            total,
            page,
            limit,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn create_part(
        &self,
        input: CreatePartInput,
        actor: &Actor,
    ) -> Result<part::Model, ServiceError> {
        if input.part_name.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "partName must not be empty".to_string(),
            ));
        }
        if input.sku.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "sku must not be empty".to_string(),
            ));
        }
        let purchase_price = money::ensure_money(input.purchase_price, "purchasePrice")?;
        let selling_price = money::ensure_money(input.selling_price, "sellingPrice")?;

        let db = self.db_pool.as_ref();

        let part = part::ActiveModel {
            id: Set(Uuid::new_v4()),
            part_name: Set(input.part_name.trim().to_string()),
            sku: Set(input.sku.trim().to_string()),
            barcode: Set(input.barcode),
            description: Set(input.description),
            category: Set(input.category),
            vendor_name: Set(input.vendor_name),
            unit: Set(input.unit),
            reorder_level: Set(input.reorder_level),
            purchase_price: Set(purchase_price),
            selling_price: Set(selling_price),
            avg_cost: Set(Decimal::ZERO),
            on_hand_qty: Set(0),
            reserved_qty: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        self.audit
            .record(
                db,
                AuditEntry::new("PART_CREATED", "PART", part.id, actor).with_after(
                    serde_json::json!({ "partName": part.part_name, "sku": part.sku }),
                ),
            )
            .await?;

        Ok(part)
    }

    /// Edits catalog attributes only; never touches stock fields.
    #[instrument(skip(self, input))]
    pub async fn update_part(
        &self,
        part_id: Uuid,
        input: UpdatePartInput,
        actor: &Actor,
    ) -> Result<part::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let before = self.get_part(part_id).await?;

        let mut model: part::ActiveModel = before.clone().into();
        if let Some(part_name) = input.part_name {
            if part_name.trim().is_empty() {
                return Err(ServiceError::InvalidInput(
                    "partName must not be empty".to_string(),
                ));
            }
            model.part_name = Set(part_name.trim().to_string());
        }
        if let Some(barcode) = input.barcode {
            model.barcode = Set(Some(barcode));
        }
        if let Some(description) = input.description {
            model.description = Set(Some(description));
        }
        if let Some(category) = input.category {
            model.category = Set(Some(category));
        }
        if let Some(vendor_name) = input.vendor_name {
            model.vendor_name = Set(Some(vendor_name));
        }
        if let Some(unit) = input.unit {
            model.unit = Set(Some(unit));
        }
        if let Some(reorder_level) = input.reorder_level {
            model.reorder_level = Set(Some(reorder_level));
        }
        if let Some(purchase_price) = input.purchase_price {
            model.purchase_price = Set(money::ensure_money(purchase_price, "purchasePrice")?);
        }
        if let Some(selling_price) = input.selling_price {
            model.selling_price = Set(money::ensure_money(selling_price, "sellingPrice")?);
        }
        model.updated_at = Set(Some(Utc::now()));

        let part = model.update(db).await.map_err(ServiceError::db_error)?;

        self.audit
            .record(
                db,
                AuditEntry::new("PART_UPDATED", "PART", part.id, actor)
                    .with_before(serde_json::json!({
                        "partName": before.part_name,
                        "sellingPrice": money::to_f64(&before.selling_price),
                    }))
                    .with_after(serde_json::json!({
                        "partName": part.part_name,
                        "sellingPrice": money::to_f64(&part.selling_price),
                    })),
            )
            .await?;

        Ok(part)
    }

    async fn replay_by_key(
        &self,
        key: Option<&str>,
    ) -> Result<Option<inventory_transaction::Model>, ServiceError> {
        let Some(key) = key else { return Ok(None) };
        let db = self.db_pool.as_ref();

        InventoryTransaction::find()
            .filter(inventory_transaction::Column::IdempotencyKey.eq(key))
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn reload_part<C: sea_orm::ConnectionTrait>(
        conn: &C,
        part_id: Uuid,
    ) -> Result<part::Model, ServiceError> {
        Part::find_by_id(part_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))
    }
}
