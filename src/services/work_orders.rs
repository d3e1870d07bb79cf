//! Work-order financial engine. Drives the SCHEDULED -> IN_PROGRESS ->
//! COMPLETED -> CLOSED progression, computes billable totals from labor,
//! part-use snapshots, and ad-hoc charges, and settles the job by upserting
//! its invoice and payment inside one transaction. Closing twice recomputes
//! but never duplicates.

use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        inventory_transaction::{self, ReferenceType, TransactionType},
        invoice::{self, Entity as Invoice, InvoiceStatus, InvoiceType, LineItem, LineItemKind, LineItems},
        part::{self, Entity as Part},
        payment::{self, Entity as Payment},
        time_log::{self, Entity as TimeLog},
        user::{self, Entity as User},
        work_order::{
            self, AssignedEmployee, Entity as WorkOrder, OtherCharge, PartUsed, WorkOrderNote,
            WorkOrderStatus,
        },
    },
    errors::ServiceError,
    money,
    services::{
        audit::{AuditEntry, AuditService},
        is_transient_conflict,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ISSUE_MAX_ATTEMPTS: u32 = 4;
const ISSUE_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Roles eligible for auto-assignment on clock-in.
const ASSIGNABLE_ROLES: [&str; 2] = ["TECHNICIAN", "PAINTER"];

#[derive(Debug, Clone)]
pub struct CreateWorkOrderInput {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub complaint: Option<String>,
    pub assigned_employees: Vec<AssignedEmployee>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBillingInput {
    pub billable_labor_amount: Option<f64>,
    pub other_charges: Option<Vec<OtherChargeInput>>,
    /// Payment method used when this update finalizes billing on a
    /// COMPLETED work order. Defaults to CASH.
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OtherChargeInput {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct IssuePartInput {
    pub work_order_id: Uuid,
    pub part_id: Uuid,
    pub qty: i32,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub work_order: work_order::Model,
    pub part: part::Model,
    pub transaction: inventory_transaction::Model,
}

#[derive(Debug, Clone)]
pub struct TakePaymentInput {
    pub method: String,
    /// Defaults to the invoice total when absent.
    pub amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub work_order: work_order::Model,
    pub invoice: invoice::Model,
    pub payment: payment::Model,
}

/// Category totals for a work order's billing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Financials {
    pub labor_total: Decimal,
    pub parts_total: Decimal,
    pub other_total: Decimal,
    pub grand_total: Decimal,
}

/// The invoice body derived from a work order. A line item appears only
/// when its total is strictly positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePayload {
    pub line_items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Category totals from labor, part-use snapshots, and ad-hoc charges.
/// Part lines price from the snapshot taken at issue time, never from the
/// current catalog.
pub fn compute_financials(wo: &work_order::Model) -> Financials {
    let labor_total = wo.billable_labor_amount;
    let parts_total = wo
        .parts_used
        .0
        .iter()
        .map(|p| p.selling_price_at_time * Decimal::from(p.qty))
        .sum::<Decimal>();
    let other_total = wo.other_charges.0.iter().map(|c| c.amount).sum::<Decimal>();

    Financials {
        labor_total,
        parts_total,
        other_total,
        grand_total: labor_total + parts_total + other_total,
    }
}

pub fn build_invoice_payload(wo: &work_order::Model) -> InvoicePayload {
    let mut line_items = Vec::new();

    if wo.billable_labor_amount > Decimal::ZERO {
        line_items.push(LineItem {
            kind: LineItemKind::Labor,
            description: "Labor".to_string(),
            quantity: 1,
            unit_price: wo.billable_labor_amount,
            total: wo.billable_labor_amount,
            cost_at_time: None,
        });
    }

    for used in &wo.parts_used.0 {
        let total = used.selling_price_at_time * Decimal::from(used.qty);
        if total > Decimal::ZERO {
            line_items.push(LineItem {
                kind: LineItemKind::Part,
                description: format!("Part {}", used.part_id),
                quantity: used.qty,
                unit_price: used.selling_price_at_time,
                total,
                cost_at_time: Some(used.cost_at_time),
            });
        }
    }

    for charge in &wo.other_charges.0 {
        if charge.amount > Decimal::ZERO {
            line_items.push(LineItem {
                kind: LineItemKind::Other,
                description: charge.name.clone(),
                quantity: 1,
                unit_price: charge.amount,
                total: charge.amount,
                cost_at_time: None,
            });
        }
    }

    let subtotal = line_items.iter().map(|l| l.total).sum::<Decimal>();
    let tax = Decimal::ZERO;

    InvoicePayload {
        line_items,
        subtotal,
        tax,
        total: subtotal + tax,
    }
}

pub(crate) fn next_invoice_number() -> String {
    // Millisecond stamp plus a short random tail so two invoices in the
    // same millisecond cannot collide on the unique index.
    let tail = Uuid::new_v4().simple().to_string();
    format!("INV-{}-{}", Utc::now().timestamp_millis(), &tail[..6])
}

#[derive(Clone)]
pub struct WorkOrderService {
    db_pool: Arc<DbPool>,
    audit: AuditService,
}

impl WorkOrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        let audit = AuditService::new(db_pool.clone());
        Self { db_pool, audit }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        input: CreateWorkOrderInput,
        actor: &Actor,
    ) -> Result<work_order::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let wo = work_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(input.customer_id),
            vehicle_id: Set(input.vehicle_id),
            complaint: Set(input.complaint),
            status: Set(WorkOrderStatus::Scheduled.as_str().to_string()),
            assigned_employees: Set(work_order::AssignedEmployees(input.assigned_employees)),
            billable_labor_amount: Set(Decimal::ZERO),
            parts_used: Set(Default::default()),
            other_charges: Set(Default::default()),
            notes: Set(Default::default()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        self.audit
            .record(
                db,
                AuditEntry::new("WORK_ORDER_CREATED", "WORK_ORDER", wo.id, actor)
                    .with_after(serde_json::json!({ "status": wo.status })),
            )
            .await?;

        Ok(wo)
    }

    pub async fn get(&self, id: Uuid) -> Result<work_order::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        Self::load(db, id).await
    }

    pub async fn list(
        &self,
        status: Option<WorkOrderStatus>,
    ) -> Result<Vec<work_order::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = WorkOrder::find();
        if let Some(status) = status {
            query = query.filter(work_order::Column::Status.eq(status.as_str()));
        }

        query
            .order_by_desc(work_order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Manual status change. Forward-only; requesting CLOSED before the job
    /// is COMPLETED auto-promotes it first, then settles the billing.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: WorkOrderStatus,
        actor: &Actor,
    ) -> Result<work_order::Model, ServiceError> {
        if actor.role.is_technician_or_painter() {
            return Err(ServiceError::Forbidden(
                "technicians and painters may not change work order status by hand".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, work_order::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let wo = Self::load(txn, id).await?;
                let current = Self::current_status(&wo)?;

                if new_status.rank() < current.rank() {
                    return Err(ServiceError::InvalidOperation(format!(
                        "work order status may only move forward ({} -> {} rejected)",
                        current.as_str(),
                        new_status.as_str()
                    )));
                }
                if new_status == current && current != WorkOrderStatus::Closed {
                    return Ok(wo);
                }

                if new_status == WorkOrderStatus::Closed {
                    // Closing an already-CLOSED order is how edited billing
                    // data reaches the invoice: the upsert recomputes totals
                    // against the single existing invoice and payment row.
                    let payload = build_invoice_payload(&wo);
                    if payload.line_items.is_empty() {
                        return Err(ServiceError::InvalidInput(
                            "cannot close work order without billable items".to_string(),
                        ));
                    }
                    Self::upsert_invoice_and_payment(txn, &wo, &payload, "CASH").await?;
                }

                let mut model: work_order::ActiveModel = wo.clone().into();
                model.status = Set(new_status.as_str().to_string());
                model.updated_at = Set(Some(Utc::now()));
                let updated = model.update(txn).await.map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("WORK_ORDER_STATUS_UPDATE", "WORK_ORDER", id, &actor)
                            .with_before(serde_json::json!({ "status": current.as_str() }))
                            .with_after(serde_json::json!({ "status": updated.status })),
                    )
                    .await?;

                info!(
                    work_order_id = %id,
                    from = current.as_str(),
                    to = %updated.status,
                    "Work order status updated"
                );

                Ok(updated)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Updates labor and ad-hoc charges. On a COMPLETED work order this also
    /// finalizes: invoice and payment are upserted and the job closes. Billing
    /// stays editable after close; the invoice only picks up the new figures
    /// when the order is closed again.
    #[instrument(skip(self, input))]
    pub async fn update_billing(
        &self,
        id: Uuid,
        input: UpdateBillingInput,
        actor: &Actor,
    ) -> Result<work_order::Model, ServiceError> {
        if actor.role.is_technician_or_painter() {
            return Err(ServiceError::Forbidden(
                "technicians and painters may not edit billing".to_string(),
            ));
        }

        let labor = input
            .billable_labor_amount
            .map(|v| money::ensure_money(v, "billableLaborAmount"))
            .transpose()?;
        let charges = input
            .other_charges
            .map(|charges| {
                charges
                    .into_iter()
                    .map(|c| {
                        if c.name.trim().is_empty() {
                            return Err(ServiceError::InvalidInput(
                                "charge name must not be empty".to_string(),
                            ));
                        }
                        Ok(OtherCharge {
                            name: c.name.trim().to_string(),
                            amount: money::ensure_money(c.amount, "charge amount")?,
                        })
                    })
                    .collect::<Result<Vec<_>, ServiceError>>()
            })
            .transpose()?;
        let method = input.payment_method.unwrap_or_else(|| "CASH".to_string());

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, work_order::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let wo = Self::load(txn, id).await?;
                let current = Self::current_status(&wo)?;

                let before = serde_json::json!({
                    "billableLaborAmount": money::to_f64(&wo.billable_labor_amount),
                    "otherCharges": wo.other_charges.0,
                });

                let mut model: work_order::ActiveModel = wo.clone().into();
                if let Some(labor) = labor {
                    model.billable_labor_amount = Set(labor);
                }
                if let Some(charges) = charges {
                    model.other_charges = Set(work_order::OtherCharges(charges));
                }
                model.updated_at = Set(Some(Utc::now()));
                let mut updated = model.update(txn).await.map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("WORK_ORDER_BILLING_UPDATE", "WORK_ORDER", id, &actor)
                            .with_before(before)
                            .with_after(serde_json::json!({
                                "billableLaborAmount": money::to_f64(&updated.billable_labor_amount),
                                "otherCharges": updated.other_charges.0,
                            })),
                    )
                    .await?;

                if current == WorkOrderStatus::Completed {
                    let payload = build_invoice_payload(&updated);
                    if payload.line_items.is_empty() {
                        return Err(ServiceError::InvalidInput(
                            "cannot close work order without billable items".to_string(),
                        ));
                    }
                    let (invoice, _) =
                        Self::upsert_invoice_and_payment(txn, &updated, &payload, &method).await?;

                    let mut model: work_order::ActiveModel = updated.clone().into();
                    model.status = Set(WorkOrderStatus::Closed.as_str().to_string());
                    model.updated_at = Set(Some(Utc::now()));
                    updated = model.update(txn).await.map_err(ServiceError::db_error)?;

                    audit
                        .record(
                            txn,
                            AuditEntry::new("WORK_ORDER_BILLING_SUBMIT", "WORK_ORDER", id, &actor)
                                .with_after(serde_json::json!({
                                    "invoiceId": invoice.id,
                                    "total": money::to_f64(&invoice.total),
                                    "status": updated.status,
                                })),
                        )
                        .await?;
                }

                Ok(updated)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Issues stock to a work order: a guarded decrement of available stock,
    /// an immutable price/cost snapshot appended to the job, and an ISSUE
    /// ledger row, all in one transaction. Transient store conflicts are
    /// retried a bounded number of times; genuine shortage is not.
    #[instrument(skip(self, input))]
    pub async fn issue_part(
        &self,
        input: IssuePartInput,
        actor: &Actor,
    ) -> Result<IssueOutcome, ServiceError> {
        money::ensure_positive_qty(input.qty, "qty")?;

        if let Some(key) = input.idempotency_key.as_deref() {
            if let Some(existing) = self.find_transaction_by_key(key).await? {
                let part = Self::load_part(self.db_pool.as_ref(), existing.part_id).await?;
                let wo = Self::load(self.db_pool.as_ref(), input.work_order_id).await?;
                info!(
                    transaction_id = %existing.id,
                    "Issue replayed by idempotency key; no mutation applied"
                );
                return Ok(IssueOutcome {
                    work_order: wo,
                    part,
                    transaction: existing,
                });
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_issue_part(&input, actor).await {
                Ok(outcome) => return Ok(outcome),
                Err(ServiceError::DatabaseError(ref db_err))
                    if is_transient_conflict(db_err) && attempt < ISSUE_MAX_ATTEMPTS =>
                {
                    warn!(
                        work_order_id = %input.work_order_id,
                        part_id = %input.part_id,
                        attempt,
                        "Transient store conflict issuing part; retrying"
                    );
                    tokio::time::sleep(ISSUE_RETRY_DELAY).await;
                }
                Err(ServiceError::DatabaseError(ref db_err)) if is_transient_conflict(db_err) => {
                    return Err(ServiceError::InsufficientStock(
                        "could not safely apply stock change after repeated conflicts"
                            .to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_issue_part(
        &self,
        input: &IssuePartInput,
        actor: &Actor,
    ) -> Result<IssueOutcome, ServiceError> {
        let db = self.db_pool.as_ref();
        let input = input.clone();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, IssueOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let wo = Self::load(txn, input.work_order_id).await?;
                if Self::current_status(&wo)? == WorkOrderStatus::Closed {
                    return Err(ServiceError::InvalidOperation(
                        "cannot issue parts to a closed work order".to_string(),
                    ));
                }

                let result = Part::update_many()
                    .col_expr(
                        part::Column::OnHandQty,
                        Expr::col(part::Column::OnHandQty).sub(input.qty),
                    )
                    .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(part::Column::Id.eq(input.part_id))
                    .filter(
                        Expr::col(part::Column::OnHandQty)
                            .sub(Expr::col(part::Column::ReservedQty))
                            .gte(input.qty),
                    )
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if result.rows_affected == 0 {
                    let part = Part::find_by_id(input.part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", input.part_id))
                        })?;
                    return Err(ServiceError::InsufficientStock(format!(
                        "insufficient stock for part {}: {} available",
                        part.part_name,
                        part.available_qty()
                    )));
                }

                let part = Self::load_part(txn, input.part_id).await?;

                let mut model: work_order::ActiveModel = wo.clone().into();
                let mut parts_used = wo.parts_used.clone();
                parts_used.0.push(PartUsed {
                    part_id: part.id,
                    qty: input.qty,
                    selling_price_at_time: part.selling_price,
                    cost_at_time: part.avg_cost,
                });
                model.parts_used = Set(parts_used);
                model.updated_at = Set(Some(Utc::now()));
                let wo = model.update(txn).await.map_err(ServiceError::db_error)?;

                let transaction = inventory_transaction::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    r#type: Set(TransactionType::IssueToWorkOrder.as_str().to_string()),
                    part_id: Set(part.id),
                    qty_change: Set(-input.qty),
                    unit_cost: Set(part.avg_cost),
                    unit_price: Set(Some(part.selling_price)),
                    payment_method: Set(None),
                    vendor_name: Set(None),
                    reference_type: Set(Some(ReferenceType::WorkOrder.as_str().to_string())),
                    reference_id: Set(Some(wo.id.to_string())),
                    performed_by_employee_id: Set(actor.employee_id),
                    performed_by_name: Set(actor.name.clone()),
                    performed_by_role: Set(Some(actor.role.as_str().to_string())),
                    idempotency_key: Set(input.idempotency_key.clone()),
                    reverses_transaction_id: Set(None),
                    notes: Set(None),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("ISSUE_PART_TO_WORK_ORDER", "WORK_ORDER", wo.id, &actor)
                            .with_after(serde_json::json!({
                                "partId": part.id,
                                "qty": input.qty,
                                "sellingPriceAtTime": money::to_f64(&part.selling_price),
                                "costAtTime": money::to_f64(&part.avg_cost),
                                "transactionId": transaction.id,
                            })),
                    )
                    .await?;

                Ok(IssueOutcome {
                    work_order: wo,
                    part,
                    transaction,
                })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Opens a time segment for the caller. Technicians and painters are
    /// auto-assigned if not yet on the job; a SCHEDULED job advances to
    /// IN_PROGRESS.
    #[instrument(skip(self))]
    pub async fn clock_in(
        &self,
        work_order_id: Uuid,
        actor: &Actor,
    ) -> Result<time_log::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, time_log::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let wo = Self::load(txn, work_order_id).await?;
                let current = Self::current_status(&wo)?;
                if current == WorkOrderStatus::Closed {
                    return Err(ServiceError::InvalidOperation(
                        "cannot clock in on a closed work order".to_string(),
                    ));
                }

                let open = TimeLog::find()
                    .filter(time_log::Column::WorkOrderId.eq(work_order_id))
                    .filter(time_log::Column::EmployeeId.eq(actor.employee_id))
                    .filter(time_log::Column::ClockOutAt.is_null())
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                if open.is_some() {
                    return Err(ServiceError::InvalidOperation(
                        "already clocked in on this work order".to_string(),
                    ));
                }

                if !wo.is_assigned(actor.employee_id) {
                    if !actor.role.is_technician_or_painter() {
                        return Err(ServiceError::Forbidden(
                            "only assigned employees may clock in".to_string(),
                        ));
                    }
                    let mut assigned = wo.assigned_employees.clone();
                    assigned.0.push(AssignedEmployee {
                        employee_id: actor.employee_id,
                        role_type: actor.role.as_str().to_string(),
                    });
                    let mut model: work_order::ActiveModel = wo.clone().into();
                    model.assigned_employees = Set(assigned);
                    model.updated_at = Set(Some(Utc::now()));
                    model.update(txn).await.map_err(ServiceError::db_error)?;

                    audit
                        .record(
                            txn,
                            AuditEntry::new("WORK_ORDER_ASSIGN", "WORK_ORDER", work_order_id, &actor)
                                .with_after(serde_json::json!({
                                    "employeeId": actor.employee_id,
                                    "roleType": actor.role.as_str(),
                                    "autoAssigned": true,
                                })),
                        )
                        .await?;
                }

                if current == WorkOrderStatus::Scheduled {
                    let wo = Self::load(txn, work_order_id).await?;
                    let mut model: work_order::ActiveModel = wo.into();
                    model.status = Set(WorkOrderStatus::InProgress.as_str().to_string());
                    model.updated_at = Set(Some(Utc::now()));
                    model.update(txn).await.map_err(ServiceError::db_error)?;
                }

                let log = time_log::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    work_order_id: Set(work_order_id),
                    employee_id: Set(actor.employee_id),
                    clock_in_at: Set(Utc::now()),
                    clock_out_at: Set(None),
                    duration_minutes: Set(None),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("TIMELOG_CLOCK_IN", "WORK_ORDER", work_order_id, &actor)
                            .with_after(serde_json::json!({
                                "timeLogId": log.id,
                                "clockInAt": log.clock_in_at,
                            })),
                    )
                    .await?;

                Ok(log)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Closes the caller's open time segment and records its duration in
    /// whole minutes. The job advances to COMPLETED unless it already is
    /// (or is closed).
    #[instrument(skip(self))]
    pub async fn clock_out(
        &self,
        work_order_id: Uuid,
        actor: &Actor,
    ) -> Result<time_log::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, time_log::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let wo = Self::load(txn, work_order_id).await?;
                if !wo.is_assigned(actor.employee_id) {
                    return Err(ServiceError::Forbidden(
                        "only assigned employees may clock out".to_string(),
                    ));
                }

                let open = TimeLog::find()
                    .filter(time_log::Column::WorkOrderId.eq(work_order_id))
                    .filter(time_log::Column::EmployeeId.eq(actor.employee_id))
                    .filter(time_log::Column::ClockOutAt.is_null())
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::InvalidOperation(
                            "no open time segment on this work order".to_string(),
                        )
                    })?;

                let now = Utc::now();
                let minutes = (now - open.clock_in_at).num_minutes().max(0) as i32;

                let mut model: time_log::ActiveModel = open.into();
                model.clock_out_at = Set(Some(now));
                model.duration_minutes = Set(Some(minutes));
                let log = model.update(txn).await.map_err(ServiceError::db_error)?;

                let current = Self::current_status(&wo)?;
                if current.rank() < WorkOrderStatus::Completed.rank() {
                    let mut model: work_order::ActiveModel = wo.clone().into();
                    model.status = Set(WorkOrderStatus::Completed.as_str().to_string());
                    model.updated_at = Set(Some(Utc::now()));
                    model.update(txn).await.map_err(ServiceError::db_error)?;
                }

                audit
                    .record(
                        txn,
                        AuditEntry::new("TIMELOG_CLOCK_OUT", "WORK_ORDER", work_order_id, &actor)
                            .with_after(serde_json::json!({
                                "timeLogId": log.id,
                                "durationMinutes": minutes,
                            })),
                    )
                    .await?;

                Ok(log)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Records a time segment with a caller-supplied interval, for entries
    /// reconstructed after the fact.
    #[instrument(skip(self))]
    pub async fn create_time_log(
        &self,
        work_order_id: Uuid,
        employee_id: Uuid,
        clock_in_at: DateTime<Utc>,
        clock_out_at: DateTime<Utc>,
        actor: &Actor,
    ) -> Result<time_log::Model, ServiceError> {
        if clock_out_at < clock_in_at {
            return Err(ServiceError::InvalidInput(
                "clockOutAt must not precede clockInAt".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        Self::load(db, work_order_id).await?;

        let minutes = (clock_out_at - clock_in_at).num_minutes().max(0) as i32;

        let log = time_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            work_order_id: Set(work_order_id),
            employee_id: Set(employee_id),
            clock_in_at: Set(clock_in_at),
            clock_out_at: Set(Some(clock_out_at)),
            duration_minutes: Set(Some(minutes)),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        self.audit
            .record(
                db,
                AuditEntry::new("TIMELOG_CREATED", "WORK_ORDER", work_order_id, actor)
                    .with_after(serde_json::json!({
                        "timeLogId": log.id,
                        "employeeId": employee_id,
                        "durationMinutes": minutes,
                    })),
            )
            .await?;

        Ok(log)
    }

    pub async fn list_time_logs(
        &self,
        work_order_id: Uuid,
    ) -> Result<Vec<time_log::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        TimeLog::find()
            .filter(time_log::Column::WorkOrderId.eq(work_order_id))
            .order_by_asc(time_log::Column::ClockInAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Replaces the assignment set.
    #[instrument(skip(self, employees))]
    pub async fn assign(
        &self,
        id: Uuid,
        employees: Vec<AssignedEmployee>,
        actor: &Actor,
    ) -> Result<work_order::Model, ServiceError> {
        if actor.role.is_technician_or_painter() {
            return Err(ServiceError::Forbidden(
                "technicians and painters may not edit assignments".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let wo = Self::load(db, id).await?;
        let before = wo.assigned_employees.clone();

        let mut model: work_order::ActiveModel = wo.into();
        model.assigned_employees = Set(work_order::AssignedEmployees(employees));
        model.updated_at = Set(Some(Utc::now()));
        let wo = model.update(db).await.map_err(ServiceError::db_error)?;

        self.audit
            .record(
                db,
                AuditEntry::new("WORK_ORDER_ASSIGN", "WORK_ORDER", id, actor)
                    .with_before(serde_json::json!({ "assignedEmployees": before.0 }))
                    .with_after(serde_json::json!({
                        "assignedEmployees": wo.assigned_employees.0,
                    })),
            )
            .await?;

        Ok(wo)
    }

    /// Active employees in the roles that turn wrenches.
    pub async fn list_assignable_employees(&self) -> Result<Vec<user::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        User::find()
            .filter(user::Column::IsActive.eq(true))
            .filter(user::Column::Role.is_in(ASSIGNABLE_ROLES))
            .order_by_asc(user::Column::Name)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, message))]
    pub async fn add_note(
        &self,
        id: Uuid,
        actor: &Actor,
        message: String,
    ) -> Result<work_order::Model, ServiceError> {
        if actor.role.is_technician_or_painter() {
            return Err(ServiceError::Forbidden(
                "technicians and painters may not add notes".to_string(),
            ));
        }
        if message.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "note message must not be empty".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let wo = Self::load(db, id).await?;

        let mut notes = wo.notes.clone();
        let note = WorkOrderNote {
            author_id: actor.employee_id,
            message: message.trim().to_string(),
            created_at: Utc::now(),
        };
        notes.0.push(note.clone());

        let mut model: work_order::ActiveModel = wo.into();
        model.notes = Set(notes);
        model.updated_at = Set(Some(Utc::now()));
        let wo = model.update(db).await.map_err(ServiceError::db_error)?;

        self.audit
            .record(
                db,
                AuditEntry::new("NOTE_ADDED", "WORK_ORDER", id, actor)
                    .with_after(serde_json::json!({ "note": note })),
            )
            .await?;

        Ok(wo)
    }

    /// Settles a COMPLETED work order whose invoice is still OPEN: closes
    /// the invoice, records the payment, and closes the job, atomically.
    #[instrument(skip(self, input))]
    pub async fn take_payment(
        &self,
        id: Uuid,
        input: TakePaymentInput,
        actor: &Actor,
    ) -> Result<SettlementOutcome, ServiceError> {
        let amount = input
            .amount
            .map(|v| money::ensure_money(v, "amount"))
            .transpose()?;
        if input.method.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "payment method must not be empty".to_string(),
            ));
        }
        let method = input.method.trim().to_string();

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, SettlementOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let wo = Self::load(txn, id).await?;
                if Self::current_status(&wo)? != WorkOrderStatus::Completed {
                    return Err(ServiceError::InvalidOperation(
                        "payment can only be taken on a completed work order".to_string(),
                    ));
                }

                let inv = Invoice::find()
                    .filter(invoice::Column::WorkOrderId.eq(id))
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("No invoice exists for work order {}", id))
                    })?;
                if inv.status != InvoiceStatus::Open.as_str() {
                    return Err(ServiceError::InvalidOperation(
                        "invoice is already closed".to_string(),
                    ));
                }

                let mut model: invoice::ActiveModel = inv.clone().into();
                model.status = Set(InvoiceStatus::Closed.as_str().to_string());
                model.updated_at = Set(Some(Utc::now()));
                let inv = model.update(txn).await.map_err(ServiceError::db_error)?;

                let pay =
                    Self::upsert_payment(txn, inv.id, amount.unwrap_or(inv.total), &method).await?;

                let mut model: work_order::ActiveModel = wo.clone().into();
                model.status = Set(WorkOrderStatus::Closed.as_str().to_string());
                model.updated_at = Set(Some(Utc::now()));
                let wo = model.update(txn).await.map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("WORK_ORDER_PAYMENT", "WORK_ORDER", id, &actor).with_after(
                            serde_json::json!({
                                "invoiceId": inv.id,
                                "amount": money::to_f64(&pay.amount),
                                "method": pay.method,
                            }),
                        ),
                    )
                    .await?;

                Ok(SettlementOutcome {
                    work_order: wo,
                    invoice: inv,
                    payment: pay,
                })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Upserts the work order's invoice (forced CLOSED) and its payment.
    /// The unique index on `invoice.work_order_id` makes "at most one
    /// invoice per job" a store constraint, not an application convention.
    async fn upsert_invoice_and_payment<C: ConnectionTrait>(
        txn: &C,
        wo: &work_order::Model,
        payload: &InvoicePayload,
        method: &str,
    ) -> Result<(invoice::Model, payment::Model), ServiceError> {
        let existing = Invoice::find()
            .filter(invoice::Column::WorkOrderId.eq(wo.id))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let inv = match existing {
            Some(inv) => {
                let mut model: invoice::ActiveModel = inv.into();
                model.customer_id = Set(Some(wo.customer_id));
                model.vehicle_id = Set(Some(wo.vehicle_id));
                model.line_items = Set(LineItems(payload.line_items.clone()));
                model.subtotal = Set(payload.subtotal);
                model.tax = Set(payload.tax);
                model.total = Set(payload.total);
                model.status = Set(InvoiceStatus::Closed.as_str().to_string());
                model.updated_at = Set(Some(Utc::now()));
                model.update(txn).await.map_err(ServiceError::db_error)?
            }
            None => invoice::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_number: Set(next_invoice_number()),
                idempotency_key: Set(None),
                r#type: Set(InvoiceType::WorkOrder.as_str().to_string()),
                customer_id: Set(Some(wo.customer_id)),
                vehicle_id: Set(Some(wo.vehicle_id)),
                work_order_id: Set(Some(wo.id)),
                line_items: Set(LineItems(payload.line_items.clone())),
                subtotal: Set(payload.subtotal),
                tax: Set(payload.tax),
                total: Set(payload.total),
                status: Set(InvoiceStatus::Closed.as_str().to_string()),
                created_at: Set(Utc::now()),
                updated_at: Set(None),
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?,
        };

        let pay = Self::upsert_payment(txn, inv.id, inv.total, method).await?;

        Ok((inv, pay))
    }

    /// One live payment per invoice (unique index on `payment.invoice_id`);
    /// re-settling overwrites amount, method, and paid timestamp.
    async fn upsert_payment<C: ConnectionTrait>(
        txn: &C,
        invoice_id: Uuid,
        amount: Decimal,
        method: &str,
    ) -> Result<payment::Model, ServiceError> {
        let existing = Payment::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;

        match existing {
            Some(pay) => {
                let mut model: payment::ActiveModel = pay.into();
                model.amount = Set(amount);
                model.method = Set(method.to_string());
                model.paid_at = Set(Utc::now());
                model.update(txn).await.map_err(ServiceError::db_error)
            }
            None => payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice_id),
                method: Set(method.to_string()),
                amount: Set(amount),
                paid_at: Set(Utc::now()),
                note: Set(None),
                created_at: Set(Utc::now()),
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error),
        }
    }

    async fn load<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<work_order::Model, ServiceError> {
        WorkOrder::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Work order {} not found", id)))
    }

    async fn load_part<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<part::Model, ServiceError> {
        Part::find_by_id(id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", id)))
    }

    fn current_status(wo: &work_order::Model) -> Result<WorkOrderStatus, ServiceError> {
        WorkOrderStatus::from_str(&wo.status).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "work order {} carries unknown status {}",
                wo.id, wo.status
            ))
        })
    }

    async fn find_transaction_by_key(
        &self,
        key: &str,
    ) -> Result<Option<inventory_transaction::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::IdempotencyKey.eq(key))
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
