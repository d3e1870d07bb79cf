//! Counter-sale checkout and invoice settlement. A counter sale consumes
//! several inventory lines, creates an immediately CLOSED invoice, and
//! records the payment in one transaction; any line short on stock aborts
//! the whole sale.

use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        inventory_transaction::{
            self, Entity as InventoryTransaction, ReferenceType, TransactionType,
        },
        invoice::{self, Entity as Invoice, InvoiceStatus, InvoiceType, LineItem, LineItemKind, LineItems},
        part::{self, Entity as Part},
        payment::{self, Entity as Payment},
        work_order::{self, Entity as WorkOrder, WorkOrderStatus},
    },
    errors::ServiceError,
    money,
    services::{
        audit::{AuditEntry, AuditService},
        inventory::PaymentMethod,
        work_orders::next_invoice_number,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CounterSaleLine {
    pub part_id: Uuid,
    pub qty: i32,
}

#[derive(Debug, Clone)]
pub struct CounterSaleInput {
    pub customer_id: Option<Uuid>,
    pub lines: Vec<CounterSaleLine>,
    pub payment_method: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct CounterSaleOutcome {
    pub invoice: invoice::Model,
    pub payment: Option<payment::Model>,
    pub transactions: Vec<inventory_transaction::Model>,
}

#[derive(Debug, Clone)]
pub struct CloseInvoiceInput {
    pub method: String,
    /// Defaults to the invoice total when absent.
    pub amount: Option<f64>,
}

#[derive(Clone)]
pub struct InvoicingService {
    db_pool: Arc<DbPool>,
    audit: AuditService,
}

impl InvoicingService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        let audit = AuditService::new(db_pool.clone());
        Self { db_pool, audit }
    }

    /// Point-of-sale checkout. Replays are detected against both the
    /// invoice's idempotency key and the first ledger line's key before any
    /// transaction opens; only the first line of the batch carries the key
    /// so a retried multi-line request cannot duplicate later lines.
    #[instrument(skip(self, input))]
    pub async fn counter_sale_checkout(
        &self,
        input: CounterSaleInput,
        actor: &Actor,
    ) -> Result<CounterSaleOutcome, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::InvalidInput(
                "a counter sale needs at least one line".to_string(),
            ));
        }
        for line in &input.lines {
            money::ensure_positive_qty(line.qty, "qty")?;
        }
        if input.idempotency_key.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "idempotencyKey is required for counter sales".to_string(),
            ));
        }
        if PaymentMethod::from_str(input.payment_method.trim()).is_none() {
            return Err(ServiceError::InvalidInput(format!(
                "unknown payment method: {}",
                input.payment_method
            )));
        }

        if let Some(outcome) = self.find_replay(&input.idempotency_key).await? {
            info!(
                invoice_id = %outcome.invoice.id,
                "Counter sale replayed by idempotency key; no mutation applied"
            );
            return Ok(outcome);
        }

        let db = self.db_pool.as_ref();
        let actor = actor.clone();
        let audit = self.audit.clone();

        db.transaction::<_, CounterSaleOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let invoice_id = Uuid::new_v4();
                let mut line_items = Vec::new();
                let mut transactions = Vec::new();
                let mut subtotal = Decimal::ZERO;

                for (index, line) in input.lines.iter().enumerate() {
                    let result = Part::update_many()
                        .col_expr(
                            part::Column::OnHandQty,
                            Expr::col(part::Column::OnHandQty).sub(line.qty),
                        )
                        .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(part::Column::Id.eq(line.part_id))
                        .filter(
                            Expr::col(part::Column::OnHandQty)
                                .sub(Expr::col(part::Column::ReservedQty))
                                .gte(line.qty),
                        )
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let part = Part::find_by_id(line.part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", line.part_id))
                        })?;

                    if result.rows_affected == 0 {
                        // Aborts the whole transaction; no partial sale.
                        return Err(ServiceError::InsufficientStock(format!(
                            "insufficient stock for part {}: {} available",
                            part.part_name,
                            part.available_qty()
                        )));
                    }

                    let line_total = part.selling_price * Decimal::from(line.qty);
                    subtotal += line_total;
                    line_items.push(LineItem {
                        kind: LineItemKind::Part,
                        description: part.part_name.clone(),
                        quantity: line.qty,
                        unit_price: part.selling_price,
                        total: line_total,
                        cost_at_time: Some(part.avg_cost),
                    });

                    let key = if index == 0 {
                        Some(input.idempotency_key.clone())
                    } else {
                        None
                    };
                    let transaction = inventory_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        r#type: Set(TransactionType::CounterSale.as_str().to_string()),
                        part_id: Set(part.id),
                        qty_change: Set(-line.qty),
                        unit_cost: Set(part.avg_cost),
                        unit_price: Set(Some(part.selling_price)),
                        payment_method: Set(Some(input.payment_method.clone())),
                        vendor_name: Set(None),
                        reference_type: Set(Some(ReferenceType::CounterSale.as_str().to_string())),
                        reference_id: Set(Some(invoice_id.to_string())),
                        performed_by_employee_id: Set(actor.employee_id),
                        performed_by_name: Set(actor.name.clone()),
                        performed_by_role: Set(Some(actor.role.as_str().to_string())),
                        idempotency_key: Set(key),
                        reverses_transaction_id: Set(None),
                        notes: Set(None),
                        created_at: Set(Utc::now()),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                    transactions.push(transaction);
                }

                let tax = Decimal::ZERO;
                let inv = invoice::ActiveModel {
                    id: Set(invoice_id),
                    invoice_number: Set(next_invoice_number()),
                    idempotency_key: Set(Some(input.idempotency_key.clone())),
                    r#type: Set(InvoiceType::CounterSale.as_str().to_string()),
                    customer_id: Set(input.customer_id),
                    vehicle_id: Set(None),
                    work_order_id: Set(None),
                    line_items: Set(LineItems(line_items)),
                    subtotal: Set(subtotal),
                    tax: Set(tax),
                    total: Set(subtotal + tax),
                    status: Set(InvoiceStatus::Closed.as_str().to_string()),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                let pay = payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    invoice_id: Set(inv.id),
                    method: Set(input.payment_method.trim().to_string()),
                    amount: Set(inv.total),
                    paid_at: Set(Utc::now()),
                    note: Set(None),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                audit
                    .record(
                        txn,
                        AuditEntry::new("COUNTER_SALE", "INVOICE", inv.id, &actor).with_after(
                            serde_json::json!({
                                "invoiceNumber": inv.invoice_number,
                                "lineCount": transactions.len(),
                                "total": money::to_f64(&inv.total),
                                "paymentMethod": pay.method,
                            }),
                        ),
                    )
                    .await?;

                info!(
                    invoice_id = %inv.id,
                    total = %inv.total,
                    "Counter sale completed"
                );

                Ok(CounterSaleOutcome {
                    invoice: inv,
                    payment: Some(pay),
                    transactions,
                })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Closes an OPEN invoice, records its payment, and closes the linked
    /// work order if there is one.
    #[instrument(skip(self, input))]
    pub async fn close_invoice(
        &self,
        invoice_id: Uuid,
        input: CloseInvoiceInput,
        actor: &Actor,
    ) -> Result<(invoice::Model, payment::Model), ServiceError> {
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

        db.transaction::<_, (invoice::Model, payment::Model), ServiceError>(move |txn| {
            Box::pin(async move {
                let inv = Invoice::find_by_id(invoice_id)
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Invoice {} not found", invoice_id))
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

                let existing = Payment::find()
                    .filter(payment::Column::InvoiceId.eq(inv.id))
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                let pay = match existing {
                    Some(pay) => {
                        let mut model: payment::ActiveModel = pay.into();
                        model.amount = Set(amount.unwrap_or(inv.total));
                        model.method = Set(method.clone());
                        model.paid_at = Set(Utc::now());
                        model.update(txn).await.map_err(ServiceError::db_error)?
                    }
                    None => payment::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        invoice_id: Set(inv.id),
                        method: Set(method.clone()),
                        amount: Set(amount.unwrap_or(inv.total)),
                        paid_at: Set(Utc::now()),
                        note: Set(None),
                        created_at: Set(Utc::now()),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?,
                };

                if let Some(work_order_id) = inv.work_order_id {
                    let wo = WorkOrder::find_by_id(work_order_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if let Some(wo) = wo {
                        if wo.status != WorkOrderStatus::Closed.as_str() {
                            let mut model: work_order::ActiveModel = wo.into();
                            model.status = Set(WorkOrderStatus::Closed.as_str().to_string());
                            model.updated_at = Set(Some(Utc::now()));
                            model.update(txn).await.map_err(ServiceError::db_error)?;
                        }
                    }
                }

                audit
                    .record(
                        txn,
                        AuditEntry::new("INVOICE_CLOSED", "INVOICE", inv.id, &actor).with_after(
                            serde_json::json!({
                                "amount": money::to_f64(&pay.amount),
                                "method": pay.method,
                            }),
                        ),
                    )
                    .await?;

                Ok((inv, pay))
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    pub async fn get(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        Invoice::find_by_id(invoice_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))
    }

    pub async fn list(
        &self,
        status: Option<InvoiceStatus>,
        limit: Option<u64>,
    ) -> Result<Vec<invoice::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = Invoice::find();
        if let Some(status) = status {
            query = query.filter(invoice::Column::Status.eq(status.as_str()));
        }

        query
            .order_by_desc(invoice::Column::CreatedAt)
            .limit(limit.unwrap_or(100))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Replay detection: the invoice's own key first, then the first
    /// ledger line's key (which references the invoice it was sold under).
    async fn find_replay(&self, key: &str) -> Result<Option<CounterSaleOutcome>, ServiceError> {
        let db = self.db_pool.as_ref();

        let invoice_hit = Invoice::find()
            .filter(invoice::Column::IdempotencyKey.eq(key))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        let inv = match invoice_hit {
            Some(inv) => inv,
            None => {
                let ledger_hit = InventoryTransaction::find()
                    .filter(inventory_transaction::Column::IdempotencyKey.eq(key))
                    .one(db)
                    .await
                    .map_err(ServiceError::db_error)?;
                let Some(row) = ledger_hit else {
                    return Ok(None);
                };
                let Some(reference_id) = row.reference_id.as_deref() else {
                    return Ok(None);
                };
                let Ok(invoice_id) = reference_id.parse::<Uuid>() else {
                    return Ok(None);
                };
                match Invoice::find_by_id(invoice_id)
                    .one(db)
                    .await
                    .map_err(ServiceError::db_error)?
                {
                    Some(inv) => inv,
                    None => return Ok(None),
                }
            }
        };

        let payment = Payment::find()
            .filter(payment::Column::InvoiceId.eq(inv.id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;
        let transactions = InventoryTransaction::find()
            .filter(inventory_transaction::Column::ReferenceId.eq(inv.id.to_string()))
            .order_by_asc(inventory_transaction::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(Some(CounterSaleOutcome {
            invoice: inv,
            payment,
            transactions,
        }))
    }
}
