mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use shopfloor_api::entities::work_order::{AssignedEmployee, WorkOrderStatus};
use shopfloor_api::entities::{invoice, payment};
use shopfloor_api::errors::ServiceError;
use shopfloor_api::services::work_orders::{
    CreateWorkOrderInput, IssuePartInput, OtherChargeInput, TakePaymentInput, UpdateBillingInput,
};

use common::{advisor, manager, painter, technician, TestApp};

fn create_input() -> CreateWorkOrderInput {
    CreateWorkOrderInput {
        customer_id: uuid::Uuid::new_v4(),
        vehicle_id: uuid::Uuid::new_v4(),
        complaint: Some("Grinding on braking".to_string()),
        assigned_employees: Vec::new(),
    }
}

#[tokio::test]
async fn new_work_orders_start_scheduled() {
    let app = TestApp::new().await;
    let wo = app
        .work_orders
        .create(create_input(), &advisor())
        .await
        .expect("create");
    assert_eq!(wo.status, "SCHEDULED");
    assert!(wo.parts_used.0.is_empty());
    assert_eq!(wo.billable_labor_amount, dec!(0));
}

#[tokio::test]
async fn status_only_moves_forward() {
    let app = TestApp::new().await;
    let actor = advisor();
    let wo = app.seed_work_order(WorkOrderStatus::Completed).await;

    let back = app
        .work_orders
        .update_status(wo.id, WorkOrderStatus::Scheduled, &actor)
        .await;
    assert_matches!(back, Err(ServiceError::InvalidOperation(_)));

    // Same status is a no-op, not an error.
    let same = app
        .work_orders
        .update_status(wo.id, WorkOrderStatus::Completed, &actor)
        .await
        .expect("no-op");
    assert_eq!(same.status, "COMPLETED");
}

#[tokio::test]
async fn floor_roles_cannot_drive_the_state_machine_by_hand() {
    let app = TestApp::new().await;
    let wo = app.seed_work_order(WorkOrderStatus::Scheduled).await;

    for actor in [technician(), painter()] {
        let err = app
            .work_orders
            .update_status(wo.id, WorkOrderStatus::InProgress, &actor)
            .await;
        assert_matches!(err, Err(ServiceError::Forbidden(_)));

        let err = app
            .work_orders
            .update_billing(wo.id, UpdateBillingInput::default(), &actor)
            .await;
        assert_matches!(err, Err(ServiceError::Forbidden(_)));

        let err = app
            .work_orders
            .add_note(wo.id, &actor, "squeaks".to_string())
            .await;
        assert_matches!(err, Err(ServiceError::Forbidden(_)));
    }
}

#[tokio::test]
async fn closing_without_billable_items_is_rejected() {
    let app = TestApp::new().await;
    let wo = app.seed_work_order(WorkOrderStatus::Completed).await;

    let err = app
        .work_orders
        .update_status(wo.id, WorkOrderStatus::Closed, &manager())
        .await;
    assert_matches!(err, Err(ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn closing_with_labor_settles_invoice_and_payment() {
    let app = TestApp::new().await;
    let actor = advisor();
    let wo = app.seed_work_order(WorkOrderStatus::InProgress).await;

    app.work_orders
        .update_billing(
            wo.id,
            UpdateBillingInput {
                billable_labor_amount: Some(180.0),
                other_charges: Some(vec![OtherChargeInput {
                    name: "Shop supplies".to_string(),
                    amount: 12.5,
                }]),
                payment_method: None,
            },
            &actor,
        )
        .await
        .expect("billing");

    let closed = app
        .work_orders
        .update_status(wo.id, WorkOrderStatus::Closed, &actor)
        .await
        .expect("close");
    assert_eq!(closed.status, "CLOSED");

    let inv = invoice::Entity::find()
        .filter(invoice::Column::WorkOrderId.eq(wo.id))
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("invoice exists");
    assert_eq!(inv.status, "CLOSED");
    assert_eq!(inv.total, dec!(192.50));
    assert_eq!(inv.line_items.0.len(), 2);

    let pay = payment::Entity::find()
        .filter(payment::Column::InvoiceId.eq(inv.id))
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("payment exists");
    assert_eq!(pay.amount, dec!(192.50));
    assert_eq!(pay.method, "CASH");
}

#[tokio::test]
async fn reclosing_recomputes_the_single_invoice_in_place() {
    let app = TestApp::new().await;
    let actor = manager();
    let wo = app.seed_work_order(WorkOrderStatus::InProgress).await;

    app.work_orders
        .update_billing(
            wo.id,
            UpdateBillingInput {
                billable_labor_amount: Some(100.0),
                ..Default::default()
            },
            &actor,
        )
        .await
        .expect("billing");
    app.work_orders
        .update_status(wo.id, WorkOrderStatus::Closed, &actor)
        .await
        .expect("first close");

    // Billing stays editable after close; the invoice is untouched until
    // the order is closed again.
    let edited = app
        .work_orders
        .update_billing(
            wo.id,
            UpdateBillingInput {
                billable_labor_amount: Some(250.0),
                ..Default::default()
            },
            &actor,
        )
        .await
        .expect("billing edit after close");
    assert_eq!(edited.status, "CLOSED");
    assert_eq!(edited.billable_labor_amount, dec!(250));

    let invoices = invoice::Entity::find()
        .filter(invoice::Column::WorkOrderId.eq(wo.id))
        .all(app.db.as_ref())
        .await
        .expect("invoices");
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].total, dec!(100));

    // Closing again recomputes from the latest billing data without
    // duplicating financial records.
    app.work_orders
        .update_status(wo.id, WorkOrderStatus::Closed, &actor)
        .await
        .expect("second close");

    let invoices = invoice::Entity::find()
        .filter(invoice::Column::WorkOrderId.eq(wo.id))
        .all(app.db.as_ref())
        .await
        .expect("invoices");
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].total, dec!(250));

    let payments = payment::Entity::find()
        .filter(payment::Column::InvoiceId.eq(invoices[0].id))
        .all(app.db.as_ref())
        .await
        .expect("payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, dec!(250));
}

#[tokio::test]
async fn billing_update_on_completed_order_finalizes_it() {
    let app = TestApp::new().await;
    let actor = advisor();
    let wo = app.seed_work_order(WorkOrderStatus::Completed).await;

    let finalized = app
        .work_orders
        .update_billing(
            wo.id,
            UpdateBillingInput {
                billable_labor_amount: Some(250.0),
                other_charges: None,
                payment_method: Some("CREDIT".to_string()),
            },
            &actor,
        )
        .await
        .expect("finalize");
    assert_eq!(finalized.status, "CLOSED");

    let inv = invoice::Entity::find()
        .filter(invoice::Column::WorkOrderId.eq(wo.id))
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("invoice");
    assert_eq!(inv.status, "CLOSED");

    let pay = payment::Entity::find()
        .filter(payment::Column::InvoiceId.eq(inv.id))
        .one(app.db.as_ref())
        .await
        .expect("query")
        .expect("payment");
    assert_eq!(pay.method, "CREDIT");
    assert_eq!(pay.amount, dec!(250));
}

#[tokio::test]
async fn issuing_parts_snapshots_price_and_cost() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Rotor", "RT-1", 8, dec!(85), dec!(45)).await;
    let wo = app.seed_work_order(WorkOrderStatus::InProgress).await;

    let out = app
        .work_orders
        .issue_part(
            IssuePartInput {
                work_order_id: wo.id,
                part_id: part.id,
                qty: 2,
                idempotency_key: Some("issue-1".to_string()),
            },
            &actor,
        )
        .await
        .expect("issue");

    assert_eq!(out.part.on_hand_qty, 6);
    assert_eq!(out.transaction.qty_change, -2);
    assert_eq!(out.transaction.unit_price, Some(dec!(85)));
    let snap = &out.work_order.parts_used.0[0];
    assert_eq!(snap.selling_price_at_time, dec!(85));
    assert_eq!(snap.cost_at_time, dec!(45));

    // Catalog edits after issue must not change the billed amount.
    app.inventory
        .update_part(
            part.id,
            shopfloor_api::services::inventory::UpdatePartInput {
                selling_price: Some(120.0),
                ..Default::default()
            },
            &actor,
        )
        .await
        .expect("reprice");
    let wo = app.work_orders.get(wo.id).await.expect("reload");
    assert_eq!(wo.parts_used.0[0].selling_price_at_time, dec!(85));

    // Replaying the key neither issues again nor touches stock.
    let replay = app
        .work_orders
        .issue_part(
            IssuePartInput {
                work_order_id: wo.id,
                part_id: part.id,
                qty: 2,
                idempotency_key: Some("issue-1".to_string()),
            },
            &actor,
        )
        .await
        .expect("replay");
    assert_eq!(replay.transaction.id, out.transaction.id);
    assert_eq!(replay.part.on_hand_qty, 6);
    assert_eq!(replay.work_order.parts_used.0.len(), 1);
}

#[tokio::test]
async fn closed_orders_refuse_parts_and_time() {
    let app = TestApp::new().await;
    let part = app.seed_part("Clamp", "CM-1", 5, dec!(3), dec!(1)).await;
    let wo = app.seed_work_order(WorkOrderStatus::Closed).await;

    let err = app
        .work_orders
        .issue_part(
            IssuePartInput {
                work_order_id: wo.id,
                part_id: part.id,
                qty: 1,
                idempotency_key: None,
            },
            &advisor(),
        )
        .await;
    assert_matches!(err, Err(ServiceError::InvalidOperation(_)));

    let err = app.work_orders.clock_in(wo.id, &technician()).await;
    assert_matches!(err, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn technician_clock_in_auto_assigns_and_starts_work() {
    let app = TestApp::new().await;
    let tech = technician();
    let wo = app.seed_work_order(WorkOrderStatus::Scheduled).await;

    let log = app.work_orders.clock_in(wo.id, &tech).await.expect("clock in");
    assert_eq!(log.work_order_id, wo.id);
    assert!(log.clock_out_at.is_none());

    let wo = app.work_orders.get(wo.id).await.expect("reload");
    assert_eq!(wo.status, "IN_PROGRESS");
    assert!(wo
        .assigned_employees
        .0
        .iter()
        .any(|e| e.employee_id == tech.employee_id));

    // A second clock-in without closing the first segment is rejected.
    let twice = app.work_orders.clock_in(wo.id, &tech).await;
    assert_matches!(twice, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn non_floor_roles_are_not_auto_assigned() {
    let app = TestApp::new().await;
    let wo = app.seed_work_order(WorkOrderStatus::Scheduled).await;

    let err = app.work_orders.clock_in(wo.id, &advisor()).await;
    assert_matches!(err, Err(ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn clock_out_records_duration_and_completes_the_order() {
    let app = TestApp::new().await;
    let tech = technician();
    let wo = app.seed_work_order(WorkOrderStatus::Scheduled).await;

    // No open segment yet.
    let err = app.work_orders.clock_out(wo.id, &tech).await;
    assert_matches!(err, Err(ServiceError::Forbidden(_)) | Err(ServiceError::InvalidOperation(_)));

    app.work_orders.clock_in(wo.id, &tech).await.expect("clock in");
    let log = app.work_orders.clock_out(wo.id, &tech).await.expect("clock out");
    assert!(log.clock_out_at.is_some());
    assert!(log.duration_minutes.unwrap_or(-1) >= 0);

    let wo = app.work_orders.get(wo.id).await.expect("reload");
    assert_eq!(wo.status, "COMPLETED");

    let logs = app.work_orders.list_time_logs(wo.id).await.expect("logs");
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn assignment_replaces_the_roster() {
    let app = TestApp::new().await;
    let actor = manager();
    let wo = app.seed_work_order(WorkOrderStatus::Scheduled).await;

    let a = uuid::Uuid::new_v4();
    let b = uuid::Uuid::new_v4();
    let wo = app
        .work_orders
        .assign(
            wo.id,
            vec![AssignedEmployee {
                employee_id: a,
                role_type: "TECHNICIAN".to_string(),
            }],
            &actor,
        )
        .await
        .expect("assign");
    assert_eq!(wo.assigned_employees.0.len(), 1);

    let wo = app
        .work_orders
        .assign(
            wo.id,
            vec![AssignedEmployee {
                employee_id: b,
                role_type: "PAINTER".to_string(),
            }],
            &actor,
        )
        .await
        .expect("reassign");
    assert_eq!(wo.assigned_employees.0.len(), 1);
    assert_eq!(wo.assigned_employees.0[0].employee_id, b);
}

#[tokio::test]
async fn assignable_employees_lists_active_floor_staff() {
    let app = TestApp::new().await;
    app.seed_user("Terry Tech", shopfloor_api::auth::Role::Technician, true)
        .await;
    app.seed_user("Pat Painter", shopfloor_api::auth::Role::Painter, true)
        .await;
    app.seed_user("Gone Tech", shopfloor_api::auth::Role::Technician, false)
        .await;
    app.seed_user("Dana Advisor", shopfloor_api::auth::Role::ServiceAdvisor, true)
        .await;

    let staff = app
        .work_orders
        .list_assignable_employees()
        .await
        .expect("staff");
    assert_eq!(staff.len(), 2);
    assert!(staff.iter().all(|u| u.is_active));
}

#[tokio::test]
async fn take_payment_settles_a_completed_order() {
    let app = TestApp::new().await;
    let actor = advisor();
    let wo = app.seed_work_order(WorkOrderStatus::InProgress).await;

    // Only COMPLETED orders can be settled this way.
    let err = app
        .work_orders
        .take_payment(
            wo.id,
            TakePaymentInput {
                method: "CASH".to_string(),
                amount: None,
            },
            &actor,
        )
        .await;
    assert_matches!(err, Err(ServiceError::InvalidOperation(_)));

    app.work_orders
        .update_status(wo.id, WorkOrderStatus::Completed, &actor)
        .await
        .expect("complete");

    // COMPLETED but never billed: no invoice to settle.
    let err = app
        .work_orders
        .take_payment(
            wo.id,
            TakePaymentInput {
                method: "CASH".to_string(),
                amount: None,
            },
            &actor,
        )
        .await;
    assert_matches!(err, Err(ServiceError::NotFound(_)));

    let wo = app.work_orders.get(wo.id).await.expect("reload");
    let inv = app.seed_open_invoice(&wo, dec!(310)).await;

    let settled = app
        .work_orders
        .take_payment(
            wo.id,
            TakePaymentInput {
                method: "CREDIT".to_string(),
                amount: None,
            },
            &actor,
        )
        .await
        .expect("settle");
    assert_eq!(settled.work_order.status, "CLOSED");
    assert_eq!(settled.invoice.id, inv.id);
    assert_eq!(settled.invoice.status, "CLOSED");
    assert_eq!(settled.payment.amount, dec!(310));
    assert_eq!(settled.payment.method, "CREDIT");

    // The order is CLOSED now, so a second settlement is rejected outright.
    let err = app
        .work_orders
        .take_payment(
            wo.id,
            TakePaymentInput {
                method: "CASH".to_string(),
                amount: None,
            },
            &actor,
        )
        .await;
    assert_matches!(err, Err(ServiceError::InvalidOperation(_)));
}
