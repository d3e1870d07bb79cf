mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use shopfloor_api::entities::work_order::WorkOrderStatus;
use shopfloor_api::entities::{expense, payable};
use shopfloor_api::errors::ServiceError;
use shopfloor_api::services::inventory::{
    AdjustInventoryInput, ReceiveInventoryInput, TransactionFilter,
};
use shopfloor_api::services::work_orders::IssuePartInput;

use common::{advisor, TestApp};

fn receive_input(part_id: uuid::Uuid, qty: i32, unit_cost: f64) -> ReceiveInventoryInput {
    ReceiveInventoryInput {
        part_id,
        qty,
        unit_cost,
        selling_price: None,
        payment_method: "CASH".to_string(),
        vendor_name: Some("NAPA".to_string()),
        notes: None,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn receive_updates_stock_and_weighted_average() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Oil filter", "OF-100", 0, dec!(12.00), dec!(0)).await;

    let first = app
        .inventory
        .receive(receive_input(part.id, 10, 20.0), &actor)
        .await
        .expect("first receive");
    assert_eq!(first.part.on_hand_qty, 10);
    assert_eq!(first.part.avg_cost, dec!(20));

    let second = app
        .inventory
        .receive(receive_input(part.id, 10, 30.0), &actor)
        .await
        .expect("second receive");
    assert_eq!(second.part.on_hand_qty, 20);
    assert_eq!(second.part.avg_cost, dec!(25));
    assert_eq!(second.part.purchase_price, dec!(30));
}

#[tokio::test]
async fn receive_records_the_new_selling_price_on_the_ledger_row() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Air filter", "AF-300", 0, dec!(15), dec!(0)).await;

    let mut priced = receive_input(part.id, 5, 10.0);
    priced.selling_price = Some(19.5);
    let outcome = app.inventory.receive(priced, &actor).await.expect("receive");
    assert_eq!(outcome.part.selling_price, dec!(19.5));
    assert_eq!(outcome.transaction.unit_price, Some(dec!(19.5)));

    // Without a reprice the ledger row carries no selling price.
    let plain = app
        .inventory
        .receive(receive_input(part.id, 5, 10.0), &actor)
        .await
        .expect("receive");
    assert_eq!(plain.part.selling_price, dec!(19.5));
    assert_eq!(plain.transaction.unit_price, None);
}

#[tokio::test]
async fn receive_twice_with_same_key_applies_once() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Brake pad", "BP-200", 0, dec!(40), dec!(0)).await;

    let mut input = receive_input(part.id, 10, 20.0);
    input.idempotency_key = Some("k1".to_string());

    let first = app.inventory.receive(input.clone(), &actor).await.expect("first");
    let second = app.inventory.receive(input, &actor).await.expect("replay");

    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(second.part.on_hand_qty, 10);
}

#[tokio::test]
async fn receive_validates_input_and_payment_method() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Wiper", "WP-1", 0, dec!(8), dec!(0)).await;

    let mut bad_qty = receive_input(part.id, 0, 5.0);
    bad_qty.qty = 0;
    assert_matches!(
        app.inventory.receive(bad_qty, &actor).await,
        Err(ServiceError::InvalidInput(_))
    );

    let bad_cost = receive_input(part.id, 1, -1.0);
    assert_matches!(
        app.inventory.receive(bad_cost, &actor).await,
        Err(ServiceError::InvalidInput(_))
    );

    let mut bad_method = receive_input(part.id, 1, 5.0);
    bad_method.payment_method = "BARTER".to_string();
    assert_matches!(
        app.inventory.receive(bad_method, &actor).await,
        Err(ServiceError::InvalidInput(_))
    );

    let missing = receive_input(uuid::Uuid::new_v4(), 1, 5.0);
    assert_matches!(
        app.inventory.receive(missing, &actor).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn cash_receive_books_expense_and_credit_opens_payable() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Coolant", "CL-5", 0, dec!(15), dec!(0)).await;

    app.inventory
        .receive(receive_input(part.id, 4, 10.0), &actor)
        .await
        .expect("cash receive");
    let expenses = expense::Entity::find()
        .all(app.db.as_ref())
        .await
        .expect("expenses");
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, dec!(40));

    let mut credit = receive_input(part.id, 2, 10.0);
    credit.payment_method = "CREDIT".to_string();
    let outcome = app.inventory.receive(credit, &actor).await.expect("credit receive");

    let payables = payable::Entity::find()
        .filter(payable::Column::TransactionId.eq(outcome.transaction.id))
        .all(app.db.as_ref())
        .await
        .expect("payables");
    assert_eq!(payables.len(), 1);
    assert_eq!(payables[0].status, "OPEN");
    assert_eq!(payables[0].amount, dec!(20));
    assert_eq!(payables[0].qty, Some(2));
}

#[tokio::test]
async fn adjustment_guard_blocks_negative_stock() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Fuse", "FU-10", 3, dec!(1), dec!(0.25)).await;

    let err = app
        .inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: -5,
                reason: "cycle count".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let ok = app
        .inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: -3,
                reason: "cycle count".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .expect("boundary adjustment");
    assert_eq!(ok.part.on_hand_qty, 0);

    let missing_reason = app
        .inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: 1,
                reason: "   ".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await;
    assert_matches!(missing_reason, Err(ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn reserve_and_release_respect_their_guards() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Belt", "BL-7", 5, dec!(30), dec!(12)).await;
    let wo_id = uuid::Uuid::new_v4();

    let reserved = app
        .inventory
        .reserve_stock(part.id, wo_id, 3, &actor)
        .await
        .expect("reserve");
    assert_eq!(reserved.reserved_qty, 3);
    assert_eq!(reserved.available_qty(), 2);

    let over = app.inventory.reserve_stock(part.id, wo_id, 3, &actor).await;
    assert_matches!(over, Err(ServiceError::InsufficientStock(_)));

    let over_release = app.inventory.release_reserved(part.id, wo_id, 4, &actor).await;
    let msg = match over_release {
        Err(ServiceError::InsufficientStock(msg)) => msg,
        other => panic!("expected InsufficientStock, got {:?}", other.map(|p| p.id)),
    };
    assert!(msg.contains("reserved"));

    let released = app
        .inventory
        .release_reserved(part.id, wo_id, 3, &actor)
        .await
        .expect("release");
    assert_eq!(released.reserved_qty, 0);
}

#[tokio::test]
async fn reversal_restores_stock_and_cannot_run_twice() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Spark plug", "SP-4", 10, dec!(9), dec!(3)).await;
    let wo = app.seed_work_order(WorkOrderStatus::InProgress).await;

    let issued = app
        .work_orders
        .issue_part(
            IssuePartInput {
                work_order_id: wo.id,
                part_id: part.id,
                qty: 4,
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .expect("issue");
    assert_eq!(issued.part.on_hand_qty, 6);

    let reversal = app
        .inventory
        .reverse_transaction(issued.transaction.id, &actor, Some("rev-1".to_string()))
        .await
        .expect("reversal");
    assert_eq!(reversal.part.on_hand_qty, 10);
    assert_eq!(reversal.transaction.qty_change, 4);
    assert_eq!(
        reversal.transaction.reverses_transaction_id,
        Some(issued.transaction.id)
    );

    // Same key replays without touching stock.
    let replay = app
        .inventory
        .reverse_transaction(issued.transaction.id, &actor, Some("rev-1".to_string()))
        .await
        .expect("replay");
    assert_eq!(replay.transaction.id, reversal.transaction.id);
    assert_eq!(replay.part.on_hand_qty, 10);

    // A fresh attempt is a hard conflict.
    let again = app
        .inventory
        .reverse_transaction(issued.transaction.id, &actor, None)
        .await;
    assert_matches!(again, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn reversing_a_receive_respects_the_non_negative_guard() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Gasket", "GK-2", 0, dec!(6), dec!(0)).await;

    let received = app
        .inventory
        .receive(receive_input(part.id, 5, 4.0), &actor)
        .await
        .expect("receive");

    // Burn the received stock so the reversal would go negative.
    app.inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: -5,
                reason: "shrinkage".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .expect("burn stock");

    let err = app
        .inventory
        .reverse_transaction(received.transaction.id, &actor, None)
        .await;
    assert_matches!(err, Err(ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn two_concurrent_issues_of_marginal_stock_let_exactly_one_win() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Alternator", "AL-1", 5, dec!(220), dec!(140)).await;
    let wo = app.seed_work_order(WorkOrderStatus::InProgress).await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let service = app.work_orders.clone();
        let actor = actor.clone();
        let input = IssuePartInput {
            work_order_id: wo.id,
            part_id: part.id,
            qty: 5,
            idempotency_key: None,
        };
        tasks.push(tokio::spawn(async move {
            service.issue_part(input, &actor).await
        }));
    }

    let mut successes = 0;
    let mut shortages = 0;
    for task in tasks {
        match task.await.expect("task join") {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock(_)) => shortages += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(shortages, 1);

    let part = app.inventory.get_part(part.id).await.expect("part");
    assert_eq!(part.on_hand_qty, 0);
}

#[tokio::test]
async fn ledger_reads_filter_and_sort() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Hose", "HS-3", 0, dec!(11), dec!(0)).await;

    app.inventory
        .receive(receive_input(part.id, 5, 2.0), &actor)
        .await
        .expect("receive");
    app.inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: -1,
                reason: "damaged".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .expect("adjust");

    let all = app
        .inventory
        .list_transactions(TransactionFilter {
            part_id: Some(part.id),
            ..Default::default()
        })
        .await
        .expect("list");
    assert_eq!(all.len(), 2);
    // Newest first.
    assert_eq!(all[0].r#type, "ADJUSTMENT");

    let receives = app
        .inventory
        .list_transactions(TransactionFilter {
            part_id: Some(part.id),
            transaction_type: Some(
                shopfloor_api::entities::inventory_transaction::TransactionType::Receive,
            ),
            ..Default::default()
        })
        .await
        .expect("filtered list");
    assert_eq!(receives.len(), 1);
    assert_eq!(receives[0].qty_change, 5);
}

#[tokio::test]
async fn low_stock_reports_parts_under_reorder_level() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Bulb", "LB-9", 10, dec!(4), dec!(1)).await;

    app.inventory
        .update_part(
            part.id,
            shopfloor_api::services::inventory::UpdatePartInput {
                reorder_level: Some(4),
                ..Default::default()
            },
            &actor,
        )
        .await
        .expect("set reorder level");

    assert!(app.inventory.low_stock().await.expect("low stock").is_empty());

    app.inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: -8,
                reason: "bulk install".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .expect("drain stock");

    let low = app.inventory.low_stock().await.expect("low stock");
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].id, part.id);
}

#[tokio::test]
async fn mutations_leave_an_audit_trail() {
    let app = TestApp::new().await;
    let actor = advisor();
    let part = app.seed_part("Cap", "CP-1", 0, dec!(2), dec!(0)).await;

    app.inventory
        .receive(receive_input(part.id, 3, 1.0), &actor)
        .await
        .expect("receive");
    app.inventory
        .adjust_inventory(
            AdjustInventoryInput {
                part_id: part.id,
                qty_change: -1,
                reason: "damaged".to_string(),
                idempotency_key: None,
            },
            &actor,
        )
        .await
        .expect("adjust");

    let trail = app
        .audit
        .list(shopfloor_api::services::audit::AuditFilter {
            entity_type: Some("PART".to_string()),
            entity_id: Some(part.id.to_string()),
            ..Default::default()
        })
        .await
        .expect("trail");
    assert_eq!(trail.len(), 2);
    assert!(trail
        .iter()
        .any(|e| e.action_type == "INVENTORY_RECEIVE"));
    assert!(trail
        .iter()
        .any(|e| e.action_type == "INVENTORY_ADJUSTMENT"));
    assert!(trail.iter().all(|e| e.after.is_some()));
}

#[tokio::test]
async fn part_search_pages_and_matches_sku() {
    let app = TestApp::new().await;
    app.seed_part("Air filter", "AF-1", 0, dec!(10), dec!(0)).await;
    app.seed_part("Cabin filter", "CF-1", 0, dec!(14), dec!(0)).await;
    app.seed_part("Radiator", "RD-1", 0, dec!(90), dec!(0)).await;

    let page = app
        .inventory
        .list_parts(Some("filter".to_string()), 1, 50)
        .await
        .expect("search");
    assert_eq!(page.total, 2);
    assert_eq!(page.parts.len(), 2);

    let by_sku = app
        .inventory
        .list_parts(Some("RD-1".to_string()), 1, 50)
        .await
        .expect("sku search");
    assert_eq!(by_sku.total, 1);
    assert_eq!(by_sku.parts[0].part_name, "Radiator");
}
