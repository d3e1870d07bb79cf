#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use shopfloor_api::{
    auth::{Actor, Role},
    config::AppConfig,
    db,
    entities::{invoice, part, user, work_order},
    entities::work_order::WorkOrderStatus,
    services::{
        audit::AuditService, inventory::InventoryService, invoicing::InvoicingService,
        work_orders::WorkOrderService,
    },
};
use tempfile::TempDir;
use uuid::Uuid;

/// Test harness over a file-backed SQLite database. One connection in the
/// pool so concurrent tasks exercise the guarded updates without tripping
/// SQLite's writer lock.
pub struct TestApp {
    pub db: Arc<db::DbPool>,
    pub inventory: InventoryService,
    pub work_orders: WorkOrderService,
    pub invoicing: InvoicingService,
    pub audit: AuditService,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_file = dir.path().join("shopfloor_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let pool = Arc::new(pool);
        Self {
            inventory: InventoryService::new(pool.clone()),
            work_orders: WorkOrderService::new(pool.clone()),
            invoicing: InvoicingService::new(pool.clone()),
            audit: AuditService::new(pool.clone()),
            db: pool,
            _dir: dir,
        }
    }

    pub async fn seed_part(
        &self,
        name: &str,
        sku: &str,
        on_hand: i32,
        selling_price: Decimal,
        avg_cost: Decimal,
    ) -> part::Model {
        part::ActiveModel {
            id: Set(Uuid::new_v4()),
            part_name: Set(name.to_string()),
            sku: Set(sku.to_string()),
            barcode: Set(None),
            description: Set(None),
            category: Set(None),
            vendor_name: Set(None),
            unit: Set(Some("pc".to_string())),
            reorder_level: Set(None),
            purchase_price: Set(avg_cost),
            selling_price: Set(selling_price),
            avg_cost: Set(avg_cost),
            on_hand_qty: Set(on_hand),
            reserved_qty: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("failed to seed part")
    }

    pub async fn seed_work_order(&self, status: WorkOrderStatus) -> work_order::Model {
        work_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(Uuid::new_v4()),
            vehicle_id: Set(Uuid::new_v4()),
            complaint: Set(Some("Rattle over bumps".to_string())),
            status: Set(status.as_str().to_string()),
            assigned_employees: Set(Default::default()),
            billable_labor_amount: Set(Decimal::ZERO),
            parts_used: Set(Default::default()),
            other_charges: Set(Default::default()),
            notes: Set(Default::default()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("failed to seed work order")
    }

    pub async fn seed_open_invoice(
        &self,
        work_order: &work_order::Model,
        total: Decimal,
    ) -> invoice::Model {
        invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(format!("INV-TEST-{}", Uuid::new_v4().simple())),
            idempotency_key: Set(None),
            r#type: Set(invoice::InvoiceType::WorkOrder.as_str().to_string()),
            customer_id: Set(Some(work_order.customer_id)),
            vehicle_id: Set(Some(work_order.vehicle_id)),
            work_order_id: Set(Some(work_order.id)),
            line_items: Set(invoice::LineItems(vec![invoice::LineItem {
                kind: invoice::LineItemKind::Labor,
                description: "Labor".to_string(),
                quantity: 1,
                unit_price: total,
                total,
                cost_at_time: None,
            }])),
            subtotal: Set(total),
            tax: Set(Decimal::ZERO),
            total: Set(total),
            status: Set(invoice::InvoiceStatus::Open.as_str().to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("failed to seed invoice")
    }

    pub async fn seed_user(&self, name: &str, role: Role, active: bool) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(Some(name.to_string())),
            email: Set(format!("{}@shop.test", name.to_lowercase().replace(' ', "."))),
            role: Set(role.as_str().to_string()),
            is_active: Set(active),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .expect("failed to seed user")
    }
}

pub fn advisor() -> Actor {
    Actor::new(Uuid::new_v4(), Some("Dana Advisor".to_string()), Role::ServiceAdvisor)
}

pub fn manager() -> Actor {
    Actor::new(Uuid::new_v4(), Some("Morgan Manager".to_string()), Role::OpsManager)
}

pub fn technician() -> Actor {
    Actor::new(Uuid::new_v4(), Some("Terry Tech".to_string()), Role::Technician)
}

pub fn painter() -> Actor {
    Actor::new(Uuid::new_v4(), Some("Pat Painter".to_string()), Role::Painter)
}
