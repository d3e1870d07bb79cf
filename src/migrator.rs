use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_parts_table::Migration),
            Box::new(m20240101_000002_create_inventory_transactions_table::Migration),
            Box::new(m20240101_000003_create_work_orders_table::Migration),
            Box::new(m20240101_000004_create_time_logs_table::Migration),
            Box::new(m20240101_000005_create_invoices_table::Migration),
            Box::new(m20240101_000006_create_payments_table::Migration),
            Box::new(m20240101_000007_create_payables_table::Migration),
            Box::new(m20240101_000008_create_expenses_table::Migration),
            Box::new(m20240101_000009_create_users_table::Migration),
            Box::new(m20240101_000010_create_audit_logs_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_parts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_parts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Parts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Parts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Parts::PartName).string().not_null())
                        .col(ColumnDef::new(Parts::Sku).string().not_null())
                        .col(ColumnDef::new(Parts::Barcode).string().null())
                        .col(ColumnDef::new(Parts::Description).string().null())
                        .col(ColumnDef::new(Parts::Category).string().null())
                        .col(ColumnDef::new(Parts::VendorName).string().null())
                        .col(ColumnDef::new(Parts::Unit).string().null())
                        .col(ColumnDef::new(Parts::ReorderLevel).integer().null())
                        .col(
                            ColumnDef::new(Parts::PurchasePrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::SellingPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::AvgCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::OnHandQty)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::ReservedQty)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Parts::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Parts::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_parts_sku")
                        .table(Parts::Table)
                        .col(Parts::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_parts_category")
                        .table(Parts::Table)
                        .col(Parts::Category)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Parts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Parts {
        Table,
        Id,
        PartName,
        Sku,
        Barcode,
        Description,
        Category,
        VendorName,
        Unit,
        ReorderLevel,
        PurchasePrice,
        SellingPrice,
        AvgCost,
        OnHandQty,
        ReservedQty,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_inventory_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_inventory_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Type)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PartId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::QtyChange)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::UnitCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::UnitPrice)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PaymentMethod)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::VendorName)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PerformedByEmployeeId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PerformedByName)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PerformedByRole)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::IdempotencyKey)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReversesTransactionId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::Notes).string().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_part_created")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::PartId)
                        .col(InventoryTransactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_reference")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::ReferenceType)
                        .col(InventoryTransactions::ReferenceId)
                        .to_owned(),
                )
                .await?;

            // NULL keys are exempt from uniqueness, so only keyed writes dedupe.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_idempotency_key")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::IdempotencyKey)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // At most one reversal per ledger row.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_reverses")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::ReversesTransactionId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        Id,
        Type,
        PartId,
        QtyChange,
        UnitCost,
        UnitPrice,
        PaymentMethod,
        VendorName,
        ReferenceType,
        ReferenceId,
        PerformedByEmployeeId,
        PerformedByName,
        PerformedByRole,
        IdempotencyKey,
        ReversesTransactionId,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000003_create_work_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_work_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkOrders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(WorkOrders::VehicleId).uuid().not_null())
                        .col(ColumnDef::new(WorkOrders::Complaint).string().null())
                        .col(ColumnDef::new(WorkOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(WorkOrders::AssignedEmployees)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::BillableLaborAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(WorkOrders::PartsUsed).json().not_null())
                        .col(ColumnDef::new(WorkOrders::OtherCharges).json().not_null())
                        .col(ColumnDef::new(WorkOrders::Notes).json().not_null())
                        .col(ColumnDef::new(WorkOrders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(WorkOrders::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_status")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_customer_id")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::CustomerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WorkOrders {
        Table,
        Id,
        CustomerId,
        VehicleId,
        Complaint,
        Status,
        AssignedEmployees,
        BillableLaborAmount,
        PartsUsed,
        OtherCharges,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_time_logs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_time_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TimeLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(TimeLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(TimeLogs::WorkOrderId).uuid().not_null())
                        .col(ColumnDef::new(TimeLogs::EmployeeId).uuid().not_null())
                        .col(ColumnDef::new(TimeLogs::ClockInAt).timestamp().not_null())
                        .col(ColumnDef::new(TimeLogs::ClockOutAt).timestamp().null())
                        .col(ColumnDef::new(TimeLogs::DurationMinutes).integer().null())
                        .col(ColumnDef::new(TimeLogs::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_time_logs_work_order_id")
                        .table(TimeLogs::Table)
                        .col(TimeLogs::WorkOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_time_logs_employee_id")
                        .table(TimeLogs::Table)
                        .col(TimeLogs::EmployeeId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TimeLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TimeLogs {
        Table,
        Id,
        WorkOrderId,
        EmployeeId,
        ClockInAt,
        ClockOutAt,
        DurationMinutes,
        CreatedAt,
    }
}

mod m20240101_000005_create_invoices_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).string().not_null())
                        .col(ColumnDef::new(Invoices::IdempotencyKey).string().null())
                        .col(ColumnDef::new(Invoices::Type).string().not_null())
                        .col(ColumnDef::new(Invoices::CustomerId).uuid().null())
                        .col(ColumnDef::new(Invoices::VehicleId).uuid().null())
                        .col(ColumnDef::new(Invoices::WorkOrderId).uuid().null())
                        .col(ColumnDef::new(Invoices::LineItems).json().not_null())
                        .col(
                            ColumnDef::new(Invoices::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::Tax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(ColumnDef::new(Invoices::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Invoices::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_invoice_number")
                        .table(Invoices::Table)
                        .col(Invoices::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_idempotency_key")
                        .table(Invoices::Table)
                        .col(Invoices::IdempotencyKey)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // One invoice per work order, upserts overwrite in place.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_work_order_id")
                        .table(Invoices::Table)
                        .col(Invoices::WorkOrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        InvoiceNumber,
        IdempotencyKey,
        Type,
        CustomerId,
        VehicleId,
        WorkOrderId,
        LineItems,
        Subtotal,
        Tax,
        Total,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000006_create_payments_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(
                            ColumnDef::new(Payments::Amount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Payments::PaidAt).timestamp().not_null())
                        .col(ColumnDef::new(Payments::Note).string().null())
                        .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            // Single payment record per invoice, re-recording overwrites.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        InvoiceId,
        Method,
        Amount,
        PaidAt,
        Note,
        CreatedAt,
    }
}

mod m20240101_000007_create_payables_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_payables_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payables::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payables::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payables::Category).string().not_null())
                        .col(
                            ColumnDef::new(Payables::Amount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Payables::PurchaseDate).timestamp().not_null())
                        .col(ColumnDef::new(Payables::Status).string().not_null())
                        .col(ColumnDef::new(Payables::PartId).uuid().null())
                        .col(ColumnDef::new(Payables::TransactionId).uuid().null())
                        .col(ColumnDef::new(Payables::VendorName).string().null())
                        .col(ColumnDef::new(Payables::Qty).integer().null())
                        .col(ColumnDef::new(Payables::UnitCost).decimal().null())
                        .col(ColumnDef::new(Payables::CreatedByEmployeeId).uuid().null())
                        .col(ColumnDef::new(Payables::CreatedByName).string().null())
                        .col(ColumnDef::new(Payables::CreatedByRole).string().null())
                        .col(ColumnDef::new(Payables::Note).string().null())
                        .col(ColumnDef::new(Payables::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payables_status")
                        .table(Payables::Table)
                        .col(Payables::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payables::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payables {
        Table,
        Id,
        Category,
        Amount,
        PurchaseDate,
        Status,
        PartId,
        TransactionId,
        VendorName,
        Qty,
        UnitCost,
        CreatedByEmployeeId,
        CreatedByName,
        CreatedByRole,
        Note,
        CreatedAt,
    }
}

mod m20240101_000008_create_expenses_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_expenses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Expenses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Expenses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Expenses::Category).string().not_null())
                        .col(
                            ColumnDef::new(Expenses::Amount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Expenses::ExpenseDate).timestamp().not_null())
                        .col(ColumnDef::new(Expenses::Note).string().null())
                        .col(ColumnDef::new(Expenses::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Expenses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Expenses {
        Table,
        Id,
        Category,
        Amount,
        ExpenseDate,
        Note,
        CreatedAt,
    }
}

mod m20240101_000009_create_users_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000009_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Users::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_email")
                        .table(Users::Table)
                        .col(Users::Email)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        Role,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000010_create_audit_logs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000010_create_audit_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLogs::ActionType).string().not_null())
                        .col(ColumnDef::new(AuditLogs::EntityType).string().not_null())
                        .col(ColumnDef::new(AuditLogs::EntityId).string().not_null())
                        .col(
                            ColumnDef::new(AuditLogs::PerformedByEmployeeId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(AuditLogs::PerformedByName).string().null())
                        .col(ColumnDef::new(AuditLogs::PerformedByRole).string().null())
                        .col(ColumnDef::new(AuditLogs::Before).json().null())
                        .col(ColumnDef::new(AuditLogs::After).json().null())
                        .col(ColumnDef::new(AuditLogs::Timestamp).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_entity")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::EntityType)
                        .col(AuditLogs::EntityId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_timestamp")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::Timestamp)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditLogs {
        Table,
        Id,
        ActionType,
        EntityType,
        EntityId,
        PerformedByEmployeeId,
        PerformedByName,
        PerformedByRole,
        Before,
        After,
        Timestamp,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    let result = Migrator::up(&db, None).await;

    match result {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
