pub mod audit_log;
pub mod expense;
pub mod inventory_transaction;
pub mod invoice;
pub mod part;
pub mod payable;
pub mod payment;
pub mod time_log;
pub mod user;
pub mod work_order;
