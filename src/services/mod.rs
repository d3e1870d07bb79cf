pub mod audit;
pub mod inventory;
pub mod invoicing;
pub mod work_orders;

use sea_orm::DbErr;

/// Distinguishes retryable store contention (busy/locked handles, aborted
/// serializable transactions, deadlocks) from genuine business failures.
/// Only the bounded retry in part issuance consults this.
pub(crate) fn is_transient_conflict(err: &DbErr) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("busy")
        || message.contains("deadlock")
        || message.contains("serialization failure")
        || message.contains("could not serialize")
        || message.contains("40001")
        || message.contains("40p01")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_store_conflicts() {
        assert!(is_transient_conflict(&DbErr::Custom(
            "error returned from database: database is locked".into()
        )));
        assert!(is_transient_conflict(&DbErr::Custom(
            "ERROR: could not serialize access due to concurrent update".into()
        )));
        assert!(!is_transient_conflict(&DbErr::Custom(
            "UNIQUE constraint failed: inventory_transactions.idempotency_key".into()
        )));
    }
}
