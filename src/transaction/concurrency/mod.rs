pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;

pub use lock_manager::{AbortReason, DeadlockDetector, LockManager, LockMode};
pub use transaction::{IsolationLevel, Transaction, TransactionState};
pub use transaction_manager::TransactionManager;

use thiserror::Error;

use crate::common::types::TxnId;

/// Errors surfaced by the transaction layer. Lock-layer failures abort the
/// offending transaction before being returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction {txn_id} aborted: {reason}")]
    Aborted { txn_id: TxnId, reason: AbortReason },

    #[error("Transaction {0} does not hold a lock on the record")]
    LockNotHeld(TxnId),

    #[error("Transaction {0} holds no shared lock to upgrade")]
    NothingToUpgrade(TxnId),

    #[error("Transaction {0} not found")]
    UnknownTransaction(TxnId),

    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),
}
