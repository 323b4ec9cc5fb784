pub mod concurrency;

pub use concurrency::lock_manager::{AbortReason, DeadlockDetector, LockManager, LockMode};
pub use concurrency::transaction::{IsolationLevel, Transaction, TransactionState};
pub use concurrency::transaction_manager::TransactionManager;
pub use concurrency::TransactionError;
