use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use super::lock_manager::LockManager;
use super::transaction::{IsolationLevel, Transaction, TransactionState};
use super::TransactionError;

/// Creates and tracks transactions. Commit and abort funnel through here
/// so every lock is released exactly once: releasing at commit rather than
/// per-operation is what makes the 2PL strict.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            lock_manager,
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Begin a new transaction in the growing phase.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active_transactions.lock().insert(txn_id, txn.clone());
        txn
    }

    /// Commit: release every held lock and mark the transaction committed.
    /// A transaction the deadlock detector already aborted cannot commit.
    pub fn commit(&self, txn_id: TxnId) -> Result<(), TransactionError> {
        let txn = self
            .active_transactions
            .lock()
            .remove(&txn_id)
            .ok_or(TransactionError::UnknownTransaction(txn_id))?;

        if txn.state() == TransactionState::Aborted || txn.state() == TransactionState::Committed {
            self.lock_manager.release_all(&txn);
            return Err(TransactionError::InvalidState(txn_id));
        }

        self.lock_manager.release_all(&txn);
        txn.set_state(TransactionState::Committed);
        Ok(())
    }

    /// Abort: release every held lock and mark the transaction aborted.
    /// Rolling back side effects is the caller's job; this layer only tears
    /// down lock state.
    pub fn abort(&self, txn_id: TxnId) -> Result<(), TransactionError> {
        let txn = self
            .active_transactions
            .lock()
            .remove(&txn_id)
            .ok_or(TransactionError::UnknownTransaction(txn_id))?;

        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all(&txn);
        Ok(())
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    pub fn transaction_exists(&self, txn_id: TxnId) -> bool {
        self.active_transactions.lock().contains_key(&txn_id)
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active_transactions.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransactionManager {
        TransactionManager::new(Arc::new(LockManager::new()))
    }

    #[test]
    fn test_begin_assigns_dense_ids() {
        let tm = manager();
        let t1 = tm.begin(IsolationLevel::ReadCommitted);
        let t2 = tm.begin(IsolationLevel::RepeatableRead);

        assert_eq!(t1.id(), 1);
        assert_eq!(t2.id(), 2);
        assert!(tm.transaction_exists(1));
        assert!(tm.transaction_exists(2));
    }

    #[test]
    fn test_commit_removes_transaction() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);

        tm.commit(txn.id()).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(!tm.transaction_exists(txn.id()));

        assert!(matches!(
            tm.commit(txn.id()),
            Err(TransactionError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn test_abort_marks_aborted() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::RepeatableRead);

        tm.abort(txn.id()).unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(!tm.transaction_exists(txn.id()));
    }

    #[test]
    fn test_aborted_transaction_cannot_commit() {
        let tm = manager();
        let txn = tm.begin(IsolationLevel::ReadCommitted);
        txn.set_state(TransactionState::Aborted);

        assert!(matches!(
            tm.commit(txn.id()),
            Err(TransactionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_active_ids_track_lifecycle() {
        let tm = manager();
        let t1 = tm.begin(IsolationLevel::ReadCommitted);
        let t2 = tm.begin(IsolationLevel::ReadCommitted);

        let mut active = tm.active_transaction_ids();
        active.sort_unstable();
        assert_eq!(active, vec![t1.id(), t2.id()]);

        tm.commit(t1.id()).unwrap();
        assert_eq!(tm.active_transaction_ids(), vec![t2.id()]);
    }
}
