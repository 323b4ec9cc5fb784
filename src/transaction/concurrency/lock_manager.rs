use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use crate::common::types::{Rid, TxnId};
use super::transaction::{IsolationLevel, Transaction, TransactionState};
use super::TransactionError;

/// Why the lock manager aborted a transaction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("lock requested while shrinking")]
    LockOnShrinking,

    #[error("conflicting lock upgrade in progress")]
    UpgradeConflict,

    #[error("chosen as deadlock victim")]
    Deadlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

/// FIFO queue of requests for one record, with a condition variable shared
/// by its waiters (all of whom sleep on the manager mutex) and the id of a
/// transaction mid-upgrade, if any.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cvar: Arc<Condvar>,
    upgrading: Option<TxnId>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            cvar: Arc::new(Condvar::new()),
            upgrading: None,
        }
    }
}

type LockTable = HashMap<Rid, LockRequestQueue>;

/// Record-granularity two-phase locking.
///
/// A single manager mutex guards the lock table; per-queue condition
/// variables wait on that same mutex. Grants are FIFO: a shared request is
/// granted once everything ahead of it is a granted shared lock, an
/// exclusive request only at the head of its queue.
pub struct LockManager {
    lock_table: Mutex<LockTable>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    /// Take a shared lock. Under READ_UNCOMMITTED shared locks do not
    /// exist and the call succeeds without queuing.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.lock_table.lock();
        Self::check_growing(txn)?;

        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            return Ok(());
        }

        let queue = table.entry(rid).or_default();
        queue.requests.push_back(LockRequest {
            txn: txn.clone(),
            mode: LockMode::Shared,
            granted: false,
        });

        self.wait_for_grant(&mut table, rid, txn, LockMode::Shared)
    }

    /// Take an exclusive lock. Granted only once the request reaches the
    /// head of the queue.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.lock_table.lock();
        Self::check_growing(txn)?;

        let queue = table.entry(rid).or_default();
        queue.requests.push_back(LockRequest {
            txn: txn.clone(),
            mode: LockMode::Exclusive,
            granted: false,
        });

        self.wait_for_grant(&mut table, rid, txn, LockMode::Exclusive)
    }

    /// Upgrade a held shared lock to exclusive. The existing request turns
    /// into an ungranted exclusive one at the tail of the queue, keeping
    /// FIFO order for latecomers. A second concurrent upgrader on the same
    /// record aborts with `UpgradeConflict`.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.lock_table.lock();
        Self::check_growing(txn)?;

        let queue = table
            .get_mut(&rid)
            .ok_or(TransactionError::NothingToUpgrade(txn.id()))?;

        if queue.upgrading.is_some() {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::Aborted {
                txn_id: txn.id(),
                reason: AbortReason::UpgradeConflict,
            });
        }

        let position = queue
            .requests
            .iter()
            .position(|r| r.txn.id() == txn.id() && r.granted && r.mode == LockMode::Shared)
            .ok_or(TransactionError::NothingToUpgrade(txn.id()))?;

        queue.upgrading = Some(txn.id());
        let mut request = queue
            .requests
            .remove(position)
            .expect("position points at a request");
        request.mode = LockMode::Exclusive;
        request.granted = false;
        queue.requests.push_back(request);
        txn.remove_shared_lock(rid);

        // The shared grant is gone; someone behind may be grantable now.
        queue.cvar.notify_all();

        let result = self.wait_for_grant(&mut table, rid, txn, LockMode::Exclusive);

        if let Some(queue) = table.get_mut(&rid) {
            if queue.upgrading == Some(txn.id()) {
                queue.upgrading = None;
            }
        }
        result
    }

    /// Release one lock. REPEATABLE_READ moves the transaction into the
    /// shrinking phase on its first release; READ_COMMITTED shared locks
    /// are released at the end of the owning operation without a phase
    /// change.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut table = self.lock_table.lock();

        let held_shared = txn.is_shared_locked(rid);
        let held_exclusive = txn.is_exclusive_locked(rid);
        if !held_shared && !held_exclusive {
            return Err(TransactionError::LockNotHeld(txn.id()));
        }

        let read_committed_shared =
            held_shared && txn.isolation_level() == IsolationLevel::ReadCommitted;
        if !read_committed_shared && txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        if held_shared {
            txn.remove_shared_lock(rid);
        } else {
            txn.remove_exclusive_lock(rid);
        }

        Self::remove_requests(&mut table, rid, txn.id());
        Ok(())
    }

    /// Drop every lock a transaction holds, without phase transitions.
    /// Called by the transaction manager at commit (strict 2PL) and abort.
    pub fn release_all(&self, txn: &Arc<Transaction>) {
        let mut table = self.lock_table.lock();

        let mut rids = txn.shared_lock_set();
        rids.extend(txn.exclusive_lock_set());
        for rid in rids {
            Self::remove_requests(&mut table, rid, txn.id());
        }
        txn.clear_lock_sets();
    }

    /// One detection pass: rebuild the wait-for graph, abort the lowest-id
    /// transaction on each cycle and wake its queues, until no cycle
    /// remains. Returns the victims, oldest cycle first.
    pub fn run_cycle_detection(&self) -> Vec<TxnId> {
        let mut table = self.lock_table.lock();
        let mut victims = Vec::new();

        loop {
            let graph = Self::build_waits_for(&table);
            let Some(victim) = Self::find_victim(&graph) else {
                break;
            };

            log::warn!("deadlock detected, aborting transaction {}", victim);
            for queue in table.values_mut() {
                let mut involved = false;
                for request in queue.requests.iter() {
                    if request.txn.id() == victim {
                        request.txn.set_state(TransactionState::Aborted);
                        involved = true;
                    }
                }
                if involved {
                    queue.cvar.notify_all();
                }
            }
            victims.push(victim);
        }

        victims
    }

    /// Start the background detector. The returned handle stops the thread
    /// when dropped.
    pub fn spawn_detector(self: &Arc<Self>, interval: Duration) -> DeadlockDetector {
        let manager = Arc::clone(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();

        let handle = thread::spawn(move || loop {
            thread::sleep(interval);
            if flag.load(Ordering::SeqCst) {
                break;
            }
            manager.run_cycle_detection();
        });

        DeadlockDetector {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Block until our request is grantable or we got aborted. Waiters
    /// re-check their predicate on every queue broadcast and must notice
    /// their own aborted state.
    fn wait_for_grant(
        &self,
        table: &mut MutexGuard<'_, LockTable>,
        rid: Rid,
        txn: &Arc<Transaction>,
        mode: LockMode,
    ) -> Result<(), TransactionError> {
        loop {
            if txn.state() == TransactionState::Aborted {
                Self::cancel_waiting_request(table, rid, txn.id());
                return Err(TransactionError::Aborted {
                    txn_id: txn.id(),
                    reason: AbortReason::Deadlock,
                });
            }

            let queue = table.get_mut(&rid).expect("waiter's queue vanished");
            if Self::grantable(queue, txn.id(), mode) {
                for request in queue.requests.iter_mut() {
                    if request.txn.id() == txn.id() && !request.granted {
                        request.granted = true;
                        break;
                    }
                }
                match mode {
                    LockMode::Shared => txn.add_shared_lock(rid),
                    LockMode::Exclusive => txn.add_exclusive_lock(rid),
                }
                queue.cvar.notify_all();
                return Ok(());
            }

            let cvar = queue.cvar.clone();
            cvar.wait(table);
        }
    }

    /// Grant policy. Shared: everything ahead must be a granted shared
    /// lock (a pending older writer blocks us, preventing starvation).
    /// Exclusive: we must be at the head of the queue.
    fn grantable(queue: &LockRequestQueue, txn_id: TxnId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                for request in queue.requests.iter() {
                    if request.txn.id() == txn_id && !request.granted {
                        return true;
                    }
                    if !request.granted || request.mode == LockMode::Exclusive {
                        return false;
                    }
                }
                false
            }
            LockMode::Exclusive => queue
                .requests
                .front()
                .is_some_and(|r| r.txn.id() == txn_id && !r.granted),
        }
    }

    fn check_growing(txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Growing {
            return Ok(());
        }
        txn.set_state(TransactionState::Aborted);
        Err(TransactionError::Aborted {
            txn_id: txn.id(),
            reason: AbortReason::LockOnShrinking,
        })
    }

    /// Remove every request a transaction has on a record and wake the
    /// queue.
    fn remove_requests(table: &mut LockTable, rid: Rid, txn_id: TxnId) {
        if let Some(queue) = table.get_mut(&rid) {
            queue.requests.retain(|r| r.txn.id() != txn_id);
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            }
            queue.cvar.notify_all();
            if queue.requests.is_empty() {
                table.remove(&rid);
            }
        }
    }

    /// Remove a transaction's ungranted request after it aborted mid-wait.
    fn cancel_waiting_request(table: &mut LockTable, rid: Rid, txn_id: TxnId) {
        if let Some(queue) = table.get_mut(&rid) {
            queue.requests.retain(|r| r.txn.id() != txn_id || r.granted);
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            }
            queue.cvar.notify_all();
            if queue.requests.is_empty() {
                table.remove(&rid);
            }
        }
    }

    /// Edges `waiter -> holder` for every waiting request behind an
    /// incompatible granted one. Aborted transactions are invisible: their
    /// requests are on the way out.
    fn build_waits_for(table: &LockTable) -> BTreeMap<TxnId, BTreeSet<TxnId>> {
        let mut graph: BTreeMap<TxnId, BTreeSet<TxnId>> = BTreeMap::new();

        for queue in table.values() {
            for (i, waiter) in queue.requests.iter().enumerate() {
                if waiter.granted || waiter.txn.state() == TransactionState::Aborted {
                    continue;
                }
                for holder in queue.requests.iter().take(i) {
                    if !holder.granted || holder.txn.state() == TransactionState::Aborted {
                        continue;
                    }
                    let incompatible =
                        waiter.mode == LockMode::Exclusive || holder.mode == LockMode::Exclusive;
                    if incompatible && holder.txn.id() != waiter.txn.id() {
                        graph
                            .entry(waiter.txn.id())
                            .or_default()
                            .insert(holder.txn.id());
                    }
                }
            }
        }

        graph
    }

    /// Deterministic cycle search: DFS from the lowest unvisited id,
    /// expanding neighbors in ascending order. The victim is the lowest id
    /// on the cycle.
    fn find_victim(graph: &BTreeMap<TxnId, BTreeSet<TxnId>>) -> Option<TxnId> {
        let mut visited = BTreeSet::new();

        for &start in graph.keys() {
            if visited.contains(&start) {
                continue;
            }
            let mut path = Vec::new();
            if let Some(victim) = Self::dfs(start, graph, &mut visited, &mut path) {
                return Some(victim);
            }
        }
        None
    }

    fn dfs(
        current: TxnId,
        graph: &BTreeMap<TxnId, BTreeSet<TxnId>>,
        visited: &mut BTreeSet<TxnId>,
        path: &mut Vec<TxnId>,
    ) -> Option<TxnId> {
        visited.insert(current);
        path.push(current);

        if let Some(neighbors) = graph.get(&current) {
            for &next in neighbors {
                if let Some(pos) = path.iter().position(|&t| t == next) {
                    // Cycle found: path[pos..] loops back to `next`.
                    return path[pos..].iter().copied().min();
                }
                if !visited.contains(&next) {
                    if let Some(victim) = Self::dfs(next, graph, visited, path) {
                        return Some(victim);
                    }
                }
            }
        }

        path.pop();
        None
    }
}

/// Handle for the background deadlock detection thread. Dropping it stops
/// the thread at its next wake-up.
pub struct DeadlockDetector {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for DeadlockDetector {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
