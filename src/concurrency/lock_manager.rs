use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rand::Rng;
use tracing::{debug, trace};

use crate::common::{DbError, LockMode, LockTimeout, PageId, Result, TransactionId};

/// Lock state of a single page.
///
/// Either some transactions share the page, or one transaction holds it
/// exclusively. The exclusive holder may also appear in the shared set (it
/// upgraded from shared), but no other transaction may.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockState {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockState {
    /// Returns the transactions holding a shared lock.
    pub fn shared_holders(&self) -> &HashSet<TransactionId> {
        &self.shared
    }

    /// Returns the transaction holding the exclusive lock, if any.
    pub fn exclusive_holder(&self) -> Option<TransactionId> {
        self.exclusive
    }

    /// Returns true if no transaction holds anything on the page.
    pub fn is_unlocked(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    /// Whether `tid` already holds a lock at least as strong as `mode`.
    /// Holding the exclusive lock satisfies either mode.
    fn holds(&self, tid: TransactionId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.exclusive == Some(tid) || self.shared.contains(&tid),
            LockMode::Exclusive => self.exclusive == Some(tid),
        }
    }

    fn can_grant(&self, tid: TransactionId, mode: LockMode) -> bool {
        let no_other_writer = self.exclusive.map_or(true, |holder| holder == tid);
        match mode {
            LockMode::Shared => no_other_writer,
            LockMode::Exclusive => no_other_writer && self.shared.iter().all(|&h| h == tid),
        }
    }

    fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                self.shared.insert(tid);
            }
            LockMode::Exclusive => self.exclusive = Some(tid),
        }
    }

    /// Drops both lock kinds held by `tid`. Returns true if anything was held.
    fn release(&mut self, tid: TransactionId) -> bool {
        let was_shared = self.shared.remove(&tid);
        let was_exclusive = self.exclusive == Some(tid);
        if was_exclusive {
            self.exclusive = None;
        }
        was_shared || was_exclusive
    }
}

/// Outcome of waiting for a lock to become grantable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockWait {
    Granted,
    TimedOut,
}

/// One entry of the lock table: the page's state and the condition variable
/// its waiters sleep on. Each page has its own mutex.
#[derive(Default)]
struct PageLock {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Page-granularity shared/exclusive locks for strict two-phase locking.
///
/// Deadlocks are avoided rather than detected: a blocked request waits at
/// most a randomly drawn duration and then fails with
/// [`DbError::TransactionAborted`], so one participant of any wait cycle
/// eventually gives up.
pub struct LockManager {
    timeout: LockTimeout,
    /// PageId -> lock entry. Held only long enough to find or create an entry.
    pages: Mutex<HashMap<PageId, Arc<PageLock>>>,
    /// Pages each transaction holds a lock on
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
}

impl LockManager {
    pub fn new(timeout: LockTimeout) -> Self {
        Self {
            timeout,
            pages: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires `mode` on `page_id` for `tid`, blocking while a conflicting
    /// lock is held by another transaction.
    ///
    /// Returns immediately if `tid` already holds a sufficient lock. A shared
    /// holder asking for exclusive is upgraded once it is the only holder.
    /// Fails with [`DbError::TransactionAborted`] if the lock is not granted
    /// before this request's randomized deadline.
    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let entry = self.page_lock(page_id);
        let mut state = entry.state.lock();

        if state.holds(tid, mode) {
            return Ok(());
        }

        if !state.can_grant(tid, mode) {
            let wait = self.random_wait();
            trace!(%tid, %page_id, %mode, ?wait, "waiting for page lock");

            let deadline = Instant::now() + wait;
            if self.wait_for_grant(&entry, &mut state, tid, mode, deadline) == LockWait::TimedOut {
                drop(state);
                debug!(%tid, %page_id, %mode, ?wait, "lock wait timed out, aborting");
                self.prune(page_id, &entry);
                return Err(DbError::TransactionAborted(tid));
            }
        }

        state.grant(tid, mode);
        drop(state);
        trace!(%tid, %page_id, %mode, "page lock granted");

        self.held.lock().entry(tid).or_default().insert(page_id);
        Ok(())
    }

    /// Releases whatever `tid` holds on `page_id`. No-op if it holds nothing.
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        self.release_page(tid, page_id);

        let mut held = self.held.lock();
        if let Some(pages) = held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                held.remove(&tid);
            }
        }
    }

    /// Releases every lock held by `tid`. Called once when the transaction ends.
    pub fn release_all(&self, tid: TransactionId) {
        let pages = self.held.lock().remove(&tid).unwrap_or_default();
        trace!(%tid, count = pages.len(), "releasing all page locks");

        for page_id in pages {
            self.release_page(tid, page_id);
        }
    }

    /// Returns true if `tid` holds a shared lock on the page, or the exclusive
    /// lock (which grants the same read access).
    pub fn holds_read(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.with_state(page_id, |state| state.holds(tid, LockMode::Shared))
    }

    /// Returns true if `tid` holds the exclusive lock on the page.
    pub fn holds_write(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.with_state(page_id, |state| state.holds(tid, LockMode::Exclusive))
    }

    /// Returns true if `tid` holds any lock on the page.
    pub fn holds_any(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.holds_read(tid, page_id)
    }

    /// Returns a snapshot of the page's lock state.
    pub fn lock_state(&self, page_id: PageId) -> LockState {
        self.with_state(page_id, LockState::clone)
    }

    /// Returns the pages `tid` currently holds locks on.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.held
            .lock()
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the lock-wait settings.
    pub fn timeout(&self) -> LockTimeout {
        self.timeout
    }

    /// Sleeps on the page's condition variable until the lock can be granted
    /// or the deadline passes. Wakes at least every poll interval to re-check.
    fn wait_for_grant(
        &self,
        entry: &PageLock,
        state: &mut MutexGuard<'_, LockState>,
        tid: TransactionId,
        mode: LockMode,
        deadline: Instant,
    ) -> LockWait {
        loop {
            if state.can_grant(tid, mode) {
                return LockWait::Granted;
            }
            let now = Instant::now();
            if now >= deadline {
                return LockWait::TimedOut;
            }
            let wake_at = deadline.min(now + self.timeout.poll_interval);
            entry.released.wait_until(state, wake_at);
        }
    }

    /// Returns when a wait starting now should give up, drawn from the same
    /// randomized window as a lock wait.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.random_wait()
    }

    fn random_wait(&self) -> Duration {
        let LockTimeout { min, max, .. } = self.timeout;
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn page_lock(&self, page_id: PageId) -> Arc<PageLock> {
        Arc::clone(self.pages.lock().entry(page_id).or_default())
    }

    fn with_state<T>(&self, page_id: PageId, f: impl FnOnce(&LockState) -> T) -> T {
        let entry = self.pages.lock().get(&page_id).cloned();
        match entry {
            Some(entry) => f(&entry.state.lock()),
            None => f(&LockState::default()),
        }
    }

    fn release_page(&self, tid: TransactionId, page_id: PageId) {
        let Some(entry) = self.pages.lock().get(&page_id).cloned() else {
            return;
        };

        let released = entry.state.lock().release(tid);
        if released {
            entry.released.notify_all();
        }
        self.prune(page_id, &entry);
    }

    /// Drops the page's entry once it is unlocked and nobody else holds a
    /// handle to it. Holding the table mutex stops new handles from appearing.
    fn prune(&self, page_id: PageId, entry: &Arc<PageLock>) {
        let mut pages = self.pages.lock();
        // One reference in the table, one held by the caller
        if Arc::strong_count(entry) == 2 && entry.state.lock().is_unlocked() {
            pages.remove(&page_id);
        }
    }
}
