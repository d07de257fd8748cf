use std::time::Duration;

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool capacity, in pages
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Lower bound of the randomized lock-wait deadline
pub const DEFAULT_LOCK_WAIT_MIN: Duration = Duration::from_millis(100);

/// Upper bound of the randomized lock-wait deadline
pub const DEFAULT_LOCK_WAIT_MAX: Duration = Duration::from_millis(1000);

/// How often a blocked lock request re-checks the page's lock state
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Deadlock-avoidance timer settings for the lock manager.
///
/// Every blocked acquisition draws its deadline uniformly from `[min, max]`,
/// so the participants of a wait cycle give up at different times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout {
    pub min: Duration,
    pub max: Duration,
    pub poll_interval: Duration,
}

impl LockTimeout {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for LockTimeout {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_WAIT_MIN, DEFAULT_LOCK_WAIT_MAX)
    }
}

/// Settings for one [`Database`](crate::Database) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Size of every page on disk and in memory
    pub page_size: usize,
    /// Maximum number of pages held by the buffer pool
    pub buffer_pool_pages: usize,
    /// K for the LRU-K eviction policy
    pub lru_k: usize,
    /// Lock-wait deadline range
    pub lock_timeout: LockTimeout,
}

impl DbConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_lru_k(mut self, k: usize) -> Self {
        self.lru_k = k;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: LockTimeout) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
            lru_k: DEFAULT_LRUK_K,
            lock_timeout: LockTimeout::default(),
        }
    }
}
