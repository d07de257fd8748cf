use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{PageId, Timestamp};

/// Access history of one cached page
#[derive(Debug, Default)]
struct AccessHistory {
    /// Last k access timestamps, oldest at the front
    timestamps: VecDeque<Timestamp>,
    evictable: bool,
}

impl AccessHistory {
    fn record(&mut self, timestamp: Timestamp, k: usize) {
        self.timestamps.push_back(timestamp);
        while self.timestamps.len() > k {
            self.timestamps.pop_front();
        }
    }

    /// Backward k-distance, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.timestamps.len() < k {
            None
        } else {
            self.timestamps.front().map(|&kth| now - kth)
        }
    }

    fn oldest(&self) -> Timestamp {
        self.timestamps.front().copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    clock: Timestamp,
    pages: HashMap<PageId, AccessHistory>,
    num_evictable: usize,
}

/// LRU-K eviction policy over cached pages.
///
/// Evicts the evictable page with the largest backward k-distance: the time
/// since its k-th most recent access. Pages with fewer than k accesses count
/// as infinitely distant; ties among them go to the least recently first-seen
/// access (plain LRU).
///
/// The buffer pool marks a page evictable only while it is unpinned and
/// clean, so a victim never holds uncommitted changes.
pub struct LruKReplacer {
    k: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            state: Mutex::new(ReplacerState::default()),
        }
    }

    /// Removes and returns the page to evict, or None if nothing is evictable.
    pub fn evict(&self) -> Option<PageId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let now = state.clock;
        let victim = state
            .pages
            .iter()
            .filter(|(_, history)| history.evictable)
            .max_by(|(_, a), (_, b)| {
                // None (+inf) sorts above any finite distance
                let da = a.k_distance(now, self.k).unwrap_or(Timestamp::MAX);
                let db = b.k_distance(now, self.k).unwrap_or(Timestamp::MAX);
                da.cmp(&db).then_with(|| b.oldest().cmp(&a.oldest()))
            })
            .map(|(&page_id, _)| page_id)?;

        state.pages.remove(&victim);
        state.num_evictable -= 1;
        Some(victim)
    }

    /// Records an access to `page_id`, starting to track it if needed.
    pub fn record_access(&self, page_id: PageId) {
        let mut state = self.state.lock();
        let timestamp = state.clock;
        state.clock += 1;
        state.pages.entry(page_id).or_default().record(timestamp, self.k);
    }

    /// Marks a tracked page evictable or not. Untracked pages are ignored.
    pub fn set_evictable(&self, page_id: PageId, evictable: bool) {
        let mut state = self.state.lock();
        let Some(history) = state.pages.get_mut(&page_id) else {
            return;
        };
        if history.evictable == evictable {
            return;
        }
        history.evictable = evictable;
        if evictable {
            state.num_evictable += 1;
        } else {
            state.num_evictable -= 1;
        }
    }

    /// Stops tracking `page_id`, e.g. when its frame is discarded.
    pub fn remove(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if let Some(history) = state.pages.remove(&page_id) {
            if history.evictable {
                state.num_evictable -= 1;
            }
        }
    }

    /// Returns the number of evictable pages.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
