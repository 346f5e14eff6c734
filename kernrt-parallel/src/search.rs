use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHasher};

/// Number of candidate block sizes. Candidate `pow` splits the launch into
/// `2^pow` blocks.
const MAX_POW: u32 = 6;

/// Number of timed launches averaged for each candidate.
const TRIALS_PER_POW: u32 = 5;

/// Progress of the block size search for one launch configuration.
///
/// Every launch made while the search is in progress is a timed trial. The
/// first [`TRIALS_PER_POW`] launches use a single block, the next use two,
/// then four and so on. Once a candidate's average is known it is compared
/// with the best so far. The search ends when all candidates have been tried
/// or when the current candidate is two steps past the best one without
/// having improved on it.
#[derive(Clone, Debug, Default)]
pub struct ParallelSearchState {
    /// Number of trials recorded so far.
    trials: u32,

    /// Summed duration of trials for the current candidate.
    trial_time: Duration,

    /// Best candidate so far and its average duration.
    best: Option<(u32, Duration)>,

    settled: bool,
}

/// Block size selected for the next launch of a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SearchPlan {
    /// Run a timed trial of candidate `pow`.
    Trial { pow: u32, block_size: usize },

    /// The search is over. Use this block size.
    Settled { block_size: usize },
}

impl SearchPlan {
    pub(crate) fn block_size(&self) -> usize {
        match *self {
            SearchPlan::Trial { block_size, .. } | SearchPlan::Settled { block_size } => {
                block_size
            }
        }
    }
}

/// Block size that splits `count` units into `2^pow` blocks.
fn block_size_for_pow(count: usize, pow: u32) -> usize {
    count.div_ceil(1 << pow).max(1)
}

impl ParallelSearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return true once the search has selected a block size.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Return the number of blocks (as a power of two) that was fastest, if
    /// any candidate has been fully measured.
    pub fn best_pow(&self) -> Option<u32> {
        self.best.map(|(pow, _)| pow)
    }

    /// Number of timed trials recorded so far.
    pub fn trials(&self) -> u32 {
        self.trials
    }

    fn current_pow(&self) -> u32 {
        self.trials / TRIALS_PER_POW
    }

    /// Choose the block size for the next launch over `count` units.
    pub(crate) fn plan(&self, count: usize) -> SearchPlan {
        if self.settled {
            let pow = self.best_pow().unwrap_or(0);
            SearchPlan::Settled {
                block_size: block_size_for_pow(count, pow),
            }
        } else {
            let pow = self.current_pow();
            SearchPlan::Trial {
                pow,
                block_size: block_size_for_pow(count, pow),
            }
        }
    }

    /// Record the duration of a trial launch of candidate `pow`.
    ///
    /// Trials for a candidate other than the current one are ignored. These
    /// come from concurrent launches that planned before the search moved on.
    pub(crate) fn record(&mut self, pow: u32, elapsed: Duration) {
        if self.settled || pow != self.current_pow() {
            return;
        }

        self.trial_time += elapsed;
        self.trials += 1;

        if self.trials % TRIALS_PER_POW != 0 {
            return;
        }

        let avg = self.trial_time / TRIALS_PER_POW;
        self.trial_time = Duration::ZERO;

        match self.best {
            Some((_, best_avg)) if avg >= best_avg => {}
            _ => self.best = Some((pow, avg)),
        }

        let best_pow = self.best_pow().unwrap_or(pow);
        if self.current_pow() >= MAX_POW || pow - best_pow >= 2 {
            self.settled = true;
            tracing::debug!(
                blocks = 1u32 << best_pow,
                trials = self.trials,
                "parallel block size search settled"
            );
        }
    }
}

/// Identifies a launch configuration whose auto-search result can be reused.
///
/// Keys combine the operator name with a fingerprint of whatever determines
/// the workload, typically the element type and shapes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SearchKey {
    op: String,
    fingerprint: u64,
}

impl SearchKey {
    /// Create a key for operator `op` and workload description `config`.
    pub fn new<H: Hash + ?Sized>(op: &str, config: &H) -> Self {
        let mut hasher = FxHasher::default();
        config.hash(&mut hasher);
        SearchKey {
            op: op.to_string(),
            fingerprint: hasher.finish(),
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }
}

/// Shared handle to the search state of one launch configuration.
///
/// Slots obtained from the same [`SearchCache`] with equal keys share state.
/// A kernel that does not want to share its search can create a private
/// slot with [`SearchSlot::new`].
#[derive(Clone, Debug, Default)]
pub struct SearchSlot {
    state: Arc<Mutex<ParallelSearchState>>,
}

impl SearchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of the current search state.
    pub fn state(&self) -> ParallelSearchState {
        self.lock().clone()
    }

    pub(crate) fn plan(&self, count: usize) -> SearchPlan {
        self.lock().plan(count)
    }

    pub(crate) fn record(&self, pow: u32, elapsed: Duration) {
        self.lock().record(pow, elapsed)
    }

    /// Return true if both handles refer to the same search.
    pub fn same_search(&self, other: &SearchSlot) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self) -> MutexGuard<'_, ParallelSearchState> {
        // The state is advisory, so a panic in another thread while holding
        // the lock leaves nothing that needs repair.
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Default maximum number of configurations held by a [`SearchCache`].
pub const DEFAULT_SEARCH_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct CacheEntries {
    /// Slots and the tick at which each was last requested.
    slots: FxHashMap<SearchKey, (SearchSlot, u64)>,
    tick: u64,
}

/// Cache of auto-search states keyed by launch configuration.
///
/// The cache holds at most `capacity` configurations. Requesting a new key
/// when it is full evicts the least recently requested one, so workloads with
/// many distinct shapes do not grow it without bound. Existing handles to an
/// evicted slot keep working but no longer share state with new requests.
#[derive(Debug)]
pub struct SearchCache {
    capacity: usize,
    entries: Mutex<CacheEntries>,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SEARCH_CACHE_CAPACITY)
    }
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SearchCache {
            capacity: capacity.max(1),
            entries: Mutex::default(),
        }
    }

    /// Return the slot for `key`, creating it if needed.
    pub fn slot(&self, key: SearchKey) -> SearchSlot {
        let mut entries = self.lock();
        entries.tick += 1;
        let tick = entries.tick;

        if let Some((slot, last_used)) = entries.slots.get_mut(&key) {
            *last_used = tick;
            return slot.clone();
        }

        if entries.slots.len() >= self.capacity {
            let oldest = entries
                .slots
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::trace!(op = oldest.op(), "evicting parallel search state");
                entries.slots.remove(&oldest);
            }
        }

        let slot = SearchSlot::new();
        entries.slots.insert(key, (slot.clone(), tick));
        slot
    }

    /// Number of configurations in the cache.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Return the process-wide search cache.
pub fn search_cache() -> &'static SearchCache {
    static CACHE: OnceLock<SearchCache> = OnceLock::new();
    CACHE.get_or_init(SearchCache::new)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        MAX_POW, ParallelSearchState, SearchCache, SearchKey, SearchPlan, TRIALS_PER_POW,
    };

    fn run_trials(state: &mut ParallelSearchState, count: usize, cost: impl Fn(u32) -> u64) {
        while !state.is_settled() {
            let SearchPlan::Trial { pow, .. } = state.plan(count) else {
                unreachable!()
            };
            state.record(pow, Duration::from_micros(cost(pow)));
        }
    }

    #[test]
    fn test_search_picks_fastest_candidate() {
        let mut state = ParallelSearchState::new();

        // Candidate 2 (four blocks) is fastest.
        run_trials(&mut state, 1000, |pow| [100, 60, 30, 50, 70, 90][pow as usize]);

        assert_eq!(state.best_pow(), Some(2));
        assert_eq!(state.plan(1000), SearchPlan::Settled { block_size: 250 });
        // Search stops once two candidates past the best have not improved.
        assert_eq!(state.trials(), 5 * TRIALS_PER_POW);
    }

    #[test]
    fn test_search_is_bounded() {
        let mut state = ParallelSearchState::new();

        // Every candidate is faster than the last, so all are tried.
        run_trials(&mut state, 640, |pow| 1000 - pow as u64 * 100);

        assert_eq!(state.trials(), MAX_POW * TRIALS_PER_POW);
        assert_eq!(state.best_pow(), Some(MAX_POW - 1));
        assert_eq!(state.plan(640).block_size(), 20);
    }

    #[test]
    fn test_stale_trials_are_ignored() {
        let mut state = ParallelSearchState::new();
        state.record(3, Duration::from_micros(1));
        assert_eq!(state.trials(), 0);
    }

    #[test]
    fn test_plan_block_size_never_zero() {
        let state = ParallelSearchState::new();
        assert_eq!(state.plan(0).block_size(), 1);
        assert_eq!(state.plan(1).block_size(), 1);
    }

    #[test]
    fn test_search_cache_shares_slots_by_key() {
        let cache = SearchCache::new();
        let a = cache.slot(SearchKey::new("Add", &[4usize, 16]));
        let b = cache.slot(SearchKey::new("Add", &[4usize, 16]));
        let c = cache.slot(SearchKey::new("Add", &[8usize, 16]));
        let d = cache.slot(SearchKey::new("Mul", &[4usize, 16]));

        assert!(a.same_search(&b));
        assert!(!a.same_search(&c));
        assert!(!a.same_search(&d));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_search_cache_evicts_least_recently_used() {
        let cache = SearchCache::with_capacity(2);
        let key = |n: usize| SearchKey::new("Add", &[n]);

        let a = cache.slot(key(1));
        let b = cache.slot(key(2));
        // Touch `a` so that `b` is the oldest.
        assert!(cache.slot(key(1)).same_search(&a));

        let c = cache.slot(key(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.slot(key(1)).same_search(&a));
        assert!(cache.slot(key(3)).same_search(&c));
        assert!(!cache.slot(key(2)).same_search(&b));
        assert_eq!(cache.len(), 2);
    }
}
