use std::sync::OnceLock;

use kernrt_base::env::{env_flag, env_usize};

/// Settings for the thread pool and launch engine.
///
/// The process-wide values are read once from the environment by
/// [`parallel_config`]:
///
/// - `KERNRT_NUM_THREADS`: worker count, clamped to the logical core count.
///   Defaults to the physical core count.
/// - `KERNRT_AUTO_SEARCH`: enables block size auto-search (default on).
/// - `KERNRT_MIN_BLOCK`: minimum number of units per block for
///   [`Split::Even`](crate::Split::Even) (default 1024).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Number of worker threads in the pool.
    pub num_threads: usize,

    /// Whether [`Split::Auto`](crate::Split::Auto) measures block sizes. If
    /// false it behaves like [`Split::Even`](crate::Split::Even).
    pub auto_search: bool,

    /// Smallest block produced by an even split.
    pub min_block_len: usize,
}

const DEFAULT_MIN_BLOCK_LEN: usize = 1024;

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            num_threads: optimal_core_count(),
            auto_search: true,
            min_block_len: DEFAULT_MIN_BLOCK_LEN,
        }
    }
}

impl ParallelConfig {
    /// Build a configuration from `KERNRT_*` environment variables, using
    /// defaults for unset values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let num_threads = env_usize("KERNRT_NUM_THREADS")
            .map(|n| n.clamp(1, num_cpus::get().max(1)))
            .unwrap_or(defaults.num_threads);
        ParallelConfig {
            num_threads,
            auto_search: env_flag("KERNRT_AUTO_SEARCH", defaults.auto_search),
            min_block_len: env_usize("KERNRT_MIN_BLOCK").unwrap_or(defaults.min_block_len),
        }
    }
}

/// Return the number of cores to use for maximum throughput.
///
/// Physical rather than logical cores are used since kernels are CPU-bound.
fn optimal_core_count() -> usize {
    num_cpus::get_physical().max(1)
}

/// Return the process-wide configuration, read from the environment on first
/// use.
pub fn parallel_config() -> &'static ParallelConfig {
    static CONFIG: OnceLock<ParallelConfig> = OnceLock::new();
    CONFIG.get_or_init(ParallelConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::{ParallelConfig, optimal_core_count};

    #[test]
    fn test_optimal_core_count() {
        let cores = optimal_core_count();
        assert!(cores >= 1 && cores <= num_cpus::get().max(1));
    }

    #[test]
    fn test_default_config() {
        let config = ParallelConfig::default();
        assert!(config.num_threads >= 1);
        assert!(config.auto_search);
        assert_eq!(config.min_block_len, 1024);
    }
}
